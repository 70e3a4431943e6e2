//! Integration tests for pipeline state descriptions.

use slotmap::KeyData;
use vkframe_rhi::RhiError;
use vkframe_rhi::pipeline::{
    CullMode, DepthStencilState, PipelineState, RasterizationState, ShaderStageDesc,
};
use vkframe_rhi::registry::{PipelineLayoutKey, RenderPassKey, ResourceRegistry};
use vkframe_rhi::shader::ShaderStage;
use vkframe_rhi::vertex::{ColorVertex, VertexLayout};
use vkframe_rhi::vk;

fn stage(stage: ShaderStage) -> ShaderStageDesc {
    ShaderStageDesc {
        stage,
        module: vk::ShaderModule::null(),
        entry_point: c"main".to_owned(),
    }
}

fn layout_key() -> PipelineLayoutKey {
    PipelineLayoutKey::from(KeyData::from_ffi((1 << 32) | 3))
}

fn render_pass_key() -> RenderPassKey {
    RenderPassKey::from(KeyData::from_ffi((1 << 32) | 5))
}

fn quad_pipeline() -> PipelineState {
    PipelineState::new()
        .add_stage_desc(stage(ShaderStage::Vertex))
        .add_stage_desc(stage(ShaderStage::Fragment))
        .set_vertex_input(ColorVertex::input_desc())
        .add_dynamic_state(vk::DynamicState::VIEWPORT)
        .add_dynamic_state(vk::DynamicState::SCISSOR)
}

#[test]
fn test_validate_without_layout_fails() {
    let state = quad_pipeline().set_render_pass(render_pass_key(), 0);
    assert!(matches!(
        state.validate(),
        Err(RhiError::IncompletePipeline(_))
    ));
}

#[test]
fn test_validate_with_layout_and_render_pass() {
    let state = quad_pipeline()
        .set_pipeline_layout(layout_key())
        .set_render_pass(render_pass_key(), 0);

    state.validate().expect("complete description should validate");
    // Validation does not consume or alter the description.
    state.validate().expect("validation should be repeatable");
    assert_eq!(state.stages().len(), 2);
}

#[test]
fn test_fragment_only_pipeline_is_incomplete() {
    let state = PipelineState::new()
        .add_stage_desc(stage(ShaderStage::Fragment))
        .set_viewport(vk::Extent2D {
            width: 800,
            height: 600,
        })
        .set_pipeline_layout(layout_key())
        .set_render_pass(render_pass_key(), 0);

    match state.validate() {
        Err(RhiError::IncompletePipeline(reason)) => assert!(reason.contains("vertex")),
        other => panic!("expected IncompletePipeline, got {other:?}"),
    }
}

#[test]
fn test_customized_state_is_kept() {
    let state = quad_pipeline()
        .set_rasterization_state(RasterizationState {
            cull_mode: CullMode::None,
            ..RasterizationState::default()
        })
        .set_depth_stencil(DepthStencilState::disabled());

    assert_eq!(state.rasterization().cull_mode, CullMode::None);
    assert!(!state.depth_stencil().depth_test_enable);
    assert_eq!(state.rasterization().line_width, 1.0);
}

#[test]
fn test_empty_registry_rejects_keys() {
    let registry = ResourceRegistry::new();
    let state = quad_pipeline();
    assert!(state.validate().is_err());
    assert!(registry.layout(layout_key()).is_err());
    assert!(matches!(
        registry.render_pass(render_pass_key()),
        Err(RhiError::InvalidHandle(_))
    ));
}

#[test]
fn test_clone_builds_identical_description() {
    let state = quad_pipeline()
        .set_pipeline_layout(layout_key())
        .set_render_pass(render_pass_key(), 0);
    let copy = state.clone();

    assert_eq!(state.stages(), copy.stages());
    assert_eq!(state.dynamic_states(), copy.dynamic_states());
    assert_eq!(state.layout_key(), copy.layout_key());
    assert_eq!(state.render_pass_key(), copy.render_pass_key());
}
