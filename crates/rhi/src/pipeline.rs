//! Graphics pipeline state.
//!
//! - [`PipelineLayout`] wraps `VkPipelineLayout` (descriptor set layouts + push constants)
//! - [`PipelineState`] is a reusable description of every fixed-function and
//!   programmable stage; [`PipelineState::build`] compiles it into a [`Pipeline`]
//! - [`Pipeline`] is the immutable compiled object
//!
//! Layouts and render passes are referenced through registry keys, so a
//! description can be kept around and rebuilt after a resize.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::pipeline::{PipelineLayout, PipelineState};
//! use vkframe_rhi::registry::{RenderPassKey, ResourceRegistry};
//! use vkframe_rhi::shader::Shader;
//! use vkframe_rhi::vertex::{ColorVertex, VertexLayout};
//! use vkframe_rhi::vk;
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     registry: &mut ResourceRegistry,
//! #     render_pass: RenderPassKey,
//! #     vert: &Shader,
//! #     frag: &Shader,
//! # ) -> vkframe_rhi::RhiResult<()> {
//! let layout = registry.insert_layout(PipelineLayout::new(device.clone(), &[], &[])?);
//!
//! let state = PipelineState::new()
//!     .add_shader_stage(vert)
//!     .add_shader_stage(frag)
//!     .set_vertex_input(ColorVertex::input_desc())
//!     .add_dynamic_state(vk::DynamicState::VIEWPORT)
//!     .add_dynamic_state(vk::DynamicState::SCISSOR)
//!     .set_pipeline_layout(layout)
//!     .set_render_pass(render_pass, 0);
//!
//! let pipeline = state.build(&device, registry)?;
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::registry::{PipelineLayoutKey, RenderPassKey, ResourceRegistry};
use crate::shader::{Shader, ShaderStage};
use crate::vertex::VertexInputDesc;

/// Vulkan pipeline layout wrapper.
///
/// Owned by the [`ResourceRegistry`] and referenced through a `PipelineLayoutKey`.
pub struct PipelineLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline layout handle.
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `descriptor_set_layouts` - Set layouts in set-index order
    /// * `push_constant_ranges` - Push constant ranges visible to the shaders
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Compiled graphics pipeline. Immutable once built.
///
/// # Thread Safety
///
/// Immutable after creation; binding it only reads the handle.
pub struct Pipeline {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline handle.
    pipeline: vk::Pipeline,
    /// Layout handle, owned by the registry.
    layout: vk::PipelineLayout,
    /// States that must be set on the command buffer before drawing.
    dynamic_states: Vec<vk::DynamicState>,
}

impl Pipeline {
    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Returns the layout the pipeline was built with, for descriptor binds and push constants.
    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Returns the bind point, always graphics.
    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        vk::PipelineBindPoint::GRAPHICS
    }

    /// Returns `true` if `state` must be set on the command buffer before drawing.
    pub fn has_dynamic_state(&self, state: vk::DynamicState) -> bool {
        self.dynamic_states.contains(&state)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

/// How vertices are assembled into primitives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    /// Each vertex is a point.
    PointList,
    /// Each pair of vertices is a line.
    LineList,
    /// Connected line segments.
    LineStrip,
    /// Each three vertices are a triangle.
    #[default]
    TriangleList,
    /// Connected triangles sharing an edge.
    TriangleStrip,
    /// Triangles sharing the first vertex.
    TriangleFan,
}

impl PrimitiveTopology {
    /// Converts to the Vulkan topology.
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        }
    }

    /// Returns `true` for strip and fan topologies, the only ones where
    /// primitive restart is meaningful.
    pub fn supports_restart(self) -> bool {
        matches!(
            self,
            PrimitiveTopology::LineStrip
                | PrimitiveTopology::TriangleStrip
                | PrimitiveTopology::TriangleFan
        )
    }
}

/// How polygons are rasterized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    /// Filled polygons.
    #[default]
    Fill,
    /// Wireframe.
    Line,
    /// Vertices only.
    Point,
}

impl PolygonMode {
    /// Converts to the Vulkan polygon mode.
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
            PolygonMode::Point => vk::PolygonMode::POINT,
        }
    }
}

/// Which faces are discarded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    #[default]
    Back,
    /// Cull all faces.
    FrontAndBack,
}

impl CullMode {
    /// Converts to the Vulkan cull flags.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
        }
    }
}

/// Winding order of front faces. Clockwise by default, matching a Y-down clip space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    /// Counter-clockwise triangles face front.
    CounterClockwise,
    /// Clockwise triangles face front.
    #[default]
    Clockwise,
}

impl FrontFace {
    /// Converts to the Vulkan front face.
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Depth comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    /// Never passes.
    Never,
    /// Passes if the fragment is nearer.
    #[default]
    Less,
    /// Passes on equal depth.
    Equal,
    /// Passes if nearer or equal.
    LessOrEqual,
    /// Passes if the fragment is farther.
    Greater,
    /// Passes on different depth.
    NotEqual,
    /// Passes if farther or equal.
    GreaterOrEqual,
    /// Always passes.
    Always,
}

impl CompareOp {
    /// Converts to the Vulkan compare op.
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Blend factor applied to a source or destination term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    /// `0`
    Zero,
    /// `1`
    One,
    /// Source alpha.
    SrcAlpha,
    /// `1 - source alpha`
    OneMinusSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// `1 - destination alpha`
    OneMinusDstAlpha,
}

impl BlendFactor {
    /// Converts to the Vulkan blend factor.
    pub fn to_vk(self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        }
    }
}

/// How the weighted source and destination terms are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendOp {
    /// `src + dst`
    #[default]
    Add,
    /// `src - dst`
    Subtract,
    /// Component-wise minimum.
    Min,
    /// Component-wise maximum.
    Max,
}

impl BlendOp {
    /// Converts to the Vulkan blend op.
    pub fn to_vk(self) -> vk::BlendOp {
        match self {
            BlendOp::Add => vk::BlendOp::ADD,
            BlendOp::Subtract => vk::BlendOp::SUBTRACT,
            BlendOp::Min => vk::BlendOp::MIN,
            BlendOp::Max => vk::BlendOp::MAX,
        }
    }
}

/// Per-attachment color blend configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorBlendAttachment {
    /// Enables blending; when off the source color is written as is.
    pub blend_enable: bool,
    /// Factor applied to the source color.
    pub src_color_blend_factor: BlendFactor,
    /// Factor applied to the destination color.
    pub dst_color_blend_factor: BlendFactor,
    /// Combines the color terms.
    pub color_blend_op: BlendOp,
    /// Factor applied to the source alpha.
    pub src_alpha_blend_factor: BlendFactor,
    /// Factor applied to the destination alpha.
    pub dst_alpha_blend_factor: BlendFactor,
    /// Combines the alpha terms.
    pub alpha_blend_op: BlendOp,
    /// Channels written to the attachment.
    pub color_write_mask: vk::ColorComponentFlags,
}

/// Blending disabled, all channels written.
impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: BlendFactor::One,
            dst_color_blend_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

impl ColorBlendAttachment {
    /// Returns standard alpha blending: `src * src_alpha + dst * (1 - src_alpha)`.
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: BlendFactor::SrcAlpha,
            dst_color_blend_factor: BlendFactor::OneMinusSrcAlpha,
            ..Self::default()
        }
    }

    /// Converts to the Vulkan attachment blend state.
    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable.into(),
            src_color_blend_factor: self.src_color_blend_factor.to_vk(),
            dst_color_blend_factor: self.dst_color_blend_factor.to_vk(),
            color_blend_op: self.color_blend_op.to_vk(),
            src_alpha_blend_factor: self.src_alpha_blend_factor.to_vk(),
            dst_alpha_blend_factor: self.dst_alpha_blend_factor.to_vk(),
            alpha_blend_op: self.alpha_blend_op.to_vk(),
            color_write_mask: self.color_write_mask,
        }
    }
}

/// Depth bias added to rasterized fragments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthBias {
    /// Constant depth offset.
    pub constant_factor: f32,
    /// Maximum (or minimum) bias.
    pub clamp: f32,
    /// Bias scaled by the fragment's slope.
    pub slope_factor: f32,
}

/// Rasterizer configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizationState {
    /// Fill, wireframe or points.
    pub polygon_mode: PolygonMode,
    /// Faces discarded before shading.
    pub cull_mode: CullMode,
    /// Winding that counts as front-facing.
    pub front_face: FrontFace,
    /// Line width in pixels.
    pub line_width: f32,
    /// Clamps depth instead of clipping.
    pub depth_clamp_enable: bool,
    /// Discards all primitives before rasterization.
    pub rasterizer_discard_enable: bool,
    /// Depth bias, or `None` to disable it.
    pub depth_bias: Option<DepthBias>,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::Clockwise,
            line_width: 1.0,
            depth_clamp_enable: false,
            rasterizer_discard_enable: false,
            depth_bias: None,
        }
    }
}

/// Depth and stencil test configuration.
///
/// Ignored when the render pass has no depth attachment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthStencilState {
    /// Enables the depth test.
    pub depth_test_enable: bool,
    /// Enables depth writes.
    pub depth_write_enable: bool,
    /// Comparison used by the depth test.
    pub depth_compare_op: CompareOp,
    /// Enables the stencil test.
    pub stencil_test_enable: bool,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,
            stencil_test_enable: false,
        }
    }
}

impl DepthStencilState {
    /// Returns a state with every test and write disabled.
    pub fn disabled() -> Self {
        Self {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: CompareOp::Always,
            stencil_test_enable: false,
        }
    }
}

/// One programmable stage: module handle, stage and entry point.
///
/// The module must stay alive until every build that uses it has returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderStageDesc {
    /// Pipeline stage.
    pub stage: ShaderStage,
    /// Shader module handle.
    pub module: vk::ShaderModule,
    /// Entry point function name.
    pub entry_point: CString,
}

impl From<&Shader> for ShaderStageDesc {
    fn from(shader: &Shader) -> Self {
        Self {
            stage: shader.stage(),
            module: shader.handle(),
            entry_point: shader.entry_point().to_owned(),
        }
    }
}

/// Reusable graphics pipeline description.
///
/// Defaults: triangle list, fill, back-face culling, clockwise front face,
/// line width 1, one sample, depth test and write with `LESS`, no dynamic
/// state. Setters consume and return the description; [`build`](Self::build)
/// borrows it, so the same description can be built again after a resize.
#[derive(Clone, Debug)]
pub struct PipelineState {
    /// Programmable stages, at most one per stage kind.
    stages: Vec<ShaderStageDesc>,
    /// Vertex bindings and attributes.
    vertex_input: VertexInputDesc,
    /// Primitive topology.
    topology: PrimitiveTopology,
    /// Enables primitive restart for strip and fan topologies.
    primitive_restart: bool,
    /// Baked viewport, or `None` when dynamic.
    viewport: Option<vk::Viewport>,
    /// Baked scissor, or `None` when dynamic.
    scissor: Option<vk::Rect2D>,
    /// Rasterizer configuration.
    rasterization: RasterizationState,
    /// Rasterization sample count.
    samples: vk::SampleCountFlags,
    /// Depth and stencil tests.
    depth_stencil: DepthStencilState,
    /// Per-attachment blending; empty means one default per color attachment.
    color_blend_attachments: Vec<ColorBlendAttachment>,
    /// States set on the command buffer instead of baked in.
    dynamic_states: Vec<vk::DynamicState>,
    /// Pipeline layout in the registry.
    layout: Option<PipelineLayoutKey>,
    /// Render pass in the registry and subpass index.
    render_pass: Option<(RenderPassKey, u32)>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            vertex_input: VertexInputDesc::empty(),
            topology: PrimitiveTopology::TriangleList,
            primitive_restart: false,
            viewport: None,
            scissor: None,
            rasterization: RasterizationState::default(),
            samples: vk::SampleCountFlags::TYPE_1,
            depth_stencil: DepthStencilState::default(),
            color_blend_attachments: Vec::new(),
            dynamic_states: Vec::new(),
            layout: None,
            render_pass: None,
        }
    }
}

impl PipelineState {
    /// Creates a description with the defaults listed above.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the stage described by `shader`. A later stage of the same kind replaces it.
    pub fn add_shader_stage(self, shader: &Shader) -> Self {
        self.add_stage_desc(ShaderStageDesc::from(shader))
    }

    /// Adds a stage from a raw description. A later stage of the same kind replaces it.
    pub fn add_stage_desc(mut self, desc: ShaderStageDesc) -> Self {
        self.stages.retain(|s| s.stage != desc.stage);
        self.stages.push(desc);
        self
    }

    /// Sets the vertex bindings and attributes.
    pub fn set_vertex_input(mut self, desc: VertexInputDesc) -> Self {
        self.vertex_input = desc;
        self
    }

    /// Sets the topology and primitive restart.
    pub fn set_input_assembly(mut self, topology: PrimitiveTopology, primitive_restart: bool) -> Self {
        self.topology = topology;
        self.primitive_restart = primitive_restart;
        self
    }

    /// Sets a full-size viewport at depth `[0, 1]`.
    pub fn set_viewport(self, extent: vk::Extent2D) -> Self {
        self.set_viewport_rect(0.0, 0.0, extent.width as f32, extent.height as f32, 0.0, 1.0)
    }

    /// Sets the viewport rectangle and depth range.
    ///
    /// Also sets a matching scissor while no scissor has been set explicitly.
    pub fn set_viewport_rect(
        mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) -> Self {
        self.viewport = Some(vk::Viewport {
            x,
            y,
            width,
            height,
            min_depth,
            max_depth,
        });
        if self.scissor.is_none() {
            self.scissor = Some(vk::Rect2D {
                offset: vk::Offset2D {
                    x: x as i32,
                    y: y as i32,
                },
                extent: vk::Extent2D {
                    width: width.max(0.0) as u32,
                    height: height.max(0.0) as u32,
                },
            });
        }
        self
    }

    /// Sets the scissor rectangle.
    pub fn set_scissor(mut self, offset: vk::Offset2D, extent: vk::Extent2D) -> Self {
        self.scissor = Some(vk::Rect2D { offset, extent });
        self
    }

    /// Sets the rasterizer configuration.
    pub fn set_rasterization_state(mut self, state: RasterizationState) -> Self {
        self.rasterization = state;
        self
    }

    /// Sets the rasterization sample count.
    pub fn set_multisample(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// Sets the depth and stencil tests.
    pub fn set_depth_stencil(mut self, state: DepthStencilState) -> Self {
        self.depth_stencil = state;
        self
    }

    /// Appends blending for the next color attachment.
    pub fn add_color_blend_attachment(mut self, attachment: ColorBlendAttachment) -> Self {
        self.color_blend_attachments.push(attachment);
        self
    }

    /// Fills in one default blend state per color attachment, unless some were added already.
    pub fn load_default_blend_attachments(mut self, color_attachment_count: u32) -> Self {
        if self.color_blend_attachments.is_empty() {
            self.color_blend_attachments =
                vec![ColorBlendAttachment::default(); color_attachment_count as usize];
        }
        self
    }

    /// Declares `state` dynamic. Duplicates are ignored.
    pub fn add_dynamic_state(mut self, state: vk::DynamicState) -> Self {
        if !self.dynamic_states.contains(&state) {
            self.dynamic_states.push(state);
        }
        self
    }

    /// Sets the pipeline layout.
    pub fn set_pipeline_layout(mut self, layout: PipelineLayoutKey) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Sets the render pass and subpass index.
    pub fn set_render_pass(mut self, render_pass: RenderPassKey, subpass: u32) -> Self {
        self.render_pass = Some((render_pass, subpass));
        self
    }

    /// Returns the programmable stages.
    #[inline]
    pub fn stages(&self) -> &[ShaderStageDesc] {
        &self.stages
    }

    /// Returns the declared dynamic states.
    #[inline]
    pub fn dynamic_states(&self) -> &[vk::DynamicState] {
        &self.dynamic_states
    }

    /// Returns the baked viewport, if any.
    #[inline]
    pub fn viewport(&self) -> Option<vk::Viewport> {
        self.viewport
    }

    /// Returns the baked scissor, if any.
    #[inline]
    pub fn scissor(&self) -> Option<vk::Rect2D> {
        self.scissor
    }

    /// Returns the rasterizer configuration.
    #[inline]
    pub fn rasterization(&self) -> &RasterizationState {
        &self.rasterization
    }

    /// Returns the depth and stencil configuration.
    #[inline]
    pub fn depth_stencil(&self) -> &DepthStencilState {
        &self.depth_stencil
    }

    /// Returns the explicit blend states.
    #[inline]
    pub fn color_blend_attachments(&self) -> &[ColorBlendAttachment] {
        &self.color_blend_attachments
    }

    /// Returns the pipeline layout key, if set.
    #[inline]
    pub fn layout_key(&self) -> Option<PipelineLayoutKey> {
        self.layout
    }

    /// Returns the render pass key and subpass, if set.
    #[inline]
    pub fn render_pass_key(&self) -> Option<(RenderPassKey, u32)> {
        self.render_pass
    }

    /// Runs the completeness checks that need no device.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::IncompletePipeline`] naming the first missing piece.
    pub fn validate(&self) -> RhiResult<()> {
        if self.layout.is_none() {
            return Err(RhiError::IncompletePipeline("pipeline layout not set"));
        }
        if self.render_pass.is_none() {
            return Err(RhiError::IncompletePipeline("render pass not set"));
        }
        if !self.stages.iter().any(|s| s.stage == ShaderStage::Vertex) {
            return Err(RhiError::IncompletePipeline("no vertex shader stage"));
        }
        if self.viewport.is_none() && !self.dynamic_states.contains(&vk::DynamicState::VIEWPORT) {
            return Err(RhiError::IncompletePipeline(
                "viewport neither set nor declared dynamic",
            ));
        }
        if self.scissor.is_none() && !self.dynamic_states.contains(&vk::DynamicState::SCISSOR) {
            return Err(RhiError::IncompletePipeline(
                "scissor neither set nor declared dynamic",
            ));
        }
        if !self.vertex_input.is_consistent() {
            return Err(RhiError::IncompletePipeline(
                "vertex attributes reference undeclared bindings or repeat locations",
            ));
        }
        if self.primitive_restart && !self.topology.supports_restart() {
            return Err(RhiError::IncompletePipeline(
                "primitive restart requires a strip or fan topology",
            ));
        }
        Ok(())
    }

    /// Compiles the description against the registry's layout and render pass.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `registry` - Owner of the layout and render pass the keys refer to
    ///
    /// # Errors
    ///
    /// - [`RhiError::IncompletePipeline`] if [`validate`](Self::validate) fails
    /// - [`RhiError::InvalidHandle`] if the layout or render pass key is stale
    /// - the translated Vulkan error if creation fails
    pub fn build(&self, device: &Arc<Device>, registry: &ResourceRegistry) -> RhiResult<Pipeline> {
        self.validate()?;
        let (Some(layout_key), Some((render_pass_key, subpass))) = (self.layout, self.render_pass)
        else {
            return Err(RhiError::IncompletePipeline("pipeline layout or render pass not set"));
        };

        let layout = registry.layout(layout_key)?.handle();
        let render_pass = registry.render_pass(render_pass_key)?;

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo<'_>> = self
            .stages
            .iter()
            .map(|s| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(s.stage.to_vk_stage())
                    .module(s.module)
                    .name(&s.entry_point)
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_input.bindings)
            .vertex_attribute_descriptions(&self.vertex_input.attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology.to_vk())
            .primitive_restart_enable(self.primitive_restart);

        // Baked viewport/scissor when present; counts alone when dynamic.
        let viewports: Vec<vk::Viewport> = self.viewport.into_iter().collect();
        let scissors: Vec<vk::Rect2D> = self.scissor.into_iter().collect();
        let mut viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        if !self.dynamic_states.contains(&vk::DynamicState::VIEWPORT) {
            viewport_state = viewport_state.viewports(&viewports);
        }
        if !self.dynamic_states.contains(&vk::DynamicState::SCISSOR) {
            viewport_state = viewport_state.scissors(&scissors);
        }

        let raster = &self.rasterization;
        let bias = raster.depth_bias;
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(raster.depth_clamp_enable)
            .rasterizer_discard_enable(raster.rasterizer_discard_enable)
            .polygon_mode(raster.polygon_mode.to_vk())
            .line_width(raster.line_width)
            .cull_mode(raster.cull_mode.to_vk())
            .front_face(raster.front_face.to_vk())
            .depth_bias_enable(bias.is_some())
            .depth_bias_constant_factor(bias.map_or(0.0, |b| b.constant_factor))
            .depth_bias_clamp(bias.map_or(0.0, |b| b.clamp))
            .depth_bias_slope_factor(bias.map_or(0.0, |b| b.slope_factor));

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(self.samples)
            .sample_shading_enable(false)
            .min_sample_shading(1.0);

        let has_depth = render_pass.has_depth();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth && self.depth_stencil.depth_test_enable)
            .depth_write_enable(has_depth && self.depth_stencil.depth_write_enable)
            .depth_compare_op(self.depth_stencil.depth_compare_op.to_vk())
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(has_depth && self.depth_stencil.stencil_test_enable);

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> =
            if self.color_blend_attachments.is_empty() {
                vec![
                    ColorBlendAttachment::default().to_vk();
                    render_pass.color_attachment_count() as usize
                ]
            } else {
                self.color_blend_attachments.iter().map(|a| a.to_vk()).collect()
            };

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(subpass);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| RhiError::from_vk(result))?[0]
        };

        info!(
            "Graphics pipeline created ({} stages, {} dynamic states)",
            shader_stages.len(),
            self.dynamic_states.len()
        );

        Ok(Pipeline {
            device: device.clone(),
            pipeline,
            layout,
            dynamic_states: self.dynamic_states.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn vertex_stage() -> ShaderStageDesc {
        ShaderStageDesc {
            stage: ShaderStage::Vertex,
            module: vk::ShaderModule::null(),
            entry_point: c"main".to_owned(),
        }
    }

    fn keys() -> (PipelineLayoutKey, RenderPassKey) {
        (
            PipelineLayoutKey::from(KeyData::from_ffi(1 << 32 | 1)),
            RenderPassKey::from(KeyData::from_ffi(1 << 32 | 2)),
        )
    }

    #[test]
    fn test_defaults() {
        let state = PipelineState::new();
        assert_eq!(state.topology, PrimitiveTopology::TriangleList);
        assert_eq!(state.rasterization.polygon_mode, PolygonMode::Fill);
        assert_eq!(state.rasterization.cull_mode, CullMode::Back);
        assert_eq!(state.rasterization.front_face, FrontFace::Clockwise);
        assert_eq!(state.rasterization.line_width, 1.0);
        assert_eq!(state.samples, vk::SampleCountFlags::TYPE_1);
        assert!(state.depth_stencil.depth_test_enable);
        assert!(state.depth_stencil.depth_write_enable);
        assert_eq!(state.depth_stencil.depth_compare_op, CompareOp::Less);
        assert!(state.dynamic_states.is_empty());
    }

    #[test]
    fn test_set_viewport_fills_unset_scissor() {
        let state = PipelineState::new().set_viewport(vk::Extent2D {
            width: 800,
            height: 600,
        });
        let scissor = state.scissor().unwrap();
        assert_eq!((scissor.extent.width, scissor.extent.height), (800, 600));
        assert_eq!(state.viewport().unwrap().max_depth, 1.0);
    }

    #[test]
    fn test_set_viewport_keeps_explicit_scissor() {
        let state = PipelineState::new()
            .set_scissor(
                vk::Offset2D { x: 10, y: 10 },
                vk::Extent2D {
                    width: 100,
                    height: 100,
                },
            )
            .set_viewport(vk::Extent2D {
                width: 800,
                height: 600,
            });
        assert_eq!(state.scissor().unwrap().extent.width, 100);
    }

    #[test]
    fn test_dynamic_states_deduplicated() {
        let state = PipelineState::new()
            .add_dynamic_state(vk::DynamicState::VIEWPORT)
            .add_dynamic_state(vk::DynamicState::SCISSOR)
            .add_dynamic_state(vk::DynamicState::VIEWPORT);
        assert_eq!(state.dynamic_states().len(), 2);
    }

    #[test]
    fn test_same_stage_replaces() {
        let state = PipelineState::new()
            .add_stage_desc(vertex_stage())
            .add_stage_desc(vertex_stage());
        assert_eq!(state.stages().len(), 1);
    }

    #[test]
    fn test_default_blend_attachments_only_when_empty() {
        let state = PipelineState::new().load_default_blend_attachments(2);
        assert_eq!(state.color_blend_attachments().len(), 2);

        let state = PipelineState::new()
            .add_color_blend_attachment(ColorBlendAttachment::alpha_blend())
            .load_default_blend_attachments(2);
        assert_eq!(state.color_blend_attachments().len(), 1);
        assert!(state.color_blend_attachments()[0].blend_enable);
    }

    #[test]
    fn test_validate_reports_missing_pieces_in_order() {
        let (layout, render_pass) = keys();

        let err = PipelineState::new().validate().unwrap_err();
        assert!(matches!(err, RhiError::IncompletePipeline("pipeline layout not set")));

        let err = PipelineState::new()
            .set_pipeline_layout(layout)
            .validate()
            .unwrap_err();
        assert!(matches!(err, RhiError::IncompletePipeline("render pass not set")));

        let err = PipelineState::new()
            .set_pipeline_layout(layout)
            .set_render_pass(render_pass, 0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, RhiError::IncompletePipeline("no vertex shader stage")));
    }

    #[test]
    fn test_validate_requires_viewport_or_dynamic() {
        let (layout, render_pass) = keys();
        let base = PipelineState::new()
            .add_stage_desc(vertex_stage())
            .set_pipeline_layout(layout)
            .set_render_pass(render_pass, 0);

        assert!(base.validate().is_err());
        assert!(
            base.clone()
                .set_viewport(vk::Extent2D {
                    width: 640,
                    height: 480
                })
                .validate()
                .is_ok()
        );
        assert!(
            base.add_dynamic_state(vk::DynamicState::VIEWPORT)
                .add_dynamic_state(vk::DynamicState::SCISSOR)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_primitive_restart_needs_strip() {
        let (layout, render_pass) = keys();
        let state = PipelineState::new()
            .add_stage_desc(vertex_stage())
            .set_pipeline_layout(layout)
            .set_render_pass(render_pass, 0)
            .set_viewport(vk::Extent2D {
                width: 1,
                height: 1,
            })
            .set_input_assembly(PrimitiveTopology::TriangleList, true);
        assert!(state.validate().is_err());

        let state = state.set_input_assembly(PrimitiveTopology::TriangleStrip, true);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_enum_mappings() {
        assert_eq!(FrontFace::default().to_vk(), vk::FrontFace::CLOCKWISE);
        assert_eq!(CullMode::default().to_vk(), vk::CullModeFlags::BACK);
        assert_eq!(CompareOp::default().to_vk(), vk::CompareOp::LESS);
        assert_eq!(
            PrimitiveTopology::TriangleStrip.to_vk(),
            vk::PrimitiveTopology::TRIANGLE_STRIP
        );
        assert_eq!(PolygonMode::Line.to_vk(), vk::PolygonMode::LINE);
    }

    #[test]
    fn test_alpha_blend_attachment() {
        let state = ColorBlendAttachment::alpha_blend().to_vk();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }
}
