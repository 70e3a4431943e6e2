//! Renderer delegate drawing a rotating colored quad.

use std::path::{Path, PathBuf};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::info;

use vkframe_core::FrameTimer;
use vkframe_renderer::{FrameContext, PipelineSetup, RendererDelegate};
use vkframe_rhi::RhiResult;
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::command::{CommandBuffer, CommandPool};
use vkframe_rhi::context::Context;
use vkframe_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, write_uniform_buffer};
use vkframe_rhi::pipeline::{CullMode, PipelineLayout, PipelineState, PrimitiveTopology, RasterizationState};
use vkframe_rhi::registry::PipelineLayoutKey;
use vkframe_rhi::shader::{Shader, ShaderStage};
use vkframe_rhi::vertex::{ColorVertex, VertexLayout};

const QUAD_VERTICES: [ColorVertex; 4] = [
    ColorVertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(1.0, 0.0, 0.0)),
    ColorVertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::new(0.0, 1.0, 0.0)),
    ColorVertex::new(Vec3::new(0.5, 0.5, 0.0), Vec3::new(0.0, 0.0, 1.0)),
    ColorVertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec3::new(1.0, 1.0, 1.0)),
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Radians per second.
const ROTATION_SPEED: f32 = std::f32::consts::FRAC_PI_2;

/// Per-frame uniform block, matching `shaders/quad.vert`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct QuadUniforms {
    model: Mat4,
    view: Mat4,
    proj: Mat4,
}

impl QuadUniforms {
    fn at(time: f32, aspect: f32) -> Self {
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        // Vulkan clip space has Y pointing down.
        proj.y_axis.y *= -1.0;

        Self {
            model: Mat4::from_rotation_z(time * ROTATION_SPEED),
            view: Mat4::look_at_rh(Vec3::new(1.5, 1.5, 1.5), Vec3::ZERO, Vec3::Z),
            proj,
        }
    }
}

struct PipelineResources {
    vertex_shader: Shader,
    fragment_shader: Shader,
    set_layout: DescriptorSetLayout,
    layout: PipelineLayoutKey,
}

struct FrameResources {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    uniform_buffers: Vec<Buffer>,
    // Sets are freed with the pool.
    descriptor_sets: Vec<vk::DescriptorSet>,
    _descriptor_pool: DescriptorPool,
}

pub struct QuadDelegate {
    shader_dir: PathBuf,
    clock: FrameTimer,
    aspect: f32,
    pipeline: Option<PipelineResources>,
    frames: Option<FrameResources>,
}

impl QuadDelegate {
    pub fn new(shader_dir: impl Into<PathBuf>) -> Self {
        Self {
            shader_dir: shader_dir.into(),
            clock: FrameTimer::new(),
            aspect: 1.0,
            pipeline: None,
            frames: None,
        }
    }

    fn shader_path(&self, name: &str) -> PathBuf {
        self.shader_dir.join(name)
    }

    fn create_pipeline_resources(&self, setup: &mut PipelineSetup<'_>) -> RhiResult<PipelineResources> {
        let device = setup.device;
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &self.shader_path("quad.vert.spv"),
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &self.shader_path("quad.frag.spv"),
            ShaderStage::Fragment,
            "main",
        )?;

        let set_layout =
            DescriptorSetLayout::uniform_buffer(device.clone(), 0, vk::ShaderStageFlags::VERTEX)?;
        let layout = setup
            .registry
            .insert_layout(PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?);

        Ok(PipelineResources {
            vertex_shader,
            fragment_shader,
            set_layout,
            layout,
        })
    }
}

impl RendererDelegate for QuadDelegate {
    fn configure_pipeline(&mut self, setup: &mut PipelineSetup<'_>) -> RhiResult<Option<PipelineState>> {
        if self.pipeline.is_none() {
            self.pipeline = Some(self.create_pipeline_resources(setup)?);
        }
        self.aspect = setup.extent.width as f32 / setup.extent.height.max(1) as f32;

        let Some(resources) = &self.pipeline else {
            return Ok(None);
        };

        let state = PipelineState::new()
            .add_shader_stage(&resources.vertex_shader)
            .add_shader_stage(&resources.fragment_shader)
            .set_vertex_input(ColorVertex::input_desc())
            .set_input_assembly(PrimitiveTopology::TriangleList, false)
            .set_viewport(setup.extent)
            .add_dynamic_state(vk::DynamicState::VIEWPORT)
            .add_dynamic_state(vk::DynamicState::SCISSOR)
            .set_rasterization_state(RasterizationState {
                cull_mode: CullMode::None,
                ..RasterizationState::default()
            })
            .set_pipeline_layout(resources.layout)
            .set_render_pass(setup.render_pass, 0);

        Ok(Some(state))
    }

    fn init_done(&mut self, context: &Context, frame_count: usize) -> RhiResult<()> {
        let device = context.device();
        let Some(pipeline) = &self.pipeline else {
            return Ok(());
        };

        // Transient pool for the staging uploads.
        let upload_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let vertex_buffer = Buffer::device_local_with_data(
            device.clone(),
            &upload_pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;
        let index_buffer = Buffer::device_local_with_data(
            device.clone(),
            &upload_pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&QUAD_INDICES),
        )?;

        let uniform_buffers = (0..frame_count)
            .map(|_| {
                Buffer::new(
                    device.clone(),
                    BufferUsage::Uniform,
                    size_of::<QuadUniforms>() as vk::DeviceSize,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let descriptor_pool = DescriptorPool::for_uniform_buffers(device.clone(), frame_count as u32)?;
        let descriptor_sets =
            descriptor_pool.allocate(&vec![pipeline.set_layout.handle(); frame_count])?;
        for (set, buffer) in descriptor_sets.iter().zip(&uniform_buffers) {
            write_uniform_buffer(device, *set, 0, buffer);
        }

        info!("Quad resources ready for {} frames in flight", frame_count);

        self.frames = Some(FrameResources {
            vertex_buffer,
            index_buffer,
            uniform_buffers,
            descriptor_sets,
            _descriptor_pool: descriptor_pool,
        });
        self.clock.reset();
        Ok(())
    }

    fn update_uniform_buffers(&mut self, frame_index: usize) -> RhiResult<()> {
        let Some(frames) = &self.frames else {
            return Ok(());
        };
        if let Some(buffer) = frames.uniform_buffers.get(frame_index) {
            buffer.write_value(&QuadUniforms::at(self.clock.elapsed_secs(), self.aspect))?;
        }
        Ok(())
    }

    fn record_command_buffer(
        &mut self,
        _delta: f32,
        cmd: &mut CommandBuffer,
        frame: &FrameContext<'_>,
    ) -> RhiResult<()> {
        let (Some(pipeline), Some(frames)) = (frame.pipeline, &self.frames) else {
            return Ok(());
        };
        let Some(&set) = frames.descriptor_sets.get(frame.frame_index) else {
            return Ok(());
        };

        cmd.bind_vertex_buffer(0, &frames.vertex_buffer, 0)?;
        cmd.bind_index_buffer(&frames.index_buffer, 0, vk::IndexType::UINT16)?;
        cmd.bind_descriptor_set(pipeline.bind_point(), pipeline.layout(), 0, set)?;
        cmd.draw_indexed(QUAD_INDICES.len() as u32, 1, 0, 0, 0)?;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.frames = None;
        // The pipeline layout stays in the renderer's registry.
        self.pipeline = None;
        info!("Quad resources released");
    }
}

/// Directory holding the compiled SPIR-V, next to the working directory by default.
pub fn default_shader_dir() -> &'static Path {
    Path::new("shaders/spirv")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_geometry() {
        assert_eq!(size_of_val(&QUAD_VERTICES), 4 * 24);
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }

    #[test]
    fn test_uniforms_rotate_over_time() {
        let start = QuadUniforms::at(0.0, 16.0 / 9.0);
        let later = QuadUniforms::at(1.0, 16.0 / 9.0);
        assert_eq!(start.model, Mat4::IDENTITY);
        assert_ne!(start.model, later.model);
        assert_eq!(start.proj, later.proj);
        assert!(start.proj.y_axis.y < 0.0);
    }

    #[test]
    fn test_uniform_block_size() {
        assert_eq!(size_of::<QuadUniforms>(), 3 * 64);
    }
}
