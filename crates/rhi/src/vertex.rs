//! Vertex input descriptions.
//!
//! [`VertexInputDesc`] is the owned form of a pipeline's vertex input state:
//! bindings plus attributes. Vertex types describe themselves through
//! [`VertexLayout`].

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Bindings and attributes fed to `VkPipelineVertexInputStateCreateInfo`.
#[derive(Clone, Debug, Default)]
pub struct VertexInputDesc {
    /// Vertex buffer bindings.
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    /// Shader input attributes.
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInputDesc {
    /// Returns a description with no vertex buffers, e.g. for shaders that generate positions from `gl_VertexIndex`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a vertex buffer binding.
    ///
    /// # Arguments
    ///
    /// * `binding` - Binding index used by `vkCmdBindVertexBuffers`
    /// * `stride` - Byte distance between consecutive elements
    /// * `input_rate` - Per-vertex or per-instance stepping
    pub fn binding(mut self, binding: u32, stride: u32, input_rate: vk::VertexInputRate) -> Self {
        self.bindings.push(vk::VertexInputBindingDescription {
            binding,
            stride,
            input_rate,
        });
        self
    }

    /// Adds a shader input attribute.
    ///
    /// # Arguments
    ///
    /// * `location` - Shader input location
    /// * `binding` - Binding the data is read from
    /// * `format` - Attribute format
    /// * `offset` - Byte offset within one element
    pub fn attribute(mut self, location: u32, binding: u32, format: vk::Format, offset: u32) -> Self {
        self.attributes.push(vk::VertexInputAttributeDescription {
            location,
            binding,
            format,
            offset,
        });
        self
    }

    /// Returns `true` if every attribute refers to a declared binding and no location repeats.
    pub fn is_consistent(&self) -> bool {
        let bindings_ok = self
            .attributes
            .iter()
            .all(|a| self.bindings.iter().any(|b| b.binding == a.binding));
        let locations_unique = self.attributes.iter().enumerate().all(|(i, a)| {
            self.attributes[..i]
                .iter()
                .all(|prev| prev.location != a.location)
        });
        bindings_ok && locations_unique
    }
}

/// A vertex type that can describe its own layout at binding 0.
pub trait VertexLayout: Pod {
    /// Returns the bindings and attributes for this vertex type.
    fn input_desc() -> VertexInputDesc;
}

/// Position + color vertex.
///
/// - location 0: position (vec3)
/// - location 1: color (vec3)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    /// Position in clip space.
    pub position: Vec3,
    /// Linear RGB color.
    pub color: Vec3,
}

impl ColorVertex {
    /// Creates a vertex.
    #[inline]
    pub const fn new(position: Vec3, color: Vec3) -> Self {
        Self { position, color }
    }
}

impl VertexLayout for ColorVertex {
    fn input_desc() -> VertexInputDesc {
        VertexInputDesc::empty()
            .binding(0, size_of::<Self>() as u32, vk::VertexInputRate::VERTEX)
            .attribute(
                0,
                0,
                vk::Format::R32G32B32_SFLOAT,
                offset_of!(Self, position) as u32,
            )
            .attribute(
                1,
                0,
                vk::Format::R32G32B32_SFLOAT,
                offset_of!(Self, color) as u32,
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_vertex_layout() {
        assert_eq!(size_of::<ColorVertex>(), 24);

        let desc = ColorVertex::input_desc();
        assert_eq!(desc.bindings.len(), 1);
        assert_eq!(desc.bindings[0].stride, 24);
        assert_eq!(desc.attributes[0].offset, 0);
        assert_eq!(desc.attributes[1].offset, 12);
        assert!(desc.is_consistent());
    }

    #[test]
    fn test_empty_desc_is_consistent() {
        assert!(VertexInputDesc::empty().is_consistent());
    }

    #[test]
    fn test_attribute_without_binding_is_inconsistent() {
        let desc = VertexInputDesc::empty().attribute(0, 1, vk::Format::R32_SFLOAT, 0);
        assert!(!desc.is_consistent());
    }

    #[test]
    fn test_duplicate_location_is_inconsistent() {
        let desc = VertexInputDesc::empty()
            .binding(0, 8, vk::VertexInputRate::VERTEX)
            .attribute(0, 0, vk::Format::R32_SFLOAT, 0)
            .attribute(0, 0, vk::Format::R32_SFLOAT, 4);
        assert!(!desc.is_consistent());
    }

    #[test]
    fn test_vertex_cast_to_bytes() {
        let vertices = [
            ColorVertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::X),
            ColorVertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::Y),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 48);
    }
}
