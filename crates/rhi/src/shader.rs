//! SPIR-V shader modules.
//!
//! A [`Shader`] is a `VkShaderModule` tagged with its pipeline stage and
//! entry point, ready to be added to a
//! [`PipelineState`](crate::pipeline::PipelineState).
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> vkframe_rhi::RhiResult<()> {
//! let vertex = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("shaders/quad.vert.spv"),
//!     ShaderStage::Vertex,
//!     "main",
//! )?;
//! assert_eq!(vertex.stage(), ShaderStage::Vertex);
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Graphics pipeline stage a shader runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader stage.
    Vertex,
    /// Fragment shader stage.
    Fragment,
    /// Geometry shader stage.
    Geometry,
    /// Tessellation control shader stage.
    TessControl,
    /// Tessellation evaluation shader stage.
    TessEvaluation,
}

impl ShaderStage {
    /// Converts to the Vulkan stage flag.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        }
    }

    /// Returns a human-readable stage name for logs.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
            ShaderStage::TessControl => "tessellation control",
            ShaderStage::TessEvaluation => "tessellation evaluation",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Vulkan shader module wrapper.
///
/// The module only has to outlive pipeline creation; pipelines keep no
/// reference to it.
pub struct Shader {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan shader module handle.
    module: vk::ShaderModule,
    /// Stage this module is used in.
    stage: ShaderStage,
    /// Entry point function name.
    entry_point: CString,
}

impl Shader {
    /// Loads a SPIR-V binary from disk.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `path` - Path to the `.spv` file
    /// * `stage` - Pipeline stage the module is used in
    /// * `entry_point` - Entry point function name, usually `"main"`
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Shader`] if the file cannot be read or is not SPIR-V.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::Shader(format!("failed to read shader file {}: {}", path.display(), e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates a module from SPIR-V bytes.
    ///
    /// The byte slice need not be 4-byte aligned in memory, but its length
    /// must be a multiple of 4 and it must start with the SPIR-V magic number.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Shader`] for malformed SPIR-V or an entry point
    /// containing a NUL byte, or an error if module creation fails.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let entry_point = CString::new(entry_point)
            .map_err(|e| RhiError::Shader(format!("invalid entry point name: {e}")))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        debug!(
            "Created {} shader module ({} words, entry point {:?})",
            stage,
            code.len(),
            entry_point
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Returns the stage this module is used in.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Returns the entry point name.
    #[inline]
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

/// Reinterprets SPIR-V bytes as words, validating length and magic number.
///
/// # Errors
///
/// Returns [`RhiError::Shader`] for an empty or misaligned length or a bad magic number.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
        return Err(RhiError::Shader(format!(
            "SPIR-V size must be a non-zero multiple of 4, got {} bytes",
            bytes.len()
        )));
    }
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::Shader(format!("invalid SPIR-V: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.to_vk_stage(), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(
            ShaderStage::TessEvaluation.to_vk_stage(),
            vk::ShaderStageFlags::TESSELLATION_EVALUATION
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(ShaderStage::Vertex.to_string(), "vertex");
        assert_eq!(ShaderStage::TessControl.to_string(), "tessellation control");
    }

    #[test]
    fn test_spirv_words_accepts_header() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_spirv_words_rejects_bad_length() {
        let mut bytes = module_bytes(&[SPIRV_MAGIC, 0]);
        bytes.push(0);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::Shader(_))));
        assert!(matches!(spirv_words(&[]), Err(RhiError::Shader(_))));
    }

    #[test]
    fn test_spirv_words_rejects_bad_magic() {
        let bytes = module_bytes(&[0xDEAD_BEEF, 0]);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::Shader(_))));
    }
}
