// Shader module loading
//
// Shaders are precompiled SPIR-V files (see build.rs) read from disk at startup.

use super::error::{RenderError, Result, VkResultExt};
use super::VulkanDevice;
use ash::vk;
use std::path::Path;

/// Read a binary file. Missing and empty files are both errors.
pub fn load_binary(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| RenderError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(RenderError::EmptyShader(path.to_path_buf()));
    }
    log::info!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

/// Decode SPIR-V bytes into words, checking size and magic number.
pub fn decode_spirv(code: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut std::io::Cursor::new(code)).map_err(RenderError::InvalidSpirv)
}

/// Load SPIR-V shader from bytes and create a shader module
pub fn create_shader_module(device: &VulkanDevice, code: &[u8]) -> Result<vk::ShaderModule> {
    let words = decode_spirv(code)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    unsafe { device.device.create_shader_module(&create_info, None) }
        .vk_context("vkCreateShaderModule")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_shader_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_binary(dir.path().join("nope.spv")).unwrap_err();
        assert!(matches!(err, RenderError::ShaderLoad { .. }));
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = load_binary(file.path()).unwrap_err();
        assert!(matches!(err, RenderError::EmptyShader(_)));
    }

    #[test]
    fn bytes_are_returned_verbatim() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(load_binary(file.path()).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn spirv_must_be_word_aligned_with_magic() {
        assert!(decode_spirv(&[1, 2, 3]).is_err());
        assert!(decode_spirv(&[0, 0, 0, 0]).is_err());

        let magic = 0x0723_0203u32.to_le_bytes();
        let mut code = magic.to_vec();
        code.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = decode_spirv(&code).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }
}
