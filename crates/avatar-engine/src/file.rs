use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{AvatarError, Result};

pub const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// The image the user picked. Only the type label is checked; the bytes are
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl SelectedFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let mime = mime_for_path(path).ok_or_else(|| {
            AvatarError::UnsupportedFile(format!(
                "{} is not one of: {}",
                path.display(),
                ACCEPTED_EXTENSIONS.join(", ")
            ))
        })?;
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .unwrap_or("upload")
            .to_string();
        Ok(Self {
            name,
            mime_type: mime.to_string(),
            bytes: bytes.into(),
        })
    }

    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let mime_type = mime_type.into().trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(AvatarError::UnsupportedFile(format!(
                "expected an image/* type, got '{mime_type}'"
            )));
        }
        let bytes: Vec<u8> = bytes.into();
        Ok(Self {
            name: name.into(),
            mime_type,
            bytes: bytes.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}
