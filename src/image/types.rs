//! Core types for card generation.

use crate::error::{CardGenError, Result, ValidationError};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upload cap for the source photo (4 MiB).
pub const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// Supported photo formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Parses one of the accepted MIME types.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// A photo picked by the user, prior to validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Display name of the file.
    pub file_name: String,
    /// Declared format.
    pub format: ImageFormat,
    /// Raw file bytes.
    pub data: Vec<u8>,
}

impl ImageFile {
    /// Creates an image file from in-memory bytes.
    pub fn new(file_name: impl Into<String>, format: ImageFormat, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            format,
            data,
        }
    }

    /// Reads a photo from disk.
    ///
    /// Files over [`MAX_IMAGE_BYTES`] are rejected before being read. The
    /// format comes from the file extension, falling back to the magic bytes.
    /// Anything other than PNG, JPEG or WebP is rejected.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let size = std::fs::metadata(path)?.len();
        if size > MAX_IMAGE_BYTES as u64 {
            return Err(ValidationError::ImageTooLarge {
                size: usize::try_from(size).unwrap_or(usize::MAX),
            }
            .into());
        }
        let data = std::fs::read(path)?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .ok_or_else(|| {
                ValidationError::UnsupportedFormat(
                    path.extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or("unknown")
                        .to_string(),
                )
            })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self::new(file_name, format, data))
    }

    /// Returns the size of the file in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Checks the upload cap.
    pub fn check_size(&self) -> std::result::Result<(), ValidationError> {
        if self.size() > MAX_IMAGE_BYTES {
            return Err(ValidationError::ImageTooLarge { size: self.size() });
        }
        Ok(())
    }

    /// Encodes the file as a data URL, for previews.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }
}

/// A validated request to turn a photo into a birthday card.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    subject_name: String,
    image: Vec<u8>,
    format: ImageFormat,
}

impl GenerationRequest {
    /// Creates a request, trimming the name and enforcing the size cap.
    pub fn new(
        subject_name: impl AsRef<str>,
        image: Vec<u8>,
        format: ImageFormat,
    ) -> std::result::Result<Self, ValidationError> {
        let subject_name = subject_name.as_ref().trim();
        if subject_name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if image.is_empty() {
            return Err(ValidationError::MissingImage);
        }
        if image.len() > MAX_IMAGE_BYTES {
            return Err(ValidationError::ImageTooLarge { size: image.len() });
        }

        Ok(Self {
            subject_name: subject_name.to_string(),
            image,
            format,
        })
    }

    /// Builds a request from a selected file.
    pub fn from_file(
        subject_name: impl AsRef<str>,
        file: &ImageFile,
    ) -> std::result::Result<Self, ValidationError> {
        Self::new(subject_name, file.data.clone(), file.format)
    }

    /// The trimmed subject name.
    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    /// Raw photo bytes.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Photo format.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Encodes the photo into the base64 wire payload.
    pub fn image_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.image)
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Generation duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Text parts returned alongside the image.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<String>,
}

/// A generated birthday card.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "generated card should be saved or displayed"]
pub struct GeneratedCard {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// MIME type reported by the API.
    pub mime_type: String,
    /// Name the card was made for.
    pub subject_name: String,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl GeneratedCard {
    /// Creates a new generated card.
    pub fn new(
        data: Vec<u8>,
        mime_type: impl Into<String>,
        subject_name: impl Into<String>,
        metadata: GenerationMetadata,
    ) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            subject_name: subject_name.into(),
            metadata,
        }
    }

    /// Returns the format, if the MIME type is one we know.
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_mime_type(&self.mime_type)
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the card as a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// Download file name: `birthday-card-<name>.png`. Whitespace runs and
    /// characters that are not allowed in file names become hyphens.
    pub fn file_name(&self) -> String {
        let slug: String = self
            .subject_name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .chars()
            .map(|c| if is_unsafe_in_file_name(c) { '-' } else { c })
            .collect();
        format!("birthday-card-{slug}.png")
    }

    /// Saves the card into `dir` under [`file_name`](Self::file_name).
    pub fn save_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(self.file_name());
        self.save(&path)?;
        Ok(path)
    }

    /// Saves the card to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data).map_err(CardGenError::from)
    }
}

fn is_unsafe_in_file_name(c: char) -> bool {
    c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}
