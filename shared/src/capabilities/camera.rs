use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest photo accepted for upload, from memory or from disk.
pub const MAX_IMAGE_SIZE_BYTES: usize = 20 * 1024 * 1024;

const FILE_SCHEME: &str = "file://";

/// Where the shell should obtain the photograph from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Camera,
    Gallery,
}

/// Encodings a phone camera or gallery hands back. Anything unrecognised is
/// sent as JPEG, which is what the recognition service expects by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
    Heic,
    WebP,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Heic => "image/heic",
            ImageFormat::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Heic => "heic",
            ImageFormat::WebP => "webp",
        }
    }

    /// Guesses from the last `.ext` of a path or URI, ignoring case.
    pub fn from_extension(path: &str) -> Option<Self> {
        let (_, ext) = path.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "heic" | "heif" => Some(Self::Heic),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Identifies the encoding from the file signature, if it is one we know.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', ..] => Some(Self::Png),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::WebP),
            [_, _, _, _, b'f', b't', b'y', b'p', brand @ ..]
                if brand.starts_with(b"heic")
                    || brand.starts_with(b"heix")
                    || brand.starts_with(b"mif1") =>
            {
                Some(Self::Heic)
            }
            _ => None,
        }
    }
}

/// A captured photograph: either a file the shell wrote, or the encoded bytes.
///
/// Handles are never mutated. Recapturing a side produces a new handle that
/// replaces the old one in its slot.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageHandle {
    LocalUri(String),
    Bytes { data: Bytes, format: ImageFormat },
}

impl ImageHandle {
    pub fn local_uri(uri: impl Into<String>) -> Result<Self, CameraError> {
        let uri = uri.into();
        let path = uri.strip_prefix(FILE_SCHEME).unwrap_or(&uri);
        if path.trim().is_empty() || uri.contains('\0') {
            return Err(CameraError::InvalidImage {
                reason: format!("unusable image URI {uri:?}"),
            });
        }
        Ok(ImageHandle::LocalUri(uri))
    }

    /// Wraps in-memory bytes. A recognisable signature must agree with `format`.
    pub fn from_bytes(data: impl Into<Bytes>, format: ImageFormat) -> Result<Self, CameraError> {
        let data = data.into();
        check_size(data.len())?;
        match ImageFormat::sniff(&data) {
            Some(actual) if actual != format => Err(CameraError::InvalidImage {
                reason: format!("declared {format:?}, bytes look like {actual:?}"),
            }),
            _ => Ok(ImageHandle::Bytes { data, format }),
        }
    }

    pub fn format(&self) -> ImageFormat {
        match self {
            ImageHandle::LocalUri(uri) => ImageFormat::from_extension(uri).unwrap_or_default(),
            ImageHandle::Bytes { format, .. } => *format,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        self.format().mime_type()
    }

    /// Upload file name for this image, e.g. `front.jpg`.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.format().extension())
    }

    /// Reads the encoded image, going to disk for URI handles.
    pub async fn contents(&self) -> Result<Vec<u8>, CameraError> {
        match self {
            ImageHandle::Bytes { data, .. } => Ok(data.to_vec()),
            ImageHandle::LocalUri(uri) => {
                let path = uri.strip_prefix(FILE_SCHEME).unwrap_or(uri);
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|e| CameraError::Unavailable {
                        reason: format!("cannot read {path}: {e}"),
                    })?;
                check_size(data.len())?;
                Ok(data)
            }
        }
    }
}

fn check_size(size: usize) -> Result<(), CameraError> {
    if size == 0 {
        Err(CameraError::InvalidImage {
            reason: "image is empty".to_string(),
        })
    } else if size > MAX_IMAGE_SIZE_BYTES {
        Err(CameraError::ImageTooLarge {
            size,
            max: MAX_IMAGE_SIZE_BYTES,
        })
    } else {
        Ok(())
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageHandle::LocalUri(uri) => f.debug_tuple("LocalUri").field(uri).finish(),
            ImageHandle::Bytes { data, format } => write!(f, "Bytes({} bytes, {format:?})", data.len()),
        }
    }
}

/// Options forwarded to the shell's camera or gallery picker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureConfig {
    /// JPEG quality, 1..=100.
    pub quality: u8,
    /// Longest edge in pixels; the shell downscales anything bigger.
    pub max_dimension: u32,
    pub allow_editing: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            quality: 90,
            max_dimension: 4096,
            allow_editing: false,
        }
    }
}

impl CaptureConfig {
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            quality: self.quality.clamp(1, 100),
            max_dimension: self.max_dimension.max(1),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraOutput {
    Photo(ImageHandle),
    Cancelled,
}

impl CameraOutput {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CameraOutput::Cancelled)
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera or photo library access denied")]
    PermissionDenied,

    #[error("camera unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("photo is {size} bytes, limit is {max}")]
    ImageTooLarge { size: usize, max: usize },

    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("the picker is already open")]
    Busy,
}

impl CameraError {
    pub fn is_permission_error(&self) -> bool {
        matches!(self, CameraError::PermissionDenied)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CameraError::Busy | CameraError::Unavailable { .. })
    }
}

pub type CameraResult = Result<CameraOutput, CameraError>;

/// The shell's camera/gallery primitive.
///
/// A user backing out of the picker is `Ok(CameraOutput::Cancelled)`, not an error.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn acquire(&self, source: SourceKind, config: &CaptureConfig) -> CameraResult;
}
