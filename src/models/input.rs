//! Inbound image payloads for the prescription-photo flow.

/// MIME types the vision model is given.
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/heic"];

/// Maximum accepted image size in bytes (20 MB).
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageRejected {
    #[error("Image is empty")]
    Empty,
    #[error("Unsupported image type '{0}' (expected JPEG, PNG, WebP or HEIC)")]
    UnsupportedType(String),
    #[error("Image too large ({0} bytes), maximum is 20 MB")]
    TooLarge(usize),
}

/// Raw image bytes plus the MIME type they were declared or sniffed as.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("len", &self.bytes.len())
            .field("mime", &self.mime)
            .finish()
    }
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    /// Check size and type before anything is sent upstream.
    pub fn validate(&self) -> Result<(), ImageRejected> {
        if self.bytes.is_empty() {
            return Err(ImageRejected::Empty);
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ImageRejected::TooLarge(self.bytes.len()));
        }
        let mime = self.mime.trim().to_ascii_lowercase();
        if !SUPPORTED_IMAGE_TYPES.contains(&mime.as_str()) {
            return Err(ImageRejected::UnsupportedType(self.mime.clone()));
        }
        Ok(())
    }
}

/// Detect an image MIME type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        Some("image/jpeg")
    } else if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
    {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && matches!(&bytes[8..12], b"heic" | b"heix" | b"mif1")
    {
        Some("image/heic")
    } else {
        None
    }
}

/// Pick the MIME type for an uploaded part.
///
/// Order: declared content type (unless generic), magic bytes, file name.
pub fn resolve_mime(declared: Option<&str>, bytes: &[u8], file_name: Option<&str>) -> Option<String> {
    let declared = declared
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty() && m != "application/octet-stream");
    if let Some(mime) = declared {
        return Some(mime);
    }
    if let Some(mime) = sniff_mime(bytes) {
        return Some(mime.to_string());
    }
    file_name
        .and_then(|name| mime_guess::from_path(name).first())
        .map(|m| m.essence_str().to_string())
}
