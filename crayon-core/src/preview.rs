//! Encoded preview thumbnails attached to saves.

use base64::Engine;

/// An encoded thumbnail of the current canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub content_type: String,
    /// Thumbnail width in pixels.
    pub width: u32,
    /// Thumbnail height in pixels.
    pub height: u32,
}

impl PreviewImage {
    /// Wrap PNG bytes.
    #[must_use]
    pub fn png(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            content_type: "image/png".to_string(),
            width,
            height,
        }
    }

    /// File extension matching the content type.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }

    /// Encode as a `data:` URI, usable as a preview URL while offline.
    #[must_use]
    pub fn to_data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{encoded}", self.content_type)
    }
}
