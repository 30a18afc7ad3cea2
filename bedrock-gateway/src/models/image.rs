use crate::services::providers::{ChatMessage, ChatRequest, ContentBlock, Role};
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image in detail.";

/// Image encodings accepted by Claude 3 vision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Sniff the format from the leading bytes; the declared content type of
    /// an upload is not trusted.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

        if bytes.starts_with(PNG) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// One user turn carrying the image followed by the instruction.
pub fn build_image_request(image: &[u8], format: ImageFormat, prompt: Option<&str>) -> ChatRequest {
    let prompt = prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_IMAGE_PROMPT);

    ChatRequest {
        messages: vec![ChatMessage {
            role: Role::User,
            content: vec![
                ContentBlock::Image {
                    media_type: format.media_type().to_string(),
                    data: STANDARD.encode(image),
                },
                ContentBlock::Text(prompt.to_string()),
            ],
        }],
        ..Default::default()
    }
}
