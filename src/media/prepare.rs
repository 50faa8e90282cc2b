/// Payload preparation for grading
///
/// Decodes the source image once, shrinks it so the longest edge fits the
/// grading budget, and re-encodes it as JPEG.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::error::Result;

/// Encoded image ready to send to the grading service
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

#[async_trait]
pub trait Preparer: Send + Sync {
    async fn prepare(&self, bytes: Vec<u8>) -> Result<PreparedImage>;
}

/// Resize + JPEG re-encode using the `image` crate
#[derive(Debug, Clone, Copy)]
pub struct JpegPreparer {
    max_edge: u32,
    quality: u8,
}

impl JpegPreparer {
    pub fn new(max_edge: u32, quality: u8) -> Self {
        Self {
            max_edge: max_edge.max(1),
            quality: quality.clamp(1, 100),
        }
    }
}

#[async_trait]
impl Preparer for JpegPreparer {
    async fn prepare(&self, bytes: Vec<u8>) -> Result<PreparedImage> {
        let preparer = *self;
        // Spawn blocking because decode/resize is CPU-intensive
        tokio::task::spawn_blocking(move || preparer.prepare_blocking(&bytes)).await?
    }
}

impl JpegPreparer {
    fn prepare_blocking(&self, bytes: &[u8]) -> Result<PreparedImage> {
        let img = image::load_from_memory(bytes)?;

        // Resize maintaining aspect ratio, never upscale
        let img = if img.width() > self.max_edge || img.height() > self.max_edge {
            img.resize(self.max_edge, self.max_edge, FilterType::Lanczos3)
        } else {
            img
        };

        // JPEG has no alpha channel
        let rgb = img.to_rgb8();
        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.quality).encode_image(&rgb)?;

        tracing::debug!(
            width = rgb.width(),
            height = rgb.height(),
            kb = data.len() / 1024,
            "Prepared grading payload"
        );

        Ok(PreparedImage {
            data,
            mime_type: "image/jpeg",
        })
    }
}
