use std::sync::Arc;

use base64::Engine as _;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, ImageError, RgbImage};

use crate::settings::SessionSettings;

use super::camera::VideoStream;

pub const DEFAULT_FRAME_WIDTH: u32 = 320;
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// A downscaled JPEG ready for `POST /process_frame`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub jpeg_bytes: usize,
}

/// Turns the stream's current picture into a transport-sized JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSampler {
    target_width: u32,
    jpeg_quality: u8,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_WIDTH, DEFAULT_JPEG_QUALITY)
    }
}

impl FrameSampler {
    pub fn new(target_width: u32, jpeg_quality: u8) -> Self {
        Self {
            target_width: target_width.max(1),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(settings.frame_width, settings.jpeg_quality)
    }

    /// The stream's current picture, `None` while it has nothing usable.
    /// Only clones the `Arc`; encoding is left to [`FrameSampler::encode`].
    pub fn grab<S>(&self, stream: &S) -> Option<Arc<RgbImage>>
    where
        S: VideoStream + ?Sized,
    {
        stream
            .current_frame()
            .filter(|frame| frame.width() > 0 && frame.height() > 0)
    }

    pub fn encode(&self, frame: &RgbImage) -> Result<EncodedFrame, ImageError> {
        let (width, height) = self.target_size(frame.width(), frame.height());
        let resized;
        let source = if (width, height) == frame.dimensions() {
            frame
        } else {
            resized = image::imageops::resize(frame, width, height, FilterType::Triangle);
            &resized
        };

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality).encode(
            source.as_raw(),
            width,
            height,
            image::ColorType::Rgb8.into(),
        )?;

        let data_url = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&jpeg)
        );

        Ok(EncodedFrame {
            data_url,
            width,
            height,
            jpeg_bytes: jpeg.len(),
        })
    }

    /// Scale to the target width keeping the aspect ratio; never upscale.
    fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.target_width {
            return (width, height);
        }
        let scale = self.target_width as f64 / width as f64;
        let scaled_height = (height as f64 * scale).round().max(1.0) as u32;
        (self.target_width, scaled_height)
    }
}
