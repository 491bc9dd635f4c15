//! Frame payloads and pixel-format handling.
//!
//! The bridge works in two color layouts only: 8-bit monochrome and 8-bit
//! three-channel color, canonically ordered BGR. RGB sources are reordered
//! on arrival; every other reported format is rejected before a frame is
//! constructed.

use crate::error::{CamError, CamResult};
use serde::Deserialize;

/// Pixel formats the bridge can interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PixelFormat {
    /// 8-bit monochrome.
    #[serde(rename = "Mono8")]
    Mono8,
    /// 8-bit RGB, reordered to BGR on arrival.
    #[serde(rename = "RGB8")]
    Rgb8,
    /// 8-bit BGR, the canonical internal order.
    #[serde(rename = "BGR8")]
    Bgr8,
}

impl PixelFormat {
    /// Parse a transport-reported format tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Mono8" => Some(PixelFormat::Mono8),
            "RGB8" => Some(PixelFormat::Rgb8),
            "BGR8" => Some(PixelFormat::Bgr8),
            _ => None,
        }
    }

    /// The GenICam enumeration entry name.
    pub fn as_tag(self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
        }
    }

    /// Bytes per pixel for this format.
    pub fn channels(self) -> u8 {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }
}

/// Resolve the channel count for a reported format tag.
///
/// Unknown tags are a fatal unsupported-format error: publishing a frame
/// whose layout we cannot interpret would poison every downstream consumer.
pub fn channels_for_tag(tag: &str) -> CamResult<u8> {
    PixelFormat::from_tag(tag)
        .map(PixelFormat::channels)
        .ok_or_else(|| CamError::UnsupportedPixelFormat(tag.to_string()))
}

/// One captured image in the canonical internal layout.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Raw pixel payload, `height * width * channels` bytes, BGR when color.
    pub data: Vec<u8>,
    /// Image height in pixels.
    pub height: u32,
    /// Image width in pixels.
    pub width: u32,
    /// Bytes per pixel (1 for mono, 3 for color).
    pub channels: u8,
    /// Format the device delivered the payload in.
    pub source_format: PixelFormat,
}

impl FrameBuffer {
    /// Interpret a raw payload as a `height x width x channels` image.
    ///
    /// RGB payloads are reordered to BGR here so every consumer sees one
    /// color convention. A payload whose length does not match the geometry
    /// is refused.
    pub fn from_raw(
        mut data: Vec<u8>,
        height: u32,
        width: u32,
        channels: u8,
        source_format: PixelFormat,
    ) -> CamResult<Self> {
        let expected = height as usize * width as usize * channels as usize;
        if data.len() != expected {
            return Err(CamError::Frame(format!(
                "payload is {} bytes, expected {} for {}x{}x{}",
                data.len(),
                expected,
                height,
                width,
                channels
            )));
        }
        if source_format == PixelFormat::Rgb8 {
            swap_red_blue(&mut data);
        }
        Ok(Self {
            data,
            height,
            width,
            channels,
            source_format,
        })
    }
}

/// Swap the first and third byte of every pixel triple in place.
fn swap_red_blue(data: &mut [u8]) {
    for pixel in data.chunks_exact_mut(3) {
        pixel.swap(0, 2);
    }
}
