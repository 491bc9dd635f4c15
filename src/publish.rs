//! Outbound envelope construction and publication.
//!
//! Every successful capture becomes one JSON message: the capture timestamp
//! in milliseconds since epoch plus the JPEG-compressed, base64-encoded
//! image and its geometry. The image id concatenates the device identifier
//! with the timestamp, which is unique per capture within one device.

use crate::bus::BusPublisher;
use crate::error::{CamError, CamResult};
use crate::frame::FrameBuffer;
use crate::storage::ImageStorage;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use serde::Serialize;
use tracing::debug;

/// Image part of the outbound message.
#[derive(Debug, Clone, Serialize)]
pub struct ImagePayload {
    /// `<identifier>_<timestamp_ms>`, unique per capture.
    pub image_id: String,
    /// Base64-encoded JPEG bytes.
    pub image_bytes: String,
    /// Image height in pixels.
    pub image_height: u32,
    /// Image width in pixels.
    pub image_width: u32,
    /// Channel count, taken from the frame (1 mono, 3 color).
    pub image_channels: u8,
}

/// The outbound message, serialized as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct PublishEnvelope {
    /// Capture time in milliseconds since epoch.
    pub timestamp_ms: i64,
    /// The encoded image and its geometry.
    pub image: ImagePayload,
}

/// JPEG-compress a frame.
///
/// The canonical internal order is BGR; the encoder expects RGB, so color
/// frames are reordered on the way in.
pub fn encode_jpeg(frame: &FrameBuffer) -> CamResult<Vec<u8>> {
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new(&mut jpeg);
    match frame.channels {
        1 => encoder.encode(&frame.data, frame.width, frame.height, image::ColorType::L8)?,
        3 => {
            let rgb: Vec<u8> = frame
                .data
                .chunks_exact(3)
                .flat_map(|pixel| [pixel[2], pixel[1], pixel[0]])
                .collect();
            encoder.encode(&rgb, frame.width, frame.height, image::ColorType::Rgb8)?;
        }
        other => {
            return Err(CamError::Frame(format!(
                "cannot encode a {other}-channel frame"
            )))
        }
    }
    Ok(jpeg)
}

/// Assemble the envelope for an already-encoded frame.
pub fn build_envelope(
    frame: &FrameBuffer,
    jpeg: &[u8],
    identifier: &str,
    timestamp_ms: i64,
) -> PublishEnvelope {
    PublishEnvelope {
        timestamp_ms,
        image: ImagePayload {
            image_id: format!("{identifier}_{timestamp_ms}"),
            image_bytes: STANDARD.encode(jpeg),
            image_height: frame.height,
            image_width: frame.width,
            image_channels: frame.channels,
        },
    }
}

/// Encode, publish and optionally store one frame.
///
/// The publish is fire-and-forget at the lowest delivery guarantee; nothing
/// is retried here. The envelope is returned for logging/counting and not
/// retained otherwise.
pub async fn publish_frame(
    frame: &FrameBuffer,
    identifier: &str,
    publisher: &dyn BusPublisher,
    topic: &str,
    storage: Option<&ImageStorage>,
) -> CamResult<PublishEnvelope> {
    let timestamp_ms = Utc::now().timestamp_millis();
    let jpeg = encode_jpeg(frame)?;
    let envelope = build_envelope(frame, &jpeg, identifier, timestamp_ms);
    let payload = serde_json::to_vec(&envelope)?;
    publisher.publish(topic, payload).await?;

    if let Some(storage) = storage {
        let path = storage.store(&jpeg, Utc::now())?;
        debug!(path = %path.display(), "image saved");
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn bgr_frame(width: u32, height: u32) -> FrameBuffer {
        let data = vec![0u8; (width * height * 3) as usize];
        FrameBuffer::from_raw(data, height, width, 3, PixelFormat::Bgr8).unwrap()
    }

    #[test]
    fn envelope_carries_frame_geometry_and_id() {
        let frame = bgr_frame(640, 480);
        let jpeg = encode_jpeg(&frame).unwrap();
        let envelope = build_envelope(&frame, &jpeg, "00:11:22:33:44:55", 1700000000123);
        assert_eq!(envelope.image.image_id, "00:11:22:33:44:55_1700000000123");
        assert_eq!(envelope.image.image_width, 640);
        assert_eq!(envelope.image.image_height, 480);
        assert_eq!(envelope.image.image_channels, 3);
        assert!(!envelope.image.image_bytes.is_empty());
    }

    #[test]
    fn encoded_image_round_trips_through_the_decoder() {
        let frame = bgr_frame(32, 16);
        let jpeg = encode_jpeg(&frame).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 16);
    }

    #[test]
    fn mono_frames_encode_as_grayscale() {
        let data = vec![128u8; 8 * 4];
        let frame = FrameBuffer::from_raw(data, 4, 8, 1, PixelFormat::Mono8).unwrap();
        let jpeg = encode_jpeg(&frame).unwrap();
        assert!(!jpeg.is_empty());
    }

    #[test]
    fn envelope_serializes_with_expected_keys() {
        let frame = bgr_frame(2, 2);
        let jpeg = encode_jpeg(&frame).unwrap();
        let envelope = build_envelope(&frame, &jpeg, "cam", 42);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["timestamp_ms"], 42);
        assert_eq!(json["image"]["image_id"], "cam_42");
        assert_eq!(json["image"]["image_height"], 2);
        assert!(json["image"]["image_bytes"].is_string());
    }
}
