//! Dummy camera: replays one static image per capture.
//!
//! Ignores all device state. Used to validate broker wiring and downstream
//! consumers without hardware attached.

use crate::bus::BusPublisher;
use crate::capabilities::Camera;
use crate::error::CamResult;
use crate::frame::{FrameBuffer, PixelFormat};
use crate::publish::{self, PublishEnvelope};
use crate::storage::ImageStorage;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Static-image camera variant.
pub struct DummyCamera {
    identifier: String,
    image_path: PathBuf,
    publisher: Arc<dyn BusPublisher>,
    topic: String,
    storage: Option<ImageStorage>,
}

impl DummyCamera {
    /// A dummy camera serving the image at `image_path`.
    pub fn new(
        identifier: impl Into<String>,
        image_path: impl Into<PathBuf>,
        publisher: Arc<dyn BusPublisher>,
        topic: String,
        storage: Option<ImageStorage>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            image_path: image_path.into(),
            publisher,
            topic,
            storage,
        }
    }
}

#[async_trait]
impl Camera for DummyCamera {
    async fn capture(&mut self) -> CamResult<Option<PublishEnvelope>> {
        let decoded = image::open(&self.image_path)?.to_rgb8();
        let (width, height) = decoded.dimensions();
        // from_raw reorders the decoded RGB payload into canonical BGR.
        let frame = FrameBuffer::from_raw(decoded.into_raw(), height, width, 3, PixelFormat::Rgb8)?;
        debug!(path = %self.image_path.display(), "static image fetched");

        let envelope = publish::publish_frame(
            &frame,
            &self.identifier,
            self.publisher.as_ref(),
            &self.topic,
            self.storage.as_ref(),
        )
        .await?;
        Ok(Some(envelope))
    }

    async fn disconnect(&mut self) -> CamResult<()> {
        self.publisher.disconnect().await
    }

    fn teardown(&mut self) {
        // No device state to release.
    }
}
