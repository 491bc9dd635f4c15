//! GenICam camera driver.
//!
//! Component split:
//! - [`connection`]: session state machine, device binding, recovery
//! - [`settings`]: profile application with capability gating
//! - [`acquisition`]: double-fetch capture with timeout recovery

pub mod acquisition;
pub mod connection;
pub mod settings;

pub use connection::{CameraSession, SessionState, ACQUISITION_BUFFERS};

use crate::bus::BusPublisher;
use crate::capabilities::Camera;
use crate::error::CamResult;
use crate::publish::{self, PublishEnvelope};
use crate::storage::ImageStorage;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Hardware-backed camera: one bound GenICam device publishing to one topic.
pub struct GenICamCamera {
    session: CameraSession,
    publisher: Arc<dyn BusPublisher>,
    topic: String,
    storage: Option<ImageStorage>,
}

impl GenICamCamera {
    /// Bind, configure and start the session, returning a camera that is
    /// ready to serve capture calls.
    pub async fn connect(
        mut session: CameraSession,
        publisher: Arc<dyn BusPublisher>,
        topic: String,
        storage: Option<ImageStorage>,
    ) -> CamResult<Self> {
        session.connect().await?;
        Ok(Self {
            session,
            publisher,
            topic,
            storage,
        })
    }

    /// The session driving this camera.
    pub fn session(&self) -> &CameraSession {
        &self.session
    }
}

#[async_trait]
impl Camera for GenICamCamera {
    async fn capture(&mut self) -> CamResult<Option<PublishEnvelope>> {
        let Some(frame) = self.session.capture_frame().await? else {
            // A fetch timeout was absorbed by the recovery sequence; the
            // caller has to issue a new trigger for the next attempt.
            return Ok(None);
        };
        let envelope = publish::publish_frame(
            &frame,
            self.session.identifier(),
            self.publisher.as_ref(),
            &self.topic,
            self.storage.as_ref(),
        )
        .await?;
        debug!(topic = %self.topic, "image converted and published");
        Ok(Some(envelope))
    }

    async fn disconnect(&mut self) -> CamResult<()> {
        self.publisher.disconnect().await?;
        self.session.disconnect().await
    }

    fn teardown(&mut self) {
        self.session.teardown();
    }
}
