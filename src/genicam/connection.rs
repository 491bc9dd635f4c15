//! Session state machine: device discovery, binding and recovery.
//!
//! A session owns exactly one transport provider and at most one open
//! device handle. The handle is always closed and the provider reset before
//! a reconnect attempt creates a new one, so a flaky producer can never
//! leave two handles on the same physical camera.

use crate::config::AcquisitionProfile;
use crate::error::{CamError, CamResult};
use crate::genicam::settings;
use crate::identity;
use crate::transport::{feature, RemoteDevice, TransportProvider};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Number of buffers announced to the producer.
///
/// Fixed regardless of profile: several producers misbehave with fewer, and
/// the discard-then-use fetch pattern needs at least two in flight.
pub const ACQUISITION_BUFFERS: usize = 3;

/// Default bounded wait for one buffer fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device bound; terminal after an explicit teardown.
    Disconnected,
    /// Enumerating producers and binding the device.
    Connecting,
    /// Applying the acquisition profile.
    Configuring,
    /// Streaming; ready for capture calls.
    Acquiring,
    /// Tearing down and re-running the connect sequence after a timeout.
    Recovering,
}

impl SessionState {
    /// Short label for logs and errors.
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Configuring => "configuring",
            SessionState::Acquiring => "acquiring",
            SessionState::Recovering => "recovering",
        }
    }
}

/// One camera's lifecycle: discovery, binding, configuration, acquisition.
pub struct CameraSession {
    pub(super) identifier: String,
    pub(super) profile: AcquisitionProfile,
    pub(super) producer_paths: Vec<PathBuf>,
    pub(super) provider: Box<dyn TransportProvider>,
    pub(super) device: Option<Box<dyn RemoteDevice>>,
    pub(super) state: SessionState,
    /// Channel count, resolved once and reused for every later frame.
    pub(super) channels: Option<u8>,
    pub(super) fetch_timeout: Duration,
}

impl CameraSession {
    /// A disconnected session for `identifier` over `provider`.
    pub fn new(
        identifier: impl Into<String>,
        profile: AcquisitionProfile,
        producer_paths: Vec<PathBuf>,
        provider: Box<dyn TransportProvider>,
    ) -> Self {
        let channels = profile.image_channels;
        Self {
            identifier: identifier.into(),
            profile,
            producer_paths,
            provider,
            device: None,
            state: SessionState::Disconnected,
            channels,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Override the per-fetch bounded wait.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Configured device identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the full Connecting -> Configuring -> Acquiring sequence.
    pub async fn connect(&mut self) -> CamResult<()> {
        self.state = SessionState::Connecting;

        let loaded = self.provider.load_producers(&self.producer_paths)?;
        if loaded.is_empty() {
            return Err(CamError::NoProducers);
        }
        for path in &loaded {
            debug!(producer = %path.display(), "loaded GenTL producer");
        }

        let candidates = self.provider.update_device_list()?;
        if candidates.is_empty() {
            return Err(CamError::NoDevices);
        }
        debug!(count = candidates.len(), "devices enumerated");

        let chosen = identity::select_device(&self.identifier, &candidates)?;
        info!(device = %chosen.id, "binding device");
        let mut device = self.provider.open_device(&chosen.id).map_err(|e| {
            warn!(
                "camera not reachable; most likely another process already \
                 holds it - one camera can be used by exactly one process"
            );
            e
        })?;

        // Chunk data confuses some producers' buffer parsing; keep it off.
        device.write_boolean(feature::CHUNK_MODE_ACTIVE, false)?;
        device.set_buffer_count(ACQUISITION_BUFFERS)?;
        self.device = Some(device);

        self.state = SessionState::Configuring;
        if let Some(device) = self.device.as_mut() {
            settings::apply_profile(device.as_mut(), &self.profile)?;
            device.start_acquisition().await?;
        }
        self.state = SessionState::Acquiring;
        debug!("acquisition started");
        Ok(())
    }

    /// Synchronous recovery after a fetch timeout: drop the handle, reset
    /// the producer stack and re-run the connect sequence.
    ///
    /// The capture that triggered the recovery is not retried; the caller
    /// observes a no-frame outcome and may issue a new capture request.
    pub async fn recover(&mut self) -> CamResult<()> {
        self.state = SessionState::Recovering;
        self.drop_device();
        self.connect().await?;
        info!("camera restarted; ready to fetch an image");
        Ok(())
    }

    /// Stop streaming and release everything.
    pub async fn disconnect(&mut self) -> CamResult<()> {
        if let Some(device) = self.device.as_mut() {
            device.stop_acquisition().await?;
        }
        self.teardown();
        Ok(())
    }

    /// Release the device handle and producer state without a stop
    /// handshake. Leaves the session in its terminal state.
    pub fn teardown(&mut self) {
        self.drop_device();
        self.state = SessionState::Disconnected;
    }

    /// Close the handle (if any) before the provider is reset, never after.
    fn drop_device(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.close();
        }
        self.provider.reset();
    }
}
