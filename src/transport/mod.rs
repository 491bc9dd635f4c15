//! GenTL transport boundary.
//!
//! The vendor producer/driver stack lives behind these traits: backend
//! loading, device enumeration, feature-node access and buffer delivery.
//! [`mock`] implements the boundary in-process for tests and for running
//! the bridge without a vendor producer installed.

pub mod mock;

use crate::error::CamResult;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// GenICam feature node names the bridge touches.
pub mod feature {
    /// Region-of-interest width.
    pub const WIDTH: &str = "Width";
    /// Sensor maximum width.
    pub const WIDTH_MAX: &str = "WidthMax";
    /// Region-of-interest height.
    pub const HEIGHT: &str = "Height";
    /// Sensor maximum height.
    pub const HEIGHT_MAX: &str = "HeightMax";
    /// Horizontal readout offset.
    pub const OFFSET_X: &str = "OffsetX";
    /// Vertical readout offset.
    pub const OFFSET_Y: &str = "OffsetY";
    /// Pixel format selector.
    pub const PIXEL_FORMAT: &str = "PixelFormat";
    /// Absolute exposure time in microseconds.
    pub const EXPOSURE_TIME: &str = "ExposureTimeAbs";
    /// Automatic exposure mode.
    pub const EXPOSURE_AUTO: &str = "ExposureAuto";
    /// Automatic gain mode.
    pub const GAIN_AUTO: &str = "GainAuto";
    /// Automatic white-balance mode.
    pub const BALANCE_WHITE_AUTO: &str = "BalanceWhiteAuto";
    /// Stored-profile selector.
    pub const USER_SET_SELECTOR: &str = "UserSetSelector";
    /// Command loading the selected stored profile.
    pub const USER_SET_LOAD: &str = "UserSetLoad";
    /// Chunk-data transmission flag.
    pub const CHUNK_MODE_ACTIVE: &str = "ChunkModeActive";
}

/// One entry of the enumerated device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Producer-reported identifier (usually MAC-derived).
    pub id: String,
    /// Vendor name, when the producer reports one.
    pub vendor: Option<String>,
    /// Model name, when the producer reports one.
    pub model: Option<String>,
}

/// Entry point into one GenTL producer stack.
///
/// Exclusively owned by a single camera session; `reset` returns the stack
/// to its unloaded state so a recovery can re-run discovery from scratch.
pub trait TransportProvider: Send {
    /// Load producer backend files; returns the paths actually loaded.
    fn load_producers(&mut self, paths: &[PathBuf]) -> CamResult<Vec<PathBuf>>;

    /// Refresh and return the list of reachable devices.
    fn update_device_list(&mut self) -> CamResult<Vec<DeviceInfo>>;

    /// Create and open a device by its raw enumeration id.
    fn open_device(&mut self, id: &str) -> CamResult<Box<dyn RemoteDevice>>;

    /// Drop all producer/driver state.
    fn reset(&mut self);
}

/// An opened device: feature access and buffer delivery.
#[async_trait]
pub trait RemoteDevice: Send {
    /// Read an integer feature node.
    fn read_integer(&self, feature: &'static str) -> CamResult<i64>;

    /// Write an integer feature node.
    fn write_integer(&mut self, feature: &'static str, value: i64) -> CamResult<()>;

    /// Write a float feature node.
    fn write_float(&mut self, feature: &'static str, value: f64) -> CamResult<()>;

    /// Write an enumeration feature node by entry name.
    fn write_enumeration(&mut self, feature: &'static str, value: &str) -> CamResult<()>;

    /// Write a boolean feature node.
    fn write_boolean(&mut self, feature: &'static str, value: bool) -> CamResult<()>;

    /// Execute a command feature node.
    fn execute(&mut self, feature: &'static str) -> CamResult<()>;

    /// Whether the device's node map advertises a feature.
    fn has_feature(&self, feature: &'static str) -> bool;

    /// Announce the number of acquisition buffers to the producer.
    fn set_buffer_count(&mut self, count: usize) -> CamResult<()>;

    /// Start the streaming engine.
    async fn start_acquisition(&mut self) -> CamResult<()>;

    /// Stop the streaming engine.
    async fn stop_acquisition(&mut self) -> CamResult<()>;

    /// Wait up to `timeout` for a filled buffer.
    ///
    /// Expiry is reported as [`crate::error::CamError::FetchTimeout`]. The
    /// returned guard requeues the buffer to the producer when dropped, on
    /// every exit path.
    async fn fetch_buffer(&mut self, timeout: Duration) -> CamResult<AcquiredBuffer>;

    /// Release the device handle. Idempotent.
    fn close(&mut self);
}

/// A fetched image buffer, requeued to the producer on drop.
pub struct AcquiredBuffer {
    width: u32,
    height: u32,
    pixel_format: String,
    data: Vec<u8>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl AcquiredBuffer {
    /// Wrap a delivered buffer with its requeue action.
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: impl Into<String>,
        data: Vec<u8>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            width,
            height,
            pixel_format: pixel_format.into(),
            data,
            release: Some(Box::new(release)),
        }
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Format tag as reported by the producer.
    pub fn pixel_format(&self) -> &str {
        &self.pixel_format
    }

    /// Raw payload. Copy out what you need; the backing buffer returns to
    /// the producer when the guard drops.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for AcquiredBuffer {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for AcquiredBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .field("bytes", &self.data.len())
            .finish()
    }
}
