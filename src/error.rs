//! Custom error types for the application.
//!
//! `CamError` consolidates every failure the bridge can hit, from
//! configuration parsing to device binding and frame publication. The
//! variants fall into three categories:
//!
//! 1. **Fatal** — the process must terminate: missing producer files, no
//!    devices on the bus, an identifier that matches nothing, a device held
//!    by another process, an exposure the device rejects, an unsupported
//!    pixel format. [`CamError::is_fatal`] classifies these; only the binary
//!    entry point maps them to a process exit so the components themselves
//!    stay testable.
//! 2. **Recoverable** — absorbed inside the session: a fetch timeout
//!    triggers a full reconnect and the capture simply yields no frame.
//! 3. **Per-capture** — encoding or publish failures that the trigger loop
//!    counts against its error tolerance.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type CamResult<T> = std::result::Result<T, CamError>;

/// Primary error type for the capture bridge.
#[derive(Error, Debug)]
pub enum CamError {
    /// Configuration file or environment parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration values parsed but fail semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No GenTL producer backend could be loaded.
    #[error("No valid GenTL producer file found")]
    NoProducers,

    /// Producer enumeration returned an empty device list.
    #[error("No compatible devices detected")]
    NoDevices,

    /// No enumerated device matched the configured identifier.
    #[error("No device matches identifier '{identifier}'")]
    IdentifierMismatch {
        /// The identifier the session was configured to bind.
        identifier: String,
    },

    /// Device creation/open failed, most likely because another process
    /// already holds it.
    #[error("Device '{id}' not reachable: {message}")]
    DeviceOpen {
        /// Raw identifier of the device that failed to open.
        id: String,
        /// Transport-reported reason.
        message: String,
    },

    /// A feature node read/write/execute failed on the device.
    #[error("Feature '{feature}' access failed: {message}")]
    Feature {
        /// GenICam feature node name.
        feature: &'static str,
        /// Transport-reported reason.
        message: String,
    },

    /// The device rejected a value as out of its supported range.
    #[error("Value for feature '{feature}' out of the device's supported range")]
    FeatureOutOfRange {
        /// GenICam feature node name.
        feature: &'static str,
    },

    /// A fetched frame reported a pixel format the bridge cannot interpret.
    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    /// Bounded-wait buffer fetch expired. Handled internally by the session
    /// recovery sequence; callers observe a no-frame capture instead.
    #[error("Timed out waiting for an image buffer")]
    FetchTimeout,

    /// A capture was requested while the session holds no streaming device.
    #[error("Session is not acquiring (state: {state})")]
    NotAcquiring {
        /// State the session was in when capture was requested.
        state: &'static str,
    },

    /// Frame payload did not match the resolved geometry.
    #[error("Frame error: {0}")]
    Frame(String),

    /// Image encode/decode failed.
    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    /// Envelope or trigger payload (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Message bus operation failed.
    #[error("Bus error: {0}")]
    Bus(String),

    /// A trigger message could not be served.
    #[error("Trigger error: {0}")]
    Trigger(String),

    /// Too many consecutive capture failures in the trigger loop.
    #[error("Error tolerance exceeded after {total} total errors ({consecutive} consecutive)")]
    ErrorToleranceExceeded {
        /// Errors counted since the process started.
        total: u64,
        /// Errors counted since the last successful capture.
        consecutive: u64,
    },

    /// No image was published within the liveness window while serving.
    #[error("No image published for {seconds} s, assuming stalled acquisition")]
    Stalled {
        /// Watchdog interval that elapsed without a publish.
        seconds: u64,
    },
}

impl CamError {
    /// Whether this error must terminate the process.
    ///
    /// Matches the propagation policy: fatal errors abort (no partially
    /// configured session is left running), everything else is either
    /// absorbed by the session or counted by the trigger loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CamError::Config(_)
                | CamError::Configuration(_)
                | CamError::NoProducers
                | CamError::NoDevices
                | CamError::IdentifierMismatch { .. }
                | CamError::DeviceOpen { .. }
                | CamError::FeatureOutOfRange { .. }
                | CamError::UnsupportedPixelFormat(_)
                | CamError::ErrorToleranceExceeded { .. }
                | CamError::Stalled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(CamError::NoProducers.is_fatal());
        assert!(CamError::IdentifierMismatch {
            identifier: "aa:bb".into()
        }
        .is_fatal());
        assert!(CamError::UnsupportedPixelFormat("Mono12".into()).is_fatal());
        assert!(!CamError::FetchTimeout.is_fatal());
        assert!(!CamError::Frame("short payload".into()).is_fatal());
        assert!(!CamError::Bus("publish failed".into()).is_fatal());
    }

    #[test]
    fn display_includes_context() {
        let err = CamError::DeviceOpen {
            id: "dev0".into(),
            message: "already in use".into(),
        };
        assert!(err.to_string().contains("dev0"));
        assert!(err.to_string().contains("already in use"));
    }
}
