//! camconnect: GenICam camera to MQTT capture bridge.
//!
//! Binds exactly one machine-vision camera (GigE Vision / USB3 Vision via a
//! GenTL producer) by its physical identifier, applies an acquisition
//! profile, and publishes one base64-encoded JPEG envelope per external
//! trigger. A dummy camera variant replays a static image so downstream
//! pipelines can be exercised without hardware.
//!
//! The vendor GenTL stack is reached through the trait boundary in
//! [`transport`]; [`transport::mock`] implements it for tests and for
//! running without a vendor producer.

pub mod bus;
pub mod capabilities;
pub mod config;
pub mod dummy;
pub mod error;
pub mod frame;
pub mod genicam;
pub mod identity;
pub mod logging;
pub mod publish;
pub mod storage;
pub mod transport;
pub mod trigger;

pub use capabilities::Camera;
pub use config::Settings;
pub use error::{CamError, CamResult};
pub use frame::{FrameBuffer, PixelFormat};
pub use publish::PublishEnvelope;
