//! Camera capability set.
//!
//! Both camera variants expose the same three operations; callers dispatch
//! on the trait object, never on a concrete type. A camera is not designed
//! for concurrent captures - `&mut self` makes one in-flight capture per
//! instance a compile-time guarantee.

use crate::error::CamResult;
use crate::publish::PublishEnvelope;
use async_trait::async_trait;

/// The capability set shared by the hardware and dummy cameras.
#[async_trait]
pub trait Camera: Send {
    /// Acquire one image and publish it.
    ///
    /// Returns the published envelope, or `None` when a hardware timeout
    /// was absorbed by the internal recovery sequence - the trigger is not
    /// retried, nothing was published, and the caller may simply issue the
    /// next capture request.
    async fn capture(&mut self) -> CamResult<Option<PublishEnvelope>>;

    /// Close the bus connection and release the device.
    async fn disconnect(&mut self) -> CamResult<()>;

    /// Release device and driver state without the bus handshake.
    fn teardown(&mut self);
}
