//! Capture path: bounded-wait buffer fetches with timeout recovery.

use crate::error::{CamError, CamResult};
use crate::frame::{FrameBuffer, PixelFormat};
use crate::genicam::connection::{CameraSession, SessionState};
use tracing::{debug, error};

/// What one bounded-wait fetch produced, with the buffer already requeued.
struct FetchedImage {
    width: u32,
    height: u32,
    pixel_format: String,
    data: Vec<u8>,
}

impl CameraSession {
    /// Fetch one fresh frame, or `None` when a timeout forced recovery.
    ///
    /// Two fetches per capture: the first drains a buffer that may have
    /// been filled before the trigger and is discarded unused, trading
    /// latency for freshness; the second is the frame that gets published.
    /// A timeout on either fetch tears the device down, resets the producer
    /// stack and re-runs the full connect sequence before returning - the
    /// capture itself is not retried.
    pub async fn capture_frame(&mut self) -> CamResult<Option<FrameBuffer>> {
        if self.state != SessionState::Acquiring {
            return Err(CamError::NotAcquiring {
                state: self.state.label(),
            });
        }

        // Flush the possibly-stale buffer; its guard requeues it untouched.
        match self.fetch_once().await {
            Ok(stale) => {
                debug!(bytes = stale.data.len(), "discarded pre-trigger buffer");
            }
            Err(CamError::FetchTimeout) => return self.recover_after_timeout().await,
            Err(e) => return Err(e),
        }

        let fetched = match self.fetch_once().await {
            Ok(image) => image,
            Err(CamError::FetchTimeout) => return self.recover_after_timeout().await,
            Err(e) => return Err(e),
        };
        debug!("image fetched");

        // Unknown formats are rejected before a frame exists, even when the
        // channel count was configured explicitly.
        let format = PixelFormat::from_tag(&fetched.pixel_format)
            .ok_or_else(|| CamError::UnsupportedPixelFormat(fetched.pixel_format.clone()))?;
        let channels = match self.channels {
            Some(channels) => channels,
            None => {
                let channels = format.channels();
                self.channels = Some(channels);
                channels
            }
        };

        let frame = FrameBuffer::from_raw(
            fetched.data,
            fetched.height,
            fetched.width,
            channels,
            format,
        )?;
        Ok(Some(frame))
    }

    /// One bounded-wait fetch; the payload is copied out and the producer's
    /// buffer requeued before this returns, on every path.
    async fn fetch_once(&mut self) -> CamResult<FetchedImage> {
        let timeout = self.fetch_timeout;
        let device = self.device.as_mut().ok_or(CamError::NotAcquiring {
            state: self.state.label(),
        })?;
        let buffer = device.fetch_buffer(timeout).await?;
        Ok(FetchedImage {
            width: buffer.width(),
            height: buffer.height(),
            pixel_format: buffer.pixel_format().to_string(),
            data: buffer.data().to_vec(),
        })
    }

    async fn recover_after_timeout(&mut self) -> CamResult<Option<FrameBuffer>> {
        error!("timeout while fetching an image; camera reset and restart");
        self.recover().await?;
        Ok(None)
    }
}
