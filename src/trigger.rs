//! MQTT-driven acquisition triggering.
//!
//! One capture per trigger message, strictly sequential. A consecutive-
//! error budget guards against a wedged camera or broker: too many failures
//! without a success in between terminates the process so the supervisor
//! can restart it. The liveness watchdog covers the complementary failure
//! mode where triggers stop arriving entirely (zombie connection).

use crate::capabilities::Camera;
use crate::error::{CamError, CamResult};
use chrono::Utc;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Consecutive failures after which the process gives up.
pub const ERROR_TOLERANCE: u64 = 20;

/// Longest acquisition delay that will be honored.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60);

/// Fields of interest in a trigger message.
#[derive(Debug, Deserialize)]
struct TriggerPayload {
    /// Trigger creation time; the acquisition delay is measured from it.
    timestamp_ms: Option<i64>,
}

/// Serves capture requests arriving on the trigger topic.
pub struct MqttTrigger {
    camera: Box<dyn Camera>,
    triggers: mpsc::Receiver<Vec<u8>>,
    acquisition_delay: Duration,
    published: Arc<AtomicU64>,
    total_errors: u64,
    errors_since_success: u64,
}

impl MqttTrigger {
    /// A trigger loop feeding `camera` from `triggers`.
    pub fn new(
        camera: Box<dyn Camera>,
        triggers: mpsc::Receiver<Vec<u8>>,
        acquisition_delay: Duration,
    ) -> Self {
        Self {
            camera,
            triggers,
            acquisition_delay,
            published: Arc::new(AtomicU64::new(0)),
            total_errors: 0,
            errors_since_success: 0,
        }
    }

    /// Counter of published images, shared with the liveness watchdog.
    pub fn published_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.published)
    }

    /// Run until the trigger channel closes or a fatal error occurs.
    pub async fn run(mut self) -> CamResult<()> {
        info!("awaiting acquisition triggers");
        while let Some(payload) = self.triggers.recv().await {
            let received_ms = Utc::now().timestamp_millis();
            info!("image acquisition trigger received");
            match self.serve_trigger(&payload, received_ms).await {
                Ok(()) => self.errors_since_success = 0,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(error = %e, "failed to serve trigger");
                    self.count_error()?;
                }
            }
        }
        // Channel closed: the bus network loop is gone, nothing to serve.
        warn!("trigger channel closed; stopping");
        self.camera.disconnect().await
    }

    async fn serve_trigger(&mut self, payload: &[u8], received_ms: i64) -> CamResult<()> {
        if self.acquisition_delay > Duration::ZERO {
            self.wait_for_deadline(payload, received_ms).await?;
        }
        match self.camera.capture().await? {
            Some(envelope) => {
                self.published.fetch_add(1, Ordering::SeqCst);
                debug!(image_id = %envelope.image.image_id, "capture published");
            }
            None => {
                warn!("no frame for this trigger; camera recovered, awaiting next trigger");
            }
        }
        Ok(())
    }

    /// Sleep until `trigger timestamp + acquisition delay`.
    ///
    /// A deadline that already passed means the configured delay is shorter
    /// than the processing time, which can never be honored: fatal.
    async fn wait_for_deadline(&self, payload: &[u8], received_ms: i64) -> CamResult<()> {
        let reference_ms = serde_json::from_slice::<TriggerPayload>(payload)
            .ok()
            .and_then(|t| t.timestamp_ms)
            .unwrap_or(received_ms);
        let due_ms = reference_ms + self.acquisition_delay.as_millis() as i64;
        let now_ms = Utc::now().timestamp_millis();
        if due_ms < now_ms {
            return Err(CamError::Configuration(
                "acquisition delay is shorter than the processing time".into(),
            ));
        }
        let wait = Duration::from_millis((due_ms - now_ms) as u64);
        if wait > MAX_DELAY {
            return Err(CamError::Trigger(format!(
                "implausible acquisition deadline {wait:?} ahead; dropping trigger"
            )));
        }
        debug!(?wait, "sleeping until acquisition deadline");
        tokio::time::sleep(wait).await;
        Ok(())
    }

    fn count_error(&mut self) -> CamResult<()> {
        self.total_errors += 1;
        self.errors_since_success += 1;
        debug!(
            total = self.total_errors,
            consecutive = self.errors_since_success,
            "error counted"
        );
        if self.errors_since_success > ERROR_TOLERANCE {
            return Err(CamError::ErrorToleranceExceeded {
                total: self.total_errors,
                consecutive: self.errors_since_success,
            });
        }
        Ok(())
    }
}

/// Resolve only when no image was published for a whole interval.
///
/// Guards against zombie broker connections and wedged producer stacks that
/// stop delivering without surfacing an error anywhere else.
pub async fn watchdog(published: Arc<AtomicU64>, interval: Duration) -> CamError {
    let mut last = published.load(Ordering::SeqCst);
    loop {
        tokio::time::sleep(interval).await;
        let current = published.load(Ordering::SeqCst);
        if current == last {
            return CamError::Stalled {
                seconds: interval.as_secs(),
            };
        }
        info!(images = current - last, "still running");
        last = current;
    }
}
