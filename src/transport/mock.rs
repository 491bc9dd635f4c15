//! Mock GenTL transport.
//!
//! Scriptable producer/device implementation of the transport boundary.
//! Used by the test suite and as the fallback backend when no vendor
//! producer is installed. Devices are scripted with a frame queue (images
//! or injected timeouts) and optional fault injection; every interaction is
//! recorded in a journal the tests can inspect through the shared state
//! handle.

use crate::error::{CamError, CamResult};
use crate::transport::{feature, AcquiredBuffer, DeviceInfo, RemoteDevice, TransportProvider};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// A value written to a feature node, as recorded in the journal.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    /// Integer node write.
    Int(i64),
    /// Float node write.
    Float(f64),
    /// Enumeration node write (entry name).
    Enum(String),
    /// Boolean node write.
    Bool(bool),
}

/// One scripted delivery from a device's frame queue.
#[derive(Debug, Clone)]
pub enum MockFrame {
    /// A filled buffer.
    Image {
        /// Reported width.
        width: u32,
        /// Reported height.
        height: u32,
        /// Reported format tag.
        pixel_format: String,
        /// Raw payload.
        data: Vec<u8>,
    },
    /// The producer delivers nothing within the bounded wait.
    Timeout,
}

impl MockFrame {
    /// A deterministic test-pattern image for a known format tag.
    pub fn image(pixel_format: &str, width: u32, height: u32) -> Self {
        let channels: usize = match pixel_format {
            "Mono8" => 1,
            _ => 3,
        };
        let mut data = Vec::with_capacity(width as usize * height as usize * channels);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    data.push(((x + y + c as u32) % 256) as u8);
                }
            }
        }
        MockFrame::Image {
            width,
            height,
            pixel_format: pixel_format.to_string(),
            data,
        }
    }

    /// An image with an explicit raw payload.
    pub fn raw(pixel_format: &str, width: u32, height: u32, data: Vec<u8>) -> Self {
        MockFrame::Image {
            width,
            height,
            pixel_format: pixel_format.to_string(),
            data,
        }
    }
}

/// Scripted behavior of one mock device.
#[derive(Debug)]
pub struct MockDeviceSpec {
    /// Raw enumeration id.
    pub id: String,
    /// Sensor maximum width.
    pub width_max: i64,
    /// Sensor maximum height.
    pub height_max: i64,
    /// Optional features the node map advertises beyond the base set.
    pub advertised: HashSet<&'static str>,
    /// When set, opening the device fails with this message.
    pub open_error: Option<String>,
    /// Accepted exposure range; writes outside it are rejected.
    pub exposure_range: Option<(f64, f64)>,
    /// How many times enumeration reports this device (driver-bug mode).
    pub enumerations: u32,
    /// Pending deliveries; an empty queue behaves like a timeout.
    pub frames: VecDeque<MockFrame>,
    /// When set, an empty queue generates a test-pattern image of this
    /// (format, width, height) instead of timing out.
    pub synthetic: Option<(String, u32, u32)>,
    /// Current integer node values.
    pub integers: HashMap<&'static str, i64>,
    /// Whether a handle is currently open on this device.
    pub held: bool,
}

impl MockDeviceSpec {
    /// A device with a 1920x1080 sensor and the base node map.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            width_max: 1920,
            height_max: 1080,
            advertised: HashSet::new(),
            open_error: None,
            exposure_range: None,
            enumerations: 1,
            frames: VecDeque::new(),
            synthetic: None,
            integers: HashMap::new(),
            held: false,
        }
    }

    /// Set the sensor maximum geometry.
    pub fn sensor(mut self, width_max: i64, height_max: i64) -> Self {
        self.width_max = width_max;
        self.height_max = height_max;
        self
    }

    /// Advertise an optional feature (e.g. one of the auto modes).
    pub fn advertise(mut self, feature: &'static str) -> Self {
        self.advertised.insert(feature);
        self
    }

    /// Make opening the device fail.
    pub fn open_error(mut self, message: &str) -> Self {
        self.open_error = Some(message.to_string());
        self
    }

    /// Restrict the accepted exposure range.
    pub fn exposure_range(mut self, min: f64, max: f64) -> Self {
        self.exposure_range = Some((min, max));
        self
    }

    /// Report this device `count` times during enumeration.
    pub fn enumerations(mut self, count: u32) -> Self {
        self.enumerations = count;
        self
    }

    /// Append a scripted delivery.
    pub fn push_frame(mut self, frame: MockFrame) -> Self {
        self.frames.push_back(frame);
        self
    }

    /// Generate endless test-pattern images once the queue is drained.
    pub fn synthetic(mut self, pixel_format: &str, width: u32, height: u32) -> Self {
        self.synthetic = Some((pixel_format.to_string(), width, height));
        self
    }
}

/// Everything the tests may want to assert on afterwards.
#[derive(Debug, Default)]
pub struct TransportJournal {
    /// Ids passed to successful `open_device` calls.
    pub opened: Vec<String>,
    /// Number of `reset` calls on the provider.
    pub resets: u32,
    /// Number of `close` calls on devices.
    pub closes: u32,
    /// Number of acquisition starts.
    pub starts: u32,
    /// Number of acquisition stops.
    pub stops: u32,
    /// Buffers handed back to the producer.
    pub requeues: u32,
    /// Every feature write, in order.
    pub writes: Vec<(&'static str, FeatureValue)>,
    /// Every command execution, in order.
    pub executes: Vec<&'static str>,
}

impl TransportJournal {
    /// Whether any write touched `feature`.
    pub fn wrote(&self, feature: &str) -> bool {
        self.writes.iter().any(|(name, _)| *name == feature)
    }

    /// Last value written to `feature`, if any.
    pub fn last_write(&self, feature: &str) -> Option<&FeatureValue> {
        self.writes
            .iter()
            .rev()
            .find(|(name, _)| *name == feature)
            .map(|(_, value)| value)
    }
}

/// Shared state behind the provider and all of its devices.
#[derive(Debug, Default)]
pub struct MockTransportState {
    /// Producer files that "exist" on this system.
    pub producers: Vec<PathBuf>,
    /// Producer files currently loaded.
    pub loaded: Vec<PathBuf>,
    /// Scripted devices.
    pub devices: Vec<MockDeviceSpec>,
    /// Interaction record.
    pub journal: TransportJournal,
}

/// Scriptable implementation of [`TransportProvider`].
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    /// An empty transport: no producers, no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a producer file as present.
    pub fn with_producer(self, path: &str) -> Self {
        self.lock().producers.push(PathBuf::from(path));
        self
    }

    /// Script a device.
    pub fn with_device(self, spec: MockDeviceSpec) -> Self {
        self.lock().devices.push(spec);
        self
    }

    /// Handle to the shared state for assertions after the transport has
    /// been moved into a session.
    pub fn shared(&self) -> Arc<Mutex<MockTransportState>> {
        Arc::clone(&self.state)
    }

    /// A self-contained simulation: one producer and one device matching
    /// `identifier` that generates test-pattern frames forever.
    ///
    /// Returns the transport plus the producer paths a session must be
    /// configured with. This is the fallback backend when no vendor GenTL
    /// stack is available on the host.
    pub fn simulated(identifier: &str) -> (Self, Vec<PathBuf>) {
        let producer = "simulated/producer.cti";
        let transport = Self::new().with_producer(producer).with_device(
            MockDeviceSpec::new(identifier)
                .advertise(feature::EXPOSURE_AUTO)
                .advertise(feature::GAIN_AUTO)
                .synthetic("Mono8", 800, 800),
        );
        (transport, vec![PathBuf::from(producer)])
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, MockTransportState> {
        self.state.lock().expect("mock transport state poisoned")
    }
}

impl TransportProvider for MockTransport {
    fn load_producers(&mut self, paths: &[PathBuf]) -> CamResult<Vec<PathBuf>> {
        let mut state = self.lock();
        let loaded: Vec<PathBuf> = paths
            .iter()
            .filter(|p| state.producers.contains(p))
            .cloned()
            .collect();
        debug!(requested = paths.len(), loaded = loaded.len(), "loading producers");
        state.loaded = loaded.clone();
        Ok(loaded)
    }

    fn update_device_list(&mut self) -> CamResult<Vec<DeviceInfo>> {
        let state = self.lock();
        if state.loaded.is_empty() {
            return Ok(Vec::new());
        }
        let mut list = Vec::new();
        for spec in &state.devices {
            for _ in 0..spec.enumerations {
                list.push(DeviceInfo {
                    id: spec.id.clone(),
                    vendor: None,
                    model: None,
                });
            }
        }
        Ok(list)
    }

    fn open_device(&mut self, id: &str) -> CamResult<Box<dyn RemoteDevice>> {
        let mut state = self.lock();
        let spec = state
            .devices
            .iter_mut()
            .find(|spec| spec.id == id)
            .ok_or_else(|| CamError::DeviceOpen {
                id: id.to_string(),
                message: "no such device".to_string(),
            })?;
        if let Some(message) = &spec.open_error {
            return Err(CamError::DeviceOpen {
                id: id.to_string(),
                message: message.clone(),
            });
        }
        if spec.held {
            return Err(CamError::DeviceOpen {
                id: id.to_string(),
                message: "device handle already open".to_string(),
            });
        }
        spec.held = true;
        // Reset geometry nodes to the sensor defaults on open.
        let (width_max, height_max) = (spec.width_max, spec.height_max);
        spec.integers.insert(feature::WIDTH, width_max);
        spec.integers.insert(feature::HEIGHT, height_max);
        state.journal.opened.push(id.to_string());
        Ok(Box::new(MockDevice {
            id: id.to_string(),
            state: Arc::clone(&self.state),
            open: true,
        }))
    }

    fn reset(&mut self) {
        let mut state = self.lock();
        state.loaded.clear();
        for spec in &mut state.devices {
            spec.held = false;
        }
        state.journal.resets += 1;
    }
}

/// Device handle produced by [`MockTransport::open_device`].
struct MockDevice {
    id: String,
    state: Arc<Mutex<MockTransportState>>,
    open: bool,
}

impl MockDevice {
    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, MockTransportState> {
        self.state.lock().expect("mock transport state poisoned")
    }

    fn with_spec<T>(
        &self,
        f: impl FnOnce(&mut MockDeviceSpec, &mut TransportJournal) -> CamResult<T>,
    ) -> CamResult<T> {
        let mut state = self.lock();
        let MockTransportState {
            devices, journal, ..
        } = &mut *state;
        let spec = devices
            .iter_mut()
            .find(|spec| spec.id == self.id)
            .ok_or_else(|| CamError::Feature {
                feature: "NodeMap",
                message: "device vanished".to_string(),
            })?;
        f(spec, journal)
    }

    fn base_feature(feature_name: &str) -> bool {
        matches!(
            feature_name,
            feature::WIDTH
                | feature::WIDTH_MAX
                | feature::HEIGHT
                | feature::HEIGHT_MAX
                | feature::OFFSET_X
                | feature::OFFSET_Y
                | feature::PIXEL_FORMAT
                | feature::EXPOSURE_TIME
                | feature::USER_SET_SELECTOR
                | feature::USER_SET_LOAD
                | feature::CHUNK_MODE_ACTIVE
        )
    }
}

#[async_trait]
impl RemoteDevice for MockDevice {
    fn read_integer(&self, feature_name: &'static str) -> CamResult<i64> {
        self.with_spec(|spec, _| match feature_name {
            feature::WIDTH_MAX => Ok(spec.width_max),
            feature::HEIGHT_MAX => Ok(spec.height_max),
            other => spec
                .integers
                .get(other)
                .copied()
                .ok_or_else(|| CamError::Feature {
                    feature: feature_name,
                    message: "no such integer node".to_string(),
                }),
        })
    }

    fn write_integer(&mut self, feature_name: &'static str, value: i64) -> CamResult<()> {
        self.with_spec(|spec, journal| {
            spec.integers.insert(feature_name, value);
            journal.writes.push((feature_name, FeatureValue::Int(value)));
            Ok(())
        })
    }

    fn write_float(&mut self, feature_name: &'static str, value: f64) -> CamResult<()> {
        self.with_spec(|spec, journal| {
            if feature_name == feature::EXPOSURE_TIME {
                if let Some((min, max)) = spec.exposure_range {
                    if value < min || value > max {
                        return Err(CamError::FeatureOutOfRange {
                            feature: feature_name,
                        });
                    }
                }
            }
            journal
                .writes
                .push((feature_name, FeatureValue::Float(value)));
            Ok(())
        })
    }

    fn write_enumeration(&mut self, feature_name: &'static str, value: &str) -> CamResult<()> {
        self.with_spec(|spec, journal| {
            let _ = spec;
            journal
                .writes
                .push((feature_name, FeatureValue::Enum(value.to_string())));
            Ok(())
        })
    }

    fn write_boolean(&mut self, feature_name: &'static str, value: bool) -> CamResult<()> {
        self.with_spec(|_, journal| {
            journal
                .writes
                .push((feature_name, FeatureValue::Bool(value)));
            Ok(())
        })
    }

    fn execute(&mut self, feature_name: &'static str) -> CamResult<()> {
        self.with_spec(|_, journal| {
            journal.executes.push(feature_name);
            Ok(())
        })
    }

    fn has_feature(&self, feature_name: &'static str) -> bool {
        if Self::base_feature(feature_name) {
            return true;
        }
        self.with_spec(|spec, _| Ok(spec.advertised.contains(feature_name)))
            .unwrap_or(false)
    }

    fn set_buffer_count(&mut self, count: usize) -> CamResult<()> {
        self.with_spec(|_, journal| {
            journal
                .writes
                .push(("NumBuffers", FeatureValue::Int(count as i64)));
            Ok(())
        })
    }

    async fn start_acquisition(&mut self) -> CamResult<()> {
        self.with_spec(|_, journal| {
            journal.starts += 1;
            Ok(())
        })
    }

    async fn stop_acquisition(&mut self) -> CamResult<()> {
        self.with_spec(|_, journal| {
            journal.stops += 1;
            Ok(())
        })
    }

    async fn fetch_buffer(&mut self, timeout: Duration) -> CamResult<AcquiredBuffer> {
        let next = self.with_spec(|spec, _| {
            Ok(spec.frames.pop_front().or_else(|| {
                spec.synthetic
                    .as_ref()
                    .map(|(format, width, height)| MockFrame::image(format, *width, *height))
            }))
        })?;
        match next {
            Some(MockFrame::Image {
                width,
                height,
                pixel_format,
                data,
            }) => {
                let journal_state = Arc::clone(&self.state);
                Ok(AcquiredBuffer::new(
                    width,
                    height,
                    pixel_format,
                    data,
                    move || {
                        if let Ok(mut state) = journal_state.lock() {
                            state.journal.requeues += 1;
                        }
                    },
                ))
            }
            Some(MockFrame::Timeout) | None => {
                tokio::time::sleep(timeout).await;
                Err(CamError::FetchTimeout)
            }
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let mut state = self.lock();
        if let Some(spec) = state.devices.iter_mut().find(|spec| spec.id == self.id) {
            spec.held = false;
        }
        state.journal.closes += 1;
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_existing_producers_load() {
        let mut transport = MockTransport::new().with_producer("/opt/producer.cti");
        let loaded = transport
            .load_producers(&[PathBuf::from("/opt/producer.cti"), PathBuf::from("/nope.cti")])
            .unwrap();
        assert_eq!(loaded, vec![PathBuf::from("/opt/producer.cti")]);
    }

    #[tokio::test]
    async fn open_write_fetch_and_requeue_are_journaled() {
        let mut transport = MockTransport::new()
            .with_producer("p.cti")
            .with_device(MockDeviceSpec::new("cam0").push_frame(MockFrame::image("Mono8", 4, 2)));
        let shared = transport.shared();
        transport.load_producers(&[PathBuf::from("p.cti")]).unwrap();

        let mut device = transport.open_device("cam0").unwrap();
        device.write_integer(feature::WIDTH, 4).unwrap();
        let buffer = device
            .fetch_buffer(Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(buffer.pixel_format(), "Mono8");
        drop(buffer);
        device.close();

        let state = shared.lock().unwrap();
        assert_eq!(state.journal.opened, vec!["cam0".to_string()]);
        assert!(state.journal.wrote(feature::WIDTH));
        assert_eq!(state.journal.requeues, 1);
        assert_eq!(state.journal.closes, 1);
    }

    #[tokio::test]
    async fn empty_queue_times_out() {
        let mut transport = MockTransport::new()
            .with_producer("p.cti")
            .with_device(MockDeviceSpec::new("cam0"));
        transport.load_producers(&[PathBuf::from("p.cti")]).unwrap();
        let mut device = transport.open_device("cam0").unwrap();
        let err = device
            .fetch_buffer(Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CamError::FetchTimeout));
    }

    #[test]
    fn second_open_without_close_is_refused() {
        let mut transport = MockTransport::new()
            .with_producer("p.cti")
            .with_device(MockDeviceSpec::new("cam0"));
        transport.load_producers(&[PathBuf::from("p.cti")]).unwrap();
        let _device = transport.open_device("cam0").unwrap();
        assert!(matches!(
            transport.open_device("cam0"),
            Err(CamError::DeviceOpen { .. })
        ));
    }
}
