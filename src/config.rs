//! Configuration management.
//!
//! Settings come from an optional TOML file plus `CAMCONNECT_`-prefixed
//! environment variables (nested fields separated by `__`, e.g.
//! `CAMCONNECT_MQTT__HOST`). The environment surface mirrors the deployment
//! contract of the service this bridge replaces: broker coordinates, device
//! identifier, GenTL producer locations, acquisition profile and optional
//! local image storage.

use crate::error::{CamError, CamResult};
use crate::frame::PixelFormat;
use config::Config;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Value of the user-set selector that leaves the device profile alone.
pub const DEFAULT_USER_SET: &str = "Default";

/// Top-level application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level filter (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON-formatted log lines instead of the compact format.
    #[serde(default)]
    pub log_json: bool,
    /// Message broker connection.
    pub mqtt: MqttSettings,
    /// Camera selection and transport.
    pub camera: CameraSettings,
    /// Acquisition profile applied on connect.
    #[serde(default)]
    pub profile: AcquisitionProfile,
    /// Trigger-loop behavior.
    #[serde(default)]
    pub trigger: TriggerSettings,
    /// When set, every published capture is also written here as a JPEG.
    #[serde(default)]
    pub image_storage_path: Option<PathBuf>,
}

/// MQTT broker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    /// Hostname or IP address of the broker.
    pub host: String,
    /// Broker port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Root segment of all topics.
    #[serde(default = "default_root_topic")]
    pub root_topic: String,
    /// Transmitter id segment used in topic construction.
    #[serde(default)]
    pub transmitter_id: String,
    /// Client id presented to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

/// Which camera variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum CameraInterface {
    /// Hardware-backed GenICam camera.
    #[default]
    GenICam,
    /// Static-image dummy camera for pipeline testing.
    DummyCamera,
}

/// Camera selection and transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraSettings {
    /// Camera variant.
    #[serde(default)]
    pub interface: CameraInterface,
    /// Physical device identifier (MAC-address-like) to bind.
    #[serde(default)]
    pub identifier: String,
    /// Explicit GenTL producer (*.cti) files to load.
    #[serde(default)]
    pub producer_paths: Vec<PathBuf>,
    /// Directory scanned recursively for additional *.cti files.
    #[serde(default)]
    pub producer_dir: Option<PathBuf>,
    /// Bounded wait for each buffer fetch, in seconds.
    #[serde(default = "default_fetch_timeout_s")]
    pub fetch_timeout_s: u64,
    /// Static image served by the dummy camera.
    #[serde(default = "default_dummy_image")]
    pub dummy_image: PathBuf,
}

/// Automatic-adjustment modes for exposure, gain and white balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AutoMode {
    /// No automatic adjustment.
    Off,
    /// Adjust once, then hold.
    Once,
    /// Continuous adjustment.
    Continuous,
}

impl AutoMode {
    /// The GenICam enumeration entry name for this mode.
    pub fn feature_value(self) -> &'static str {
        match self {
            AutoMode::Off => "Off",
            AutoMode::Once => "Once",
            AutoMode::Continuous => "Continuous",
        }
    }
}

/// Acquisition profile applied to the device on connect.
///
/// Every field is optional; absent fields leave the device at its current
/// value. Selecting a stored user set other than [`DEFAULT_USER_SET`] makes
/// the device-stored profile authoritative and suppresses every other field.
#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionProfile {
    /// Stored user set to load, or "Default" to configure from this profile.
    #[serde(default = "default_user_set")]
    pub user_set_selector: String,
    /// Region-of-interest width in pixels, clamped to the sensor maximum.
    #[serde(default)]
    pub image_width: Option<i64>,
    /// Region-of-interest height in pixels, clamped to the sensor maximum.
    #[serde(default)]
    pub image_height: Option<i64>,
    /// Pixel format to select on the device.
    #[serde(default)]
    pub pixel_format: Option<PixelFormat>,
    /// Channel count override; inferred from the pixel format when absent.
    #[serde(default)]
    pub image_channels: Option<u8>,
    /// Exposure time in microseconds.
    #[serde(default)]
    pub exposure_time: Option<f64>,
    /// Automatic exposure adjustment.
    #[serde(default)]
    pub exposure_auto: Option<AutoMode>,
    /// Automatic gain adjustment.
    #[serde(default)]
    pub gain_auto: Option<AutoMode>,
    /// Automatic white-balance adjustment.
    #[serde(default)]
    pub balance_white_auto: Option<AutoMode>,
}

impl Default for AcquisitionProfile {
    fn default() -> Self {
        Self {
            user_set_selector: DEFAULT_USER_SET.to_string(),
            image_width: None,
            image_height: None,
            pixel_format: None,
            image_channels: None,
            exposure_time: None,
            exposure_auto: None,
            gain_auto: None,
            balance_white_auto: None,
        }
    }
}

impl AcquisitionProfile {
    /// Whether a device-stored user set overrides this profile entirely.
    pub fn uses_stored_user_set(&self) -> bool {
        self.user_set_selector != DEFAULT_USER_SET
    }
}

/// Trigger-loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerSettings {
    /// Delay between trigger receipt and acquisition, in seconds.
    #[serde(default)]
    pub acquisition_delay_s: f64,
    /// Liveness window: exit if no image was published for this long.
    #[serde(default = "default_watchdog_s")]
    pub watchdog_s: u64,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            acquisition_delay_s: 0.0,
            watchdog_s: default_watchdog_s(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_root_topic() -> String {
    "ia".to_string()
}
fn default_client_id() -> String {
    "camconnect".to_string()
}
fn default_fetch_timeout_s() -> u64 {
    20
}
fn default_dummy_image() -> PathBuf {
    PathBuf::from("assets/dummy_image.jpg")
}
fn default_user_set() -> String {
    DEFAULT_USER_SET.to_string()
}
fn default_watchdog_s() -> u64 {
    60
}

impl Settings {
    /// Load settings from an optional TOML file plus the environment.
    pub fn load(config_path: Option<&Path>) -> CamResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix("CAMCONNECT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(CamError::Config)?;

        let settings: Settings = cfg.try_deserialize().map_err(CamError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation beyond what deserialization can catch.
    pub fn validate(&self) -> CamResult<()> {
        if self.mqtt.host.is_empty() {
            return Err(CamError::Configuration("mqtt.host must be set".into()));
        }
        if self.camera.interface == CameraInterface::GenICam && self.camera.identifier.is_empty() {
            return Err(CamError::Configuration(
                "camera.identifier must be set for the GenICam interface".into(),
            ));
        }
        if self.trigger.acquisition_delay_s < 0.0 {
            return Err(CamError::Configuration(
                "trigger.acquisition_delay_s must not be negative".into(),
            ));
        }
        if let Some(channels) = self.profile.image_channels {
            if channels != 1 && channels != 3 {
                return Err(CamError::Configuration(format!(
                    "profile.image_channels must be 1 or 3, got {channels}"
                )));
            }
        }
        Ok(())
    }

    /// Topic the bridge listens on for acquisition triggers.
    pub fn trigger_topic(&self) -> String {
        format!(
            "{}/trigger/{}/{}",
            self.mqtt.root_topic, self.mqtt.transmitter_id, self.camera.identifier
        )
    }

    /// Topic captured images are published to.
    pub fn image_topic(&self) -> String {
        format!(
            "{}/rawImage/{}/{}",
            self.mqtt.root_topic, self.mqtt.transmitter_id, self.camera.identifier
        )
    }
}

impl CameraSettings {
    /// Explicit producer paths plus every `*.cti` file found under
    /// `producer_dir`, in a stable order.
    pub fn resolve_producer_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.producer_paths.clone();
        if let Some(dir) = &self.producer_dir {
            let mut discovered = Vec::new();
            collect_cti_files(dir, &mut discovered);
            discovered.sort();
            paths.extend(discovered);
        }
        paths
    }
}

fn collect_cti_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_cti_files(&path, out);
        } else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("cti")) {
            out.push(path);
        }
    }
}
