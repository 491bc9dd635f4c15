//! CLI entry point for camconnect.
//!
//! Two modes:
//! - `serve`: subscribe to the trigger topic and publish one image per
//!   trigger message until stopped or a fatal error occurs.
//! - `capture`: connect, capture and publish exactly once, then exit.
//!   Useful for wiring checks and deployment smoke tests.
//!
//! Fatal errors are mapped to a nonzero process exit here and only here;
//! the library components report them as `Err` values and stay testable.

use anyhow::Result;
use camconnect::bus::{BusPublisher, MqttBus};
use camconnect::capabilities::Camera;
use camconnect::config::{CameraInterface, Settings};
use camconnect::dummy::DummyCamera;
use camconnect::error::{CamError, CamResult};
use camconnect::genicam::{CameraSession, GenICamCamera};
use camconnect::storage::ImageStorage;
use camconnect::transport::mock::MockTransport;
use camconnect::transport::TransportProvider;
use camconnect::trigger::{self, MqttTrigger};
use camconnect::{logging, publish};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "camconnect")]
#[command(about = "GenICam camera to MQTT capture bridge", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file; environment variables
    /// (CAMCONNECT_*) override it.
    #[arg(long, env = "CAMCONNECT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve captures triggered over MQTT until stopped.
    Serve,
    /// Capture and publish a single image, then exit.
    Capture,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("camconnect: configuration error: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings)?;

    let result = match cli.command {
        Commands::Serve => serve(settings).await,
        Commands::Capture => capture_once(settings).await,
    };
    if let Err(e) = result {
        error!(error = %e, "fatal error, terminating");
        std::process::exit(1);
    }
    Ok(())
}

/// Build the configured camera variant on top of an established bus link.
async fn build_camera(
    settings: &Settings,
    publisher: Arc<dyn BusPublisher>,
) -> CamResult<Box<dyn Camera>> {
    let topic = settings.image_topic();
    let storage = settings
        .image_storage_path
        .as_ref()
        .map(ImageStorage::new);

    match settings.camera.interface {
        CameraInterface::DummyCamera => Ok(Box::new(DummyCamera::new(
            &settings.camera.identifier,
            &settings.camera.dummy_image,
            publisher,
            topic,
            storage,
        ))),
        CameraInterface::GenICam => {
            let (provider, producer_paths) = build_transport(settings);
            let session = CameraSession::new(
                &settings.camera.identifier,
                settings.profile.clone(),
                producer_paths,
                provider,
            )
            .with_fetch_timeout(Duration::from_secs(settings.camera.fetch_timeout_s));
            let camera = GenICamCamera::connect(session, publisher, topic, storage).await?;
            Ok(Box::new(camera))
        }
    }
}

/// Pick the transport backend.
///
/// No vendor GenTL stack is linked into this build, so the simulated
/// transport stands in; a vendor integration plugs in by implementing
/// `TransportProvider` and being returned here instead.
fn build_transport(settings: &Settings) -> (Box<dyn TransportProvider>, Vec<PathBuf>) {
    let configured = settings.camera.resolve_producer_paths();
    if !configured.is_empty() {
        warn!(
            producers = configured.len(),
            "producer files configured but no vendor GenTL stack is linked; \
             running the simulated transport"
        );
    } else {
        warn!("no vendor GenTL stack linked; running the simulated transport");
    }
    let (transport, paths) = MockTransport::simulated(&settings.camera.identifier);
    (Box::new(transport), paths)
}

async fn serve(settings: Settings) -> CamResult<()> {
    let trigger_topic = settings.trigger_topic();
    let (bus, triggers) = MqttBus::connect(&settings.mqtt, Some(trigger_topic)).await?;
    let triggers = triggers.ok_or_else(|| CamError::Bus("trigger channel missing".into()))?;
    let publisher: Arc<dyn BusPublisher> = Arc::new(bus);

    let camera = build_camera(&settings, publisher).await?;
    let acquisition_delay = Duration::from_secs_f64(settings.trigger.acquisition_delay_s);
    let watchdog_interval = Duration::from_secs(settings.trigger.watchdog_s);

    let trigger_loop = MqttTrigger::new(camera, triggers, acquisition_delay);
    let published = trigger_loop.published_counter();

    info!("serving capture triggers");
    tokio::select! {
        result = trigger_loop.run() => result,
        stalled = trigger::watchdog(published, watchdog_interval) => Err(stalled),
    }
}

async fn capture_once(settings: Settings) -> CamResult<()> {
    let (bus, _) = MqttBus::connect(&settings.mqtt, None).await?;
    let publisher: Arc<dyn BusPublisher> = Arc::new(bus);
    let mut camera = build_camera(&settings, publisher).await?;

    match camera.capture().await? {
        Some(envelope) => print_envelope(&envelope),
        None => warn!("no frame for this capture; the camera recovered from a timeout"),
    }
    camera.disconnect().await
}

fn print_envelope(envelope: &publish::PublishEnvelope) {
    info!(
        image_id = %envelope.image.image_id,
        width = envelope.image.image_width,
        height = envelope.image.image_height,
        channels = envelope.image.image_channels,
        "published one capture"
    );
}
