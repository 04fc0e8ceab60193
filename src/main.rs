//! Flic Bridge - connects Flic buttons to a smart-home gateway
//!
//! This is the binary entry point. All logic lives in the library crates.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use flic_adapter::{
    default_config_path, load_settings, AdapterCommand, DeviceDescription, FlicAdapter, Gateway,
    Settings,
};
use flic_core::types::{ButtonEvent, PropertyValue};
use flic_daemon::{FlicClient, FlicdProcess};

/// Flic Bridge - connects Flic buttons to a smart-home gateway
#[derive(Parser, Debug)]
#[command(name = "flic-bridge")]
#[command(about = "Bridges Flic BLE push-buttons to a smart-home gateway", long_about = None)]
struct Args {
    /// Path to the config file (defaults to the platform config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Bluetooth interface to hand to flicd, e.g. "hci0"
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,

    /// Attach to an already-running flicd instead of spawning one
    #[arg(long)]
    no_daemon: bool,

    /// TCP port of the flicd client socket
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Open a pairing window on startup
    #[arg(long)]
    pair: bool,
}

impl Args {
    /// Fold CLI flags over the loaded settings; flags win
    fn apply(&self, mut settings: Settings) -> Settings {
        if self.device.is_some() {
            settings.device = self.device.clone();
        }
        if self.no_daemon {
            settings.auto_start_daemon = false;
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        settings
    }
}

/// Gateway stand-in for running the bridge without a host: everything
/// is surfaced through the log.
struct LogGateway;

impl Gateway for LogGateway {
    fn device_added(&mut self, device: &DeviceDescription) {
        info!("Device added: {} ({})", device.name, device.id);
    }

    fn device_removed(&mut self, device_id: &str) {
        info!("Device removed: {}", device_id);
    }

    fn property_changed(&mut self, device_id: &str, value: &PropertyValue) {
        match value {
            PropertyValue::Battery(pct) => info!("{}: battery {}%", device_id, pct),
            PropertyValue::Pushed(pushed) => info!("{}: pushed {}", device_id, pushed),
        }
    }

    fn event_notify(&mut self, device_id: &str, event: ButtonEvent) {
        info!("{}: {}", device_id, event.name());
    }

    fn pairing_prompt(&mut self, message: &str) {
        println!("{}", message);
    }

    fn adapter_error(&mut self, error: &flic_core::Error) {
        error!("{}", error);
        eprintln!("flic-bridge: {}", error);
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    flic_core::logging::init().wrap_err("failed to initialize logging")?;

    let args = Args::parse();
    let config_path = args
        .config
        .clone()
        .or_else(default_config_path)
        .ok_or_else(|| eyre!("no config path available on this platform"))?;
    let settings = args.apply(load_settings(&config_path));

    // Supervisor events flow into the same loop as everything else
    let (supervisor_tx, supervisor_rx) = mpsc::channel(64);
    let mut process = if settings.auto_start_daemon {
        FlicdProcess::start_default(
            settings.daemon_binary.as_deref(),
            settings.port,
            settings.device.as_deref(),
            supervisor_tx,
        )
        .wrap_err("failed to start flicd")?
    } else {
        FlicdProcess::external()
    };

    if let Err(e) = process.wait_until_ready().await {
        let _ = process.shutdown().await;
        return Err(e).wrap_err("flicd never became ready");
    }
    info!("flicd ready on port {}", settings.port);

    let (client_tx, client_rx) = mpsc::channel(256);
    let client = match FlicClient::connect("localhost", settings.port, client_tx).await {
        Ok(client) => client,
        Err(e) => {
            let _ = process.shutdown().await;
            return Err(e).wrap_err("could not establish a flicd session");
        }
    };

    let pairing_window = Duration::from_secs(settings.pairing_window_secs);
    let adapter = FlicAdapter::new(LogGateway, client.handle(), Some(process), pairing_window);

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    if args.pair {
        cmd_tx
            .send(AdapterCommand::StartPairing { window: None })
            .await
            .map_err(|_| eyre!("adapter loop not running"))?;
    }

    // Ctrl-C turns into a clean unload
    let shutdown_tx = cmd_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, unloading");
            if shutdown_tx.send(AdapterCommand::Unload).await.is_err() {
                warn!("Adapter loop already stopped");
            }
        }
    });

    adapter.run(client_rx, supervisor_rx, cmd_rx).await;
    client.close();

    Ok(())
}
