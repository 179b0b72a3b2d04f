//! build-beacon: drives a USB relay warning light from a build view's
//! failure count, suppressed during working hours.
//!
//! This is the main entry point for the monitor.

mod alert;
mod config;
mod hours;
mod poller;
mod status;

use anyhow::{Context, Result};
use clap::Parser;
use lib_relay_ffi::{RelayDevice, RelayLibrary, RelaySwitch};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "build-beacon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Build view URL to monitor (e.g. http://jenkins.example.com/view/Main)
    view_url: String,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Serial id of the USB relay device to open
    #[arg(long, default_value = config::DEFAULT_DEVICE_ID)]
    device_id: String,

    /// Path to the vendor relay library
    #[arg(long, default_value = config::DEFAULT_LIBRARY_PATH)]
    library: PathBuf,

    /// Seconds between status polls
    #[arg(long, default_value_t = config::DEFAULT_POLL_INTERVAL_SECS)]
    interval_secs: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let settings = config::Settings::new(
        cli.view_url,
        cli.device_id,
        cli.library,
        cli.interval_secs,
    )?;

    tracing::info!(
        view_url = %settings.view_url,
        working_hours = settings.working_hours.describe(),
        "Start monitoring build view"
    );

    let library = RelayLibrary::load(&settings.library_path)
        .context("Relay library unavailable")?;

    // Everything after load runs under the library's lifetime; exit is
    // issued exactly once after the device handle is gone, on success
    // and failure paths alike.
    let result = run_monitor(&library, &settings);
    library.exit();

    result
}

fn run_monitor(library: &Arc<RelayLibrary>, settings: &config::Settings) -> Result<()> {
    let client = status::StatusClient::new(&settings.view_url)?;

    let mut device = RelayDevice::open(library.clone(), &settings.device_id)
        .context("Relay device unavailable")?;
    if let Some(id) = device.id_string() {
        tracing::debug!(id, channels = device.channel_count(), "Device reports id");
    }

    // Force a known all-off state before the first evaluation.
    if let Err(e) = device.close_all() {
        tracing::warn!(error = %e, "Could not force channels off at startup");
    }
    match device.status_bitmap() {
        Ok(bitmap) => tracing::debug!(bitmap = format!("{bitmap:#010b}"), "Initial channel state"),
        Err(e) => tracing::debug!(error = %e, "Channel state bitmap unavailable"),
    }

    let loop_result = (|| -> Result<()> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .context("Failed to install shutdown signal handler")?;

        poller::run(&mut device, &client, settings, &shutdown);
        Ok(())
    })();

    // Unconditional ordered teardown; runs whether the loop ended
    // normally, was interrupted, or never started.
    poller::teardown(&mut device);

    loop_result
}
