//! Runtime settings and compiled-in defaults.
//!
//! There is no configuration file; defaults live here and the CLI can
//! override them.

use crate::hours::WorkingHours;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Seconds between status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;

/// Serial id of the USB relay device carrying the warning light.
pub const DEFAULT_DEVICE_ID: &str = "3D0V2";

/// Relative path to the vendor relay library.
pub const DEFAULT_LIBRARY_PATH: &str = "./USB_RELAY_DEVICE.dll";

/// Resolved runtime settings.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Build view URL to monitor.
    pub view_url: String,

    /// Serial id of the relay device to open.
    pub device_id: String,

    /// Path to the vendor relay library.
    pub library_path: PathBuf,

    /// Fixed sleep between poll iterations.
    pub poll_interval: Duration,

    /// Window during which the alert is suppressed.
    pub working_hours: WorkingHours,
}

impl Settings {
    pub fn new(
        view_url: String,
        device_id: String,
        library_path: PathBuf,
        interval_secs: u64,
    ) -> Result<Self> {
        let settings = Self {
            view_url,
            device_id,
            library_path,
            poll_interval: Duration::from_secs(interval_secs),
            working_hours: WorkingHours::weekdays_default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !self.view_url.starts_with("http://") && !self.view_url.starts_with("https://") {
            anyhow::bail!(
                "View URL must start with http:// or https:// (got '{}')",
                self.view_url
            );
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be at least 1 second");
        }

        if self.device_id.is_empty() {
            anyhow::bail!("Device id must not be empty");
        }

        if self.working_hours.start >= self.working_hours.end {
            anyhow::bail!(
                "Working hours start must precede end ({})",
                self.working_hours.describe()
            );
        }

        Ok(())
    }
}
