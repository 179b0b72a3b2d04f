//! Relay device handle lifecycle management.
//!
//! A [`RelayDevice`] owns the opaque handle returned by the vendor open
//! call. Construction is the open, [`RelayDevice::release`] (or `Drop`)
//! is the close, so the handle is released exactly once on every exit
//! path without per-branch cleanup.

use crate::error::{RelayError, RelayResult};
use crate::loader::{read_c_string, RelayLibrary};
use std::ffi::{c_int, c_void, CString};
use std::ptr;
use std::sync::Arc;

/// Devices report between 1 and 8 relay channels; anything else is a
/// fatal configuration error.
pub const MAX_CHANNELS: u8 = 8;

/// Switchable relay surface the alert driver talks through.
///
/// [`RelayDevice`] is the hardware implementation; tests substitute a
/// recording mock.
pub trait RelaySwitch {
    /// Energize or de-energize one channel.
    fn set_channel(&mut self, channel: u8, on: bool) -> RelayResult<()>;

    /// De-energize every channel in one call.
    fn close_all(&mut self) -> RelayResult<()>;

    /// Close the device handle itself. Idempotent; distinct from closing
    /// channels.
    fn release(&mut self) -> RelayResult<()>;
}

/// An open USB relay device.
///
/// Single-owner, single-threaded: the handle is never shared and all
/// operations take `&mut self`.
pub struct RelayDevice {
    library: Arc<RelayLibrary>,

    /// Opaque vendor handle; null once released.
    handle: *mut c_void,

    /// Serial id the device was opened with.
    pub serial: String,

    channels: u8,
}

impl RelayDevice {
    /// Open the device with the given serial id and validate its channel
    /// count.
    ///
    /// A null handle from the vendor is a hard failure, not retried.
    pub fn open(library: Arc<RelayLibrary>, serial: &str) -> RelayResult<Self> {
        tracing::info!(serial, "Opening relay device");

        let serial_cstr = CString::new(serial).map_err(|_| RelayError::InvalidParameter {
            name: "serial".to_string(),
            reason: "Contains null byte".to_string(),
        })?;

        let open_fn = library.open_by_serial_fn();
        let handle =
            unsafe { open_fn(serial_cstr.as_ptr(), serial_cstr.as_bytes().len() as c_int) };
        if handle.is_null() {
            let known = library.enumerate_ids();
            tracing::error!(serial, enumerated = ?known, "Device open failed");
            return Err(RelayError::OpenFailed {
                serial: serial.to_string(),
            });
        }

        let count = unsafe { (library.num_channels_fn())(handle) };
        if count < 1 || count > i32::from(MAX_CHANNELS) {
            // Close the handle we just opened before reporting the
            // configuration error; it must not leak.
            let code = unsafe { (library.device_close_fn())(handle) };
            if code != 0 {
                tracing::warn!(code, "Device close after bad channel count returned non-zero");
            }
            return Err(RelayError::BadChannelCount { count });
        }

        tracing::info!(serial, channels = count, "Relay device opened");

        Ok(Self {
            library,
            handle,
            serial: serial.to_string(),
            channels: count as u8,
        })
    }

    /// Number of relay channels on this device, in `1..=8`.
    pub fn channel_count(&self) -> u8 {
        self.channels
    }

    /// Per-channel state bitmap as reported by the vendor (bit N set =
    /// channel N+1 energized). Diagnostic only.
    pub fn status_bitmap(&self) -> RelayResult<u32> {
        let handle = self.live_handle()?;
        let bitmap = unsafe { (self.library.status_bitmap_fn())(handle) };
        Ok(bitmap as u32)
    }

    /// Device id string as reported by the vendor, if readable.
    pub fn id_string(&self) -> Option<String> {
        let handle = match self.live_handle() {
            Ok(h) => h,
            Err(_) => return None,
        };
        unsafe { read_c_string((self.library.id_string_fn())(handle)) }
    }

    fn live_handle(&self) -> RelayResult<*mut c_void> {
        if self.handle.is_null() {
            return Err(RelayError::InvalidParameter {
                name: "handle".to_string(),
                reason: "Device already released".to_string(),
            });
        }
        Ok(self.handle)
    }

}

/// Validate a 1-based channel index against the device's channel count.
fn check_channel(channel: u8, count: u8) -> RelayResult<()> {
    if channel == 0 || channel > count {
        return Err(RelayError::ChannelOutOfRange { channel, count });
    }
    Ok(())
}

impl RelaySwitch for RelayDevice {
    fn set_channel(&mut self, channel: u8, on: bool) -> RelayResult<()> {
        check_channel(channel, self.channels)?;
        let handle = self.live_handle()?;

        let switch_fn = if on {
            self.library.open_channel_fn()
        } else {
            self.library.close_channel_fn()
        };
        let code = unsafe { switch_fn(handle, c_int::from(channel)) };
        if code != 0 {
            return Err(RelayError::ChannelIo { channel, code });
        }

        tracing::debug!(channel, on, "Relay channel switched");
        Ok(())
    }

    fn close_all(&mut self) -> RelayResult<()> {
        let handle = self.live_handle()?;
        let code = unsafe { (self.library.close_all_channels_fn())(handle) };
        if code != 0 {
            return Err(RelayError::CloseAllFailed { code });
        }

        tracing::debug!("All relay channels closed");
        Ok(())
    }

    fn release(&mut self) -> RelayResult<()> {
        if self.handle.is_null() {
            return Ok(());
        }

        let handle = self.handle;
        self.handle = ptr::null_mut();

        let code = unsafe { (self.library.device_close_fn())(handle) };
        if code != 0 {
            return Err(RelayError::ReleaseFailed { code });
        }

        tracing::info!(serial = %self.serial, "Relay device released");
        Ok(())
    }
}

impl Drop for RelayDevice {
    fn drop(&mut self) {
        // Best-effort release, log but don't propagate errors
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "Error during device cleanup");
        }
    }
}
