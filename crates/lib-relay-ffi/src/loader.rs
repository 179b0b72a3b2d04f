//! Dynamic library loading for the vendor USB relay library.
//!
//! This module handles loading the vendor-supplied shared library,
//! verifying its export table, and extracting typed function symbols.

use crate::error::{RelayError, RelayResult};
use libloading::Library;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Process-wide library instance. The vendor library must be loaded and
/// initialized at most once per process; later `load` calls hand back
/// the same instance. The mutex is held across the native load and init
/// so two racing callers cannot both reach the vendor loader.
static LIBRARY: Mutex<Option<Arc<RelayLibrary>>> = Mutex::new(None);

/// Kind of a value crossing the C boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// Opaque pointer-sized device handle.
    Handle,
    /// 32-bit signed integer.
    Int,
    /// 32-bit signed integer interpreted as an error code (0 = success).
    ErrorCode,
    /// Null-terminated byte string.
    Str,
}

/// One entry of the vendor export table: name, return kind, parameter kinds.
#[derive(Clone, Copy, Debug)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub ret: ValueKind,
    pub params: &'static [ValueKind],
}

use ValueKind::{ErrorCode, Handle, Int, Str};

/// Every export the vendor library must provide. Resolution walks this
/// table at bind time; any missing entry aborts startup.
pub const RELAY_EXPORTS: &[FunctionSpec] = &[
    FunctionSpec { name: "usb_relay_init", ret: ErrorCode, params: &[] },
    FunctionSpec { name: "usb_relay_exit", ret: ErrorCode, params: &[] },
    FunctionSpec { name: "usb_relay_device_enumerate", ret: Handle, params: &[] },
    FunctionSpec { name: "usb_relay_device_close", ret: ErrorCode, params: &[Handle] },
    FunctionSpec { name: "usb_relay_device_open_with_serial_number", ret: Handle, params: &[Str, Int] },
    FunctionSpec { name: "usb_relay_device_get_num_relays", ret: Int, params: &[Handle] },
    FunctionSpec { name: "usb_relay_device_get_id_string", ret: Str, params: &[Handle] },
    FunctionSpec { name: "usb_relay_device_next_dev", ret: Handle, params: &[Handle] },
    FunctionSpec { name: "usb_relay_device_get_status_bitmap", ret: Int, params: &[Handle] },
    FunctionSpec { name: "usb_relay_device_open_one_relay_channel", ret: ErrorCode, params: &[Handle, Int] },
    FunctionSpec { name: "usb_relay_device_close_one_relay_channel", ret: ErrorCode, params: &[Handle, Int] },
    FunctionSpec { name: "usb_relay_device_close_all_relay_channel", ret: ErrorCode, params: &[Handle] },
];

/// Function signature for usb_relay_init / usb_relay_exit.
///
/// ```c
/// int usb_relay_init(void);
/// int usb_relay_exit(void);
/// ```
pub type RelayLifecycleFn = unsafe extern "C" fn() -> c_int;

/// Function signature for usb_relay_device_lib_version (optional vendor
/// extension, not in the required export table).
///
/// ```c
/// int usb_relay_device_lib_version(void);
/// ```
pub type RelayLibVersionFn = unsafe extern "C" fn() -> c_int;

/// Function signature for usb_relay_device_enumerate.
///
/// ```c
/// intptr_t usb_relay_device_enumerate(void);
/// ```
pub type RelayEnumerateFn = unsafe extern "C" fn() -> *mut c_void;

/// Function signature for usb_relay_device_next_dev.
///
/// ```c
/// intptr_t usb_relay_device_next_dev(intptr_t hDevice);
/// ```
pub type RelayNextDevFn = unsafe extern "C" fn(device: *mut c_void) -> *mut c_void;

/// Function signature for usb_relay_device_open_with_serial_number.
///
/// ```c
/// intptr_t usb_relay_device_open_with_serial_number(
///     const char *serial_number,
///     unsigned    len
/// );
/// ```
pub type RelayOpenBySerialFn =
    unsafe extern "C" fn(serial_number: *const c_char, len: c_int) -> *mut c_void;

/// Function signature for usb_relay_device_get_num_relays.
///
/// ```c
/// int usb_relay_device_get_num_relays(intptr_t hDevice);
/// ```
pub type RelayNumChannelsFn = unsafe extern "C" fn(device: *mut c_void) -> c_int;

/// Function signature for usb_relay_device_get_id_string.
///
/// ```c
/// const char *usb_relay_device_get_id_string(intptr_t hDevice);
/// ```
pub type RelayIdStringFn = unsafe extern "C" fn(device: *mut c_void) -> *const c_char;

/// Function signature for usb_relay_device_get_status_bitmap.
///
/// ```c
/// int usb_relay_device_get_status_bitmap(intptr_t hDevice);
/// ```
pub type RelayStatusBitmapFn = unsafe extern "C" fn(device: *mut c_void) -> c_int;

/// Function signature for the single-channel switch calls.
///
/// ```c
/// int usb_relay_device_open_one_relay_channel(intptr_t hDevice, int index);
/// int usb_relay_device_close_one_relay_channel(intptr_t hDevice, int index);
/// ```
pub type RelayChannelFn = unsafe extern "C" fn(device: *mut c_void, index: c_int) -> c_int;

/// Function signature for usb_relay_device_close_all_relay_channel.
///
/// ```c
/// int usb_relay_device_close_all_relay_channel(intptr_t hDevice);
/// ```
pub type RelayCloseAllFn = unsafe extern "C" fn(device: *mut c_void) -> c_int;

/// Function signature for usb_relay_device_close.
///
/// ```c
/// int usb_relay_device_close(intptr_t hDevice);
/// ```
pub type RelayDeviceCloseFn = unsafe extern "C" fn(device: *mut c_void) -> c_int;

/// Loaded vendor library with extracted function pointers.
///
/// Construction (`load`) verifies the full export table, binds typed
/// pointers, and issues `usb_relay_init`. The matching `usb_relay_exit`
/// runs exactly once, via [`RelayLibrary::exit`] or the `Drop` backstop.
pub struct RelayLibrary {
    /// The underlying dynamic library handle.
    #[allow(dead_code)]
    library: Library,

    /// Path to the library file.
    pub path: String,

    /// Guards `usb_relay_exit` against re-entrant teardown.
    exited: AtomicBool,

    lib_exit: RelayLifecycleFn,
    enumerate: RelayEnumerateFn,
    next_dev: RelayNextDevFn,
    open_by_serial: RelayOpenBySerialFn,
    num_channels: RelayNumChannelsFn,
    id_string: RelayIdStringFn,
    status_bitmap: RelayStatusBitmapFn,
    open_channel: RelayChannelFn,
    close_channel: RelayChannelFn,
    close_all_channels: RelayCloseAllFn,
    device_close: RelayDeviceCloseFn,
}

impl RelayLibrary {
    /// Load the vendor relay library, verify its exports, and initialize it.
    ///
    /// Idempotent: a second call returns the already-loaded instance without
    /// touching the native loader again.
    ///
    /// # Safety
    ///
    /// The library must be a genuine USB relay vendor library. Invalid or
    /// malicious libraries may cause undefined behavior.
    pub fn load<P: AsRef<Path>>(path: P) -> RelayResult<Arc<Self>> {
        let mut slot = LIBRARY.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.as_ref() {
            tracing::debug!(path = %existing.path, "Relay library already loaded");
            return Ok(existing.clone());
        }

        let path = path.as_ref();
        let path_str = path.display().to_string();

        let library = unsafe { Library::new(path) }
            .map_err(|e| RelayError::load_error(&path_str, e))?;

        // Verify the whole export table before binding anything typed, so a
        // missing export fails with its name and no partial binding exists.
        for spec in RELAY_EXPORTS {
            unsafe {
                library
                    .get::<*mut c_void>(spec.name.as_bytes())
                    .map_err(|_| RelayError::symbol_not_found(spec.name))?;
            }
        }

        let init: RelayLifecycleFn = unsafe {
            *library
                .get::<RelayLifecycleFn>(b"usb_relay_init\0")
                .map_err(|_| RelayError::symbol_not_found("usb_relay_init"))?
        };
        let exit: RelayLifecycleFn = unsafe {
            *library
                .get::<RelayLifecycleFn>(b"usb_relay_exit\0")
                .map_err(|_| RelayError::symbol_not_found("usb_relay_exit"))?
        };
        let enumerate: RelayEnumerateFn = unsafe {
            *library
                .get::<RelayEnumerateFn>(b"usb_relay_device_enumerate\0")
                .map_err(|_| RelayError::symbol_not_found("usb_relay_device_enumerate"))?
        };
        let next_dev: RelayNextDevFn = unsafe {
            *library
                .get::<RelayNextDevFn>(b"usb_relay_device_next_dev\0")
                .map_err(|_| RelayError::symbol_not_found("usb_relay_device_next_dev"))?
        };
        let open_by_serial: RelayOpenBySerialFn = unsafe {
            *library
                .get::<RelayOpenBySerialFn>(b"usb_relay_device_open_with_serial_number\0")
                .map_err(|_| {
                    RelayError::symbol_not_found("usb_relay_device_open_with_serial_number")
                })?
        };
        let num_channels: RelayNumChannelsFn = unsafe {
            *library
                .get::<RelayNumChannelsFn>(b"usb_relay_device_get_num_relays\0")
                .map_err(|_| RelayError::symbol_not_found("usb_relay_device_get_num_relays"))?
        };
        let id_string: RelayIdStringFn = unsafe {
            *library
                .get::<RelayIdStringFn>(b"usb_relay_device_get_id_string\0")
                .map_err(|_| RelayError::symbol_not_found("usb_relay_device_get_id_string"))?
        };
        let status_bitmap: RelayStatusBitmapFn = unsafe {
            *library
                .get::<RelayStatusBitmapFn>(b"usb_relay_device_get_status_bitmap\0")
                .map_err(|_| RelayError::symbol_not_found("usb_relay_device_get_status_bitmap"))?
        };
        let open_channel: RelayChannelFn = unsafe {
            *library
                .get::<RelayChannelFn>(b"usb_relay_device_open_one_relay_channel\0")
                .map_err(|_| {
                    RelayError::symbol_not_found("usb_relay_device_open_one_relay_channel")
                })?
        };
        let close_channel: RelayChannelFn = unsafe {
            *library
                .get::<RelayChannelFn>(b"usb_relay_device_close_one_relay_channel\0")
                .map_err(|_| {
                    RelayError::symbol_not_found("usb_relay_device_close_one_relay_channel")
                })?
        };
        let close_all_channels: RelayCloseAllFn = unsafe {
            *library
                .get::<RelayCloseAllFn>(b"usb_relay_device_close_all_relay_channel\0")
                .map_err(|_| {
                    RelayError::symbol_not_found("usb_relay_device_close_all_relay_channel")
                })?
        };
        let device_close: RelayDeviceCloseFn = unsafe {
            *library
                .get::<RelayDeviceCloseFn>(b"usb_relay_device_close\0")
                .map_err(|_| RelayError::symbol_not_found("usb_relay_device_close"))?
        };

        // usb_relay_device_lib_version is a vendor extension; log it when
        // present, absence is not an error.
        let lib_version: Option<RelayLibVersionFn> = unsafe {
            library
                .get::<RelayLibVersionFn>(b"usb_relay_device_lib_version\0")
                .ok()
                .map(|s| *s)
        };
        if let Some(version_fn) = lib_version {
            let version = unsafe { version_fn() };
            tracing::info!(path = %path_str, version = format!("0x{version:X}"), "Relay library version");
        }

        let code = unsafe { init() };
        if code != 0 {
            return Err(RelayError::InitFailed { code });
        }

        tracing::info!(
            path = %path_str,
            format = ?LibraryFormat::from_path(path),
            exports = RELAY_EXPORTS.len(),
            "Loaded relay library"
        );

        let loaded = Arc::new(Self {
            library,
            path: path_str,
            exited: AtomicBool::new(false),
            lib_exit: exit,
            enumerate,
            next_dev,
            open_by_serial,
            num_channels,
            id_string,
            status_bitmap,
            open_channel,
            close_channel,
            close_all_channels,
            device_close,
        });

        *slot = Some(loaded.clone());
        Ok(loaded)
    }

    /// Call `usb_relay_exit`. Safe to call more than once: only the first
    /// call reaches the vendor library. Must run after all device handles
    /// are released.
    pub fn exit(&self) {
        if self.exited.swap(true, Ordering::SeqCst) {
            tracing::debug!("Relay library already exited");
            return;
        }
        let code = unsafe { (self.lib_exit)() };
        if code != 0 {
            tracing::warn!(code, "usb_relay_exit returned non-zero");
        } else {
            tracing::info!("Relay library closed");
        }
    }

    /// Serial id strings of every enumerated device, for diagnostics.
    pub fn enumerate_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let mut dev = unsafe { (self.enumerate)() };
        while !dev.is_null() {
            if let Some(id) = unsafe { read_c_string((self.id_string)(dev)) } {
                ids.push(id);
            }
            dev = unsafe { (self.next_dev)(dev) };
        }
        ids
    }

    pub(crate) fn open_by_serial_fn(&self) -> RelayOpenBySerialFn {
        self.open_by_serial
    }

    pub(crate) fn num_channels_fn(&self) -> RelayNumChannelsFn {
        self.num_channels
    }

    pub(crate) fn status_bitmap_fn(&self) -> RelayStatusBitmapFn {
        self.status_bitmap
    }

    pub(crate) fn id_string_fn(&self) -> RelayIdStringFn {
        self.id_string
    }

    pub(crate) fn open_channel_fn(&self) -> RelayChannelFn {
        self.open_channel
    }

    pub(crate) fn close_channel_fn(&self) -> RelayChannelFn {
        self.close_channel
    }

    pub(crate) fn close_all_channels_fn(&self) -> RelayCloseAllFn {
        self.close_all_channels
    }

    pub(crate) fn device_close_fn(&self) -> RelayDeviceCloseFn {
        self.device_close
    }
}

impl Drop for RelayLibrary {
    fn drop(&mut self) {
        // Backstop for paths that never reached the explicit teardown.
        self.exit();
    }
}

// RelayLibrary only stores function pointers and the Library handle,
// which are safe to move across threads.
unsafe impl Send for RelayLibrary {}
unsafe impl Sync for RelayLibrary {}

/// Read a C string, returning None if null or invalid UTF-8.
///
/// # Safety
/// The pointer must be null or point to a valid null-terminated C string.
pub(crate) unsafe fn read_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: Caller guarantees ptr is valid if not null
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(String::from) }
}

/// Platform-specific library format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LibraryFormat {
    /// Windows DLL.
    Dll,
    /// Linux/Unix shared object.
    So,
    /// macOS dynamic library.
    Dylib,
    /// Unknown format.
    Unknown,
}

impl LibraryFormat {
    /// Detect format from file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some("dll") | Some("DLL") => Self::Dll,
            Some("so") => Self::So,
            Some("dylib") => Self::Dylib,
            _ => Self::Unknown,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_library_format_detection() {
        assert_eq!(
            LibraryFormat::from_path("USB_RELAY_DEVICE.dll"),
            LibraryFormat::Dll
        );
        assert_eq!(
            LibraryFormat::from_path("libusb_relay_device.so"),
            LibraryFormat::So
        );
        assert_eq!(
            LibraryFormat::from_path("libusb_relay_device.dylib"),
            LibraryFormat::Dylib
        );
        assert_eq!(LibraryFormat::from_path("relay.txt"), LibraryFormat::Unknown);
    }

    #[test]
    fn test_export_table_names_unique() {
        let names: HashSet<_> = RELAY_EXPORTS.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), RELAY_EXPORTS.len());
    }

    #[test]
    fn test_export_table_covers_lifecycle() {
        for required in ["usb_relay_init", "usb_relay_exit", "usb_relay_device_close"] {
            assert!(
                RELAY_EXPORTS.iter().any(|s| s.name == required),
                "missing {required}"
            );
        }
    }

    #[test]
    fn test_open_takes_string_and_int() {
        let open = RELAY_EXPORTS
            .iter()
            .find(|s| s.name == "usb_relay_device_open_with_serial_number")
            .unwrap();
        assert_eq!(open.ret, ValueKind::Handle);
        assert_eq!(open.params, &[ValueKind::Str, ValueKind::Int][..]);
    }

    #[test]
    fn test_load_missing_library_fails() {
        match RelayLibrary::load("./no_such_relay_lib.dll") {
            Err(err) => {
                assert!(matches!(err, RelayError::LoadError { .. }));
                assert!(err.is_startup_fatal());
            }
            Ok(_) => panic!("load of a missing library must fail"),
        }
    }
}
