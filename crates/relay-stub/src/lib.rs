//! In-memory stand-in for the vendor USB relay library.
//!
//! Built as a cdylib so lifecycle tests can exercise the real dynamic
//! loading path without hardware. One fake two-channel device with
//! serial `STUB1` is always present; `stub_*_calls` exports expose call
//! counters for the exactly-once lifecycle assertions.

use std::ffi::{c_char, c_int, c_void};
use std::sync::atomic::{AtomicI32, Ordering};

const SERIAL: &[u8] = b"STUB1";
const ID_CSTR: &[u8] = b"STUB1\0";
const CHANNELS: c_int = 2;

static INIT_CALLS: AtomicI32 = AtomicI32::new(0);
static EXIT_CALLS: AtomicI32 = AtomicI32::new(0);
static DEVICE_CLOSE_CALLS: AtomicI32 = AtomicI32::new(0);
static BITMAP: AtomicI32 = AtomicI32::new(0);

// Never dereferenced; the opaque handle just has to be non-null and
// stable.
fn device_handle() -> *mut c_void {
    ID_CSTR.as_ptr() as *mut c_void
}

#[no_mangle]
pub extern "C" fn usb_relay_init() -> c_int {
    INIT_CALLS.fetch_add(1, Ordering::SeqCst);
    0
}

#[no_mangle]
pub extern "C" fn usb_relay_exit() -> c_int {
    EXIT_CALLS.fetch_add(1, Ordering::SeqCst);
    0
}

#[no_mangle]
pub extern "C" fn usb_relay_device_lib_version() -> c_int {
    0x02
}

#[no_mangle]
pub extern "C" fn usb_relay_device_enumerate() -> *mut c_void {
    device_handle()
}

#[no_mangle]
pub extern "C" fn usb_relay_device_next_dev(_device: *mut c_void) -> *mut c_void {
    std::ptr::null_mut()
}

#[no_mangle]
pub extern "C" fn usb_relay_device_get_id_string(_device: *mut c_void) -> *const c_char {
    ID_CSTR.as_ptr() as *const c_char
}

/// # Safety
///
/// `serial_number` must point to at least `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn usb_relay_device_open_with_serial_number(
    serial_number: *const c_char,
    len: c_int,
) -> *mut c_void {
    if serial_number.is_null() || len <= 0 {
        return std::ptr::null_mut();
    }
    let requested =
        unsafe { std::slice::from_raw_parts(serial_number as *const u8, len as usize) };
    if requested == SERIAL {
        device_handle()
    } else {
        std::ptr::null_mut()
    }
}

#[no_mangle]
pub extern "C" fn usb_relay_device_get_num_relays(_device: *mut c_void) -> c_int {
    CHANNELS
}

#[no_mangle]
pub extern "C" fn usb_relay_device_get_status_bitmap(_device: *mut c_void) -> c_int {
    BITMAP.load(Ordering::SeqCst)
}

#[no_mangle]
pub extern "C" fn usb_relay_device_open_one_relay_channel(
    _device: *mut c_void,
    index: c_int,
) -> c_int {
    if index < 1 || index > CHANNELS {
        return 1;
    }
    BITMAP.fetch_or(1 << (index - 1), Ordering::SeqCst);
    0
}

#[no_mangle]
pub extern "C" fn usb_relay_device_close_one_relay_channel(
    _device: *mut c_void,
    index: c_int,
) -> c_int {
    if index < 1 || index > CHANNELS {
        return 1;
    }
    BITMAP.fetch_and(!(1 << (index - 1)), Ordering::SeqCst);
    0
}

#[no_mangle]
pub extern "C" fn usb_relay_device_close_all_relay_channel(_device: *mut c_void) -> c_int {
    BITMAP.store(0, Ordering::SeqCst);
    0
}

#[no_mangle]
pub extern "C" fn usb_relay_device_close(_device: *mut c_void) -> c_int {
    DEVICE_CLOSE_CALLS.fetch_add(1, Ordering::SeqCst);
    0
}

#[no_mangle]
pub extern "C" fn stub_init_calls() -> c_int {
    INIT_CALLS.load(Ordering::SeqCst)
}

#[no_mangle]
pub extern "C" fn stub_exit_calls() -> c_int {
    EXIT_CALLS.load(Ordering::SeqCst)
}

#[no_mangle]
pub extern "C" fn stub_device_close_calls() -> c_int {
    DEVICE_CLOSE_CALLS.load(Ordering::SeqCst)
}
