//! # lib-relay-ffi
//!
//! Safe FFI wrappers for the vendor USB relay library.
//!
//! This crate provides a safe Rust interface for loading the vendor
//! relay-control library (`USB_RELAY_DEVICE.dll` / `.so`) and driving a
//! multi-channel USB relay through it. It handles:
//!
//! - Dynamic library loading with `libloading`
//! - Export-table verification (fail-fast on any missing symbol)
//! - Library init/exit lifecycle (each issued exactly once per process)
//! - Owned device handles released on every exit path
//!
//! # Safety
//!
//! The vendor binary is untrusted code. The unsafe surface is confined
//! to this crate: symbols are bound once against a fixed, typed export
//! table, every fallible vendor call surfaces its error code as a typed
//! [`RelayError`], and handle ownership guarantees release-exactly-once.

pub mod device;
pub mod error;
pub mod loader;

pub use device::{RelayDevice, RelaySwitch, MAX_CHANNELS};
pub use error::{RelayError, RelayResult};
pub use loader::{FunctionSpec, LibraryFormat, RelayLibrary, ValueKind, RELAY_EXPORTS};
