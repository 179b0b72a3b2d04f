//! Error types for relay FFI operations.

use thiserror::Error;

/// Errors that can occur while driving the vendor relay library.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Failed to load the shared library.
    #[error("Failed to load library '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: libloading::Error,
    },

    /// Required symbol not found in library.
    #[error("Symbol '{symbol}' not found in library")]
    SymbolNotFound { symbol: String },

    /// usb_relay_init returned an error.
    #[error("Library init failed with code {code}")]
    InitFailed { code: i32 },

    /// The device could not be opened by serial number.
    #[error("Cannot open relay device with serial '{serial}'")]
    OpenFailed { serial: String },

    /// The device reported a channel count outside the supported range.
    #[error("Bad number of relay channels: {count} (must be 1-8)")]
    BadChannelCount { count: i32 },

    /// A channel was addressed that the device does not have.
    #[error("Channel {channel} out of range for a {count}-channel device")]
    ChannelOutOfRange { channel: u8, count: u8 },

    /// A single-channel switch call returned a non-zero code.
    #[error("Relay channel {channel} I/O failed with code {code}")]
    ChannelIo { channel: u8, code: i32 },

    /// The close-all call returned a non-zero code.
    #[error("Closing all relay channels failed with code {code}")]
    CloseAllFailed { code: i32 },

    /// Releasing the device handle returned a non-zero code.
    #[error("Releasing relay device failed with code {code}")]
    ReleaseFailed { code: i32 },

    /// Invalid parameter.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl RelayError {
    /// Create a load error.
    pub fn load_error(path: impl Into<String>, source: libloading::Error) -> Self {
        Self::LoadError {
            path: path.into(),
            source,
        }
    }

    /// Create a symbol not found error.
    pub fn symbol_not_found(symbol: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
        }
    }

    /// Errors that abort startup before the poll loop runs.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Self::LoadError { .. }
                | Self::SymbolNotFound { .. }
                | Self::InitFailed { .. }
                | Self::OpenFailed { .. }
                | Self::BadChannelCount { .. }
        )
    }

    /// Errors the driver logs and carries on from (best-effort device I/O).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ChannelIo { .. } | Self::CloseAllFailed { .. } | Self::ReleaseFailed { .. }
        )
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(RelayError::symbol_not_found("usb_relay_init").is_startup_fatal());
        assert!(RelayError::BadChannelCount { count: 12 }.is_startup_fatal());
        assert!(RelayError::ChannelIo { channel: 1, code: 2 }.is_recoverable());
        assert!(!RelayError::ChannelIo { channel: 1, code: 2 }.is_startup_fatal());
        assert!(!RelayError::OpenFailed { serial: "3D0V2".into() }.is_recoverable());
    }
}
