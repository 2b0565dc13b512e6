// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for meshlog

use core::fmt;

/// Result type for meshlog operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for meshlog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Operation refused while a transmission or reception is in flight
    Busy,

    /// Nothing to act on (empty log, no sample available)
    Empty,

    /// Buffer capacity would be exceeded
    Full,

    /// Value does not fit its fixed wire slot
    InvalidRange,

    /// Invalid parameter (zero interval, bad configuration)
    InvalidParameter,

    /// Malformed or truncated payload
    InvalidData,

    /// Engine used before `init()`
    NotInitialized,

    /// Opcode not handled by this model
    UnsupportedOpcode(u8),

    /// Mesh stack primitive failed (status code passed through verbatim)
    Transport(u16),

    /// Timer could not be scheduled, cancelled or restarted
    Timer,

    /// Persistent storage failure
    Storage,

    /// Buffer too small for operation
    BufferTooSmall,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Busy => write!(f, "Operation in progress"),
            Error::Empty => write!(f, "Nothing to send"),
            Error::Full => write!(f, "Buffer full"),
            Error::InvalidRange => write!(f, "Value out of range"),
            Error::InvalidParameter => write!(f, "Invalid parameter"),
            Error::InvalidData => write!(f, "Invalid or truncated data"),
            Error::NotInitialized => write!(f, "Model not initialized"),
            Error::UnsupportedOpcode(op) => write!(f, "Unsupported opcode 0x{:02x}", op),
            Error::Transport(code) => write!(f, "Transport error (status 0x{:04x})", code),
            Error::Timer => write!(f, "Timer error"),
            Error::Storage => write!(f, "Storage error"),
            Error::BufferTooSmall => write!(f, "Buffer too small"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
