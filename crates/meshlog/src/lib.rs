// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # meshlog - Segmented data logging over Bluetooth Mesh vendor models
//!
//! A `no_std` implementation of a data-logging protocol for mesh sensor
//! nodes: a server model samples into a fixed-capacity log and ships it as
//! a segmented transmission, a client model reassembles it, and both sides
//! share a tiny command set for remote reconfiguration.
//!
//! ## Design Constraints
//!
//! - **Payload**: <= 247 bytes per unsegmented vendor model message
//! - **No heap allocations** (const generics for fixed buffers)
//! - **No callbacks stored in engines** (timers are tags fed back by the
//!   application)
//! - **`no_std` compatible**
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------+
//! |  Application (dispatcher, sensors)      |
//! +-----------------------------------------+
//!           v                    ^
//! +-----------------------------------------+
//! |  LogServer / LogClient                  |
//! +-----------------------------------------+
//!      v          v           v          ^
//! +----------+ +----------+ +--------------+
//! | Schedul. | | Storage  | | Wire format  |
//! +----------+ +----------+ +--------------+
//!           v                    ^
//! +-----------------------------------------+
//! |  ModelTransport (mesh stack)            |
//! +-----------------------------------------+
//! ```
//!
//! ## Flow Control
//!
//! Both ends pick one [`FlowControl`] strategy: an acknowledgment per
//! segment, or a rolling transmission counter with timeouts.
//!
//! ## Feature Flags
//!
//! - `std` -- Enable std (for host tools)
//! - `serde` -- (De)serialization of [`LogConfig`] and [`Properties`]

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Fixed-capacity log and reassembly buffers
pub mod buffer;

/// Data log client model
pub mod client;

/// Configuration and protocol constants
pub mod config;

/// Log entry encoding
pub mod entry;

/// Error types for meshlog
pub mod error;

/// Application hooks
pub mod observer;

/// Sampling/reporting properties and persistence
pub mod properties;

/// Data log server model
pub mod server;

/// Timer scheduling
pub mod timer;

/// Mesh stack abstraction
pub mod transport;

/// Wire format
pub mod wire;

// Re-exports for convenience
pub use crate::buffer::{Append, LogBuffer, ReassemblyBuffer, ReceivedLog};
pub use crate::client::{LogClient, ReceiveState};
pub use crate::config::{FlowControl, LogConfig, LogConfigBuilder};
pub use crate::entry::{ClimateSample, LogEntry};
pub use crate::error::{Error, Result};
pub use crate::observer::{ClientObserver, NoopObserver, ServerObserver};
pub use crate::properties::{Properties, PropertiesStore, PropertyUpdate, RamStorage, Storage};
pub use crate::server::{LogServer, SendState};
pub use crate::timer::{Scheduler, Timer, TimerHandle, TimerMode, VirtualScheduler};
pub use crate::transport::{ModelTransport, NullTransport, QueueTransport, Received};
pub use crate::wire::{ModelId, Opcode};
