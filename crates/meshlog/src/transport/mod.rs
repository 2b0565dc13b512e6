// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh stack abstraction for meshlog
//!
//! The engines only need four vendor-model primitives from the mesh stack:
//! model registration, deregistration, publication and unicast send.
//! Everything below that (bearers, provisioning, radio) stays on the
//! application side.
//!
//! ## Design Principles
//!
//! - **No heap allocations** - payloads are borrowed slices
//! - **Status passthrough** - stack failures surface as
//!   [`Error::Transport`](crate::Error::Transport)
//!   carrying the stack's own status code

use crate::error::Result;
use crate::wire::ModelId;

pub mod queue;

pub use queue::{Outgoing, QueueTransport, QUEUE_FULL_STATUS};

/// Inbound vendor model message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received<'a> {
    /// Sender address
    pub source: u16,
    /// Address the message was sent to (unicast or group)
    pub destination: u16,
    /// Local model the message is addressed to
    pub model: ModelId,
    /// Raw opcode byte
    pub opcode: u8,
    /// Message payload
    pub payload: &'a [u8],
}

/// Vendor model message primitives of a mesh stack
pub trait ModelTransport {
    /// Register a vendor model and its opcode table
    ///
    /// # Arguments
    ///
    /// * `model` - Model address
    /// * `publish` - Model publishes (server) or only sends (client)
    /// * `opcodes` - Opcodes the model handles
    fn init_model(&mut self, model: ModelId, publish: bool, opcodes: &[u8]) -> Result<()>;

    /// Deregister a vendor model
    fn deinit_model(&mut self, model: ModelId) -> Result<()>;

    /// Publish to the model's configured publication address
    fn publish(&mut self, model: ModelId, opcode: u8, payload: &[u8]) -> Result<()>;

    /// Send to a single address
    fn send(&mut self, model: ModelId, destination: u16, opcode: u8, payload: &[u8]) -> Result<()>;
}

/// Null transport (for testing)
///
/// Accepts and discards everything.
#[derive(Debug, Default)]
pub struct NullTransport {
    sent: usize,
}

impl NullTransport {
    /// Create a new null transport
    pub const fn new() -> Self {
        Self { sent: 0 }
    }

    /// Number of discarded messages
    pub const fn sent(&self) -> usize {
        self.sent
    }
}

impl ModelTransport for NullTransport {
    fn init_model(&mut self, _model: ModelId, _publish: bool, _opcodes: &[u8]) -> Result<()> {
        Ok(())
    }

    fn deinit_model(&mut self, _model: ModelId) -> Result<()> {
        Ok(())
    }

    fn publish(&mut self, _model: ModelId, _opcode: u8, _payload: &[u8]) -> Result<()> {
        self.sent += 1;
        Ok(())
    }

    fn send(&mut self, _model: ModelId, _destination: u16, _opcode: u8, _payload: &[u8]) -> Result<()> {
        self.sent += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Opcode;

    #[test]
    fn test_null_transport() {
        let mut transport = NullTransport::new();
        let model = ModelId::new(0, 0x02FF, 0);

        transport.init_model(model, true, &Opcode::TABLE).unwrap();
        transport
            .publish(model, Opcode::Status.code(), b"hello")
            .unwrap();
        transport
            .send(model, 0x0002, Opcode::Sample.code(), &[1])
            .unwrap();

        assert_eq!(transport.sent(), 2);
        transport.deinit_model(model).unwrap();
    }
}
