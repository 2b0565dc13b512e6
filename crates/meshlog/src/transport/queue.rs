// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbox transport
//!
//! Queues every outgoing message instead of putting it on air. The
//! application (or a test, or the simulator's link model) drains the queue
//! and decides what the other side receives.

use heapless::{Deque, Vec};

use super::ModelTransport;
use crate::error::{Error, Result};
use crate::wire::{Frame, ModelId};

/// Status code reported when the outbox is full
pub const QUEUE_FULL_STATUS: u16 = 0xFFFF;

/// Maximum number of registered models
const MAX_MODELS: usize = 4;

/// Queued outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Sending model
    pub model: ModelId,
    /// Unicast destination, `None` for a publication
    pub destination: Option<u16>,
    /// Raw opcode byte
    pub opcode: u8,
    /// Message payload
    pub payload: Frame,
}

/// Transport that queues up to `DEPTH` outgoing messages
#[derive(Debug)]
pub struct QueueTransport<const DEPTH: usize> {
    outbox: Deque<Outgoing, DEPTH>,
    models: Vec<ModelId, MAX_MODELS>,
    fail_next: Option<u16>,
}

impl<const DEPTH: usize> QueueTransport<DEPTH> {
    /// Create an empty transport
    pub const fn new() -> Self {
        Self {
            outbox: Deque::new(),
            models: Vec::new(),
            fail_next: None,
        }
    }

    /// Take the oldest queued message
    pub fn pop(&mut self) -> Option<Outgoing> {
        self.outbox.pop_front()
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.outbox.len()
    }

    /// Check if the outbox is empty
    pub fn is_empty(&self) -> bool {
        self.outbox.is_empty()
    }

    /// Drop every queued message
    pub fn clear(&mut self) {
        self.outbox.clear();
    }

    /// Check if a model is registered
    pub fn is_registered(&self, model: ModelId) -> bool {
        self.models.contains(&model)
    }

    /// Make the next publish/send fail with `status`
    pub fn fail_next(&mut self, status: u16) {
        self.fail_next = Some(status);
    }

    fn enqueue(&mut self, model: ModelId, destination: Option<u16>, opcode: u8, payload: &[u8]) -> Result<()> {
        if let Some(status) = self.fail_next.take() {
            return Err(Error::Transport(status));
        }

        let payload = Frame::from_slice(payload).map_err(|_| Error::BufferTooSmall)?;
        self.outbox
            .push_back(Outgoing {
                model,
                destination,
                opcode,
                payload,
            })
            .map_err(|_| Error::Transport(QUEUE_FULL_STATUS))
    }
}

impl<const DEPTH: usize> Default for QueueTransport<DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DEPTH: usize> ModelTransport for QueueTransport<DEPTH> {
    fn init_model(&mut self, model: ModelId, _publish: bool, _opcodes: &[u8]) -> Result<()> {
        if self.is_registered(model) {
            return Ok(());
        }
        self.models
            .push(model)
            .map_err(|_| Error::Transport(QUEUE_FULL_STATUS))
    }

    fn deinit_model(&mut self, model: ModelId) -> Result<()> {
        self.models.retain(|m| *m != model);
        Ok(())
    }

    fn publish(&mut self, model: ModelId, opcode: u8, payload: &[u8]) -> Result<()> {
        self.enqueue(model, None, opcode, payload)
    }

    fn send(&mut self, model: ModelId, destination: u16, opcode: u8, payload: &[u8]) -> Result<()> {
        self.enqueue(model, Some(destination), opcode, payload)
    }
}
