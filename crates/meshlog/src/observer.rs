// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application hooks
//!
//! Every hook has an empty default, so an application only implements what
//! it cares about.

use crate::buffer::ReceivedLog;
use crate::properties::Properties;

/// Server-side application hooks
pub trait ServerObserver<E> {
    /// Produce a sample for the periodic sample timer
    fn sample(&mut self) -> Option<E> {
        None
    }

    /// Current reading, returned to sample requests
    fn current_sample(&mut self) -> Option<E> {
        None
    }

    /// The log just became full
    fn on_full(&mut self) {}

    /// A sample was dropped because the log is full
    fn on_overflow(&mut self) {}

    /// A transmission completed
    fn on_send_complete(&mut self, _transmission: u8) {}

    /// A transmission was abandoned after the send timeout
    fn on_send_timeout(&mut self) {}

    /// A remote command changed the properties
    fn on_properties_changed(&mut self, _properties: &Properties) {}
}

/// Client-side application hooks
pub trait ClientObserver<E> {
    /// A complete log was received
    fn on_log_received(&mut self, _log: ReceivedLog<'_, E>) {}

    /// A single sample was pushed by a server
    fn on_sample_received(&mut self, _source: u16, _sample: E) {}

    /// A reception was abandoned after the receive timeout
    fn on_receive_timeout(&mut self) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl<E> ServerObserver<E> for NoopObserver {}

impl<E> ClientObserver<E> for NoopObserver {}
