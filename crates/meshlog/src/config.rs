// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data log configuration

use crate::error::{Error, Result};
use crate::properties::Properties;
use crate::wire::ModelId;

/// Maximum payload of a single vendor model message (bytes)
pub const MAX_MESSAGE_PAYLOAD: usize = 247;

/// Silicon Labs company identifier
pub const VENDOR_ID: u16 = 0x02FF;

/// Data log server model identifier
pub const SERVER_MODEL_ID: u16 = 0x0000;

/// Data log client model identifier
pub const CLIENT_MODEL_ID: u16 = 0x0001;

/// Default (primary) element index
pub const DEFAULT_ELEMENT: u16 = 0;

/// Default log capacity in entries
pub const DEFAULT_CAPACITY: usize = 100;

/// Default send/receive timeout (ms)
pub const DEFAULT_TIMEOUT_MS: u32 = 3000;

/// Default delay before a status response is sent (ms)
pub const DEFAULT_RESPONSE_DELAY_MS: u32 = 1;

/// Default sample rate (ms)
pub const DEFAULT_SAMPLE_RATE_MS: u32 = 1000;

/// Default report period (ms)
pub const DEFAULT_PERIOD_MS: u32 = 5000;

/// Default threshold
pub const DEFAULT_THRESHOLD: i8 = 1;

/// Flow control strategy shared by server and client
///
/// The two strategies are mutually exclusive: both ends of a link must use
/// the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FlowControl {
    /// Client acknowledges every segment; each acknowledgment releases the next one
    AckPerSegment,
    /// No acknowledgments; a rolling transmission counter in every header lets the
    /// client drop re-delivered transmissions, timeouts recover stalls
    #[default]
    CounterWithTimeout,
}

impl FlowControl {
    /// Segment header length on the wire
    pub const fn header_len(self) -> usize {
        match self {
            FlowControl::AckPerSegment => 1,
            FlowControl::CounterWithTimeout => 2,
        }
    }
}

/// Data log configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LogConfig {
    /// Element hosting the data log models
    pub element: u16,

    /// Company identifier of the vendor models
    pub vendor_id: u16,

    /// Server model identifier
    pub server_model_id: u16,

    /// Client model identifier
    pub client_model_id: u16,

    /// Flow control strategy
    pub flow_control: FlowControl,

    /// Largest message payload the stack accepts (header included)
    pub max_message_payload: usize,

    /// Server gives up on a stalled transmission after this long (ms)
    pub send_timeout_ms: u32,

    /// Client gives up on a stalled reception after this long (ms)
    pub receive_timeout_ms: u32,

    /// Delay between a received segment and its status response (ms)
    pub response_delay_ms: u32,

    /// Pause between segments in counter mode (ms, 0 = back to back)
    pub segment_interval_ms: u32,

    /// Properties used when nothing valid is persisted
    pub defaults: Properties,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            element: DEFAULT_ELEMENT,
            vendor_id: VENDOR_ID,
            server_model_id: SERVER_MODEL_ID,
            client_model_id: CLIENT_MODEL_ID,
            flow_control: FlowControl::default(),
            max_message_payload: MAX_MESSAGE_PAYLOAD,
            send_timeout_ms: DEFAULT_TIMEOUT_MS,
            receive_timeout_ms: DEFAULT_TIMEOUT_MS,
            response_delay_ms: DEFAULT_RESPONSE_DELAY_MS,
            segment_interval_ms: 0,
            defaults: Properties::default(),
        }
    }
}

impl LogConfig {
    /// Create a new config builder
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Data bytes carried by one full segment
    pub const fn max_segment_payload(&self) -> usize {
        self.max_message_payload
            .saturating_sub(self.flow_control.header_len())
    }

    /// Address of the server model
    pub const fn server_model(&self) -> ModelId {
        ModelId::new(self.element, self.vendor_id, self.server_model_id)
    }

    /// Address of the client model
    pub const fn client_model(&self) -> ModelId {
        ModelId::new(self.element, self.vendor_id, self.client_model_id)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.max_message_payload > MAX_MESSAGE_PAYLOAD {
            return Err(Error::InvalidRange);
        }
        if self.max_segment_payload() == 0 {
            return Err(Error::InvalidParameter);
        }
        if self.send_timeout_ms == 0 || self.receive_timeout_ms == 0 {
            return Err(Error::InvalidParameter);
        }
        if !self.defaults.is_valid() {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct LogConfigBuilder {
    element: Option<u16>,
    flow_control: Option<FlowControl>,
    max_message_payload: Option<usize>,
    send_timeout_ms: Option<u32>,
    receive_timeout_ms: Option<u32>,
    response_delay_ms: Option<u32>,
    segment_interval_ms: Option<u32>,
    defaults: Option<Properties>,
}

impl LogConfigBuilder {
    /// Set the element index
    pub fn element(mut self, element: u16) -> Self {
        self.element = Some(element);
        self
    }

    /// Set the flow control strategy
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = Some(flow_control);
        self
    }

    /// Set the maximum message payload (bytes, header included)
    pub fn max_message_payload(mut self, len: usize) -> Self {
        self.max_message_payload = Some(len);
        self
    }

    /// Set the server send timeout (ms)
    pub fn send_timeout_ms(mut self, ms: u32) -> Self {
        self.send_timeout_ms = Some(ms);
        self
    }

    /// Set the client receive timeout (ms)
    pub fn receive_timeout_ms(mut self, ms: u32) -> Self {
        self.receive_timeout_ms = Some(ms);
        self
    }

    /// Set the status response delay (ms)
    pub fn response_delay_ms(mut self, ms: u32) -> Self {
        self.response_delay_ms = Some(ms);
        self
    }

    /// Set the pause between counter-mode segments (ms)
    pub fn segment_interval_ms(mut self, ms: u32) -> Self {
        self.segment_interval_ms = Some(ms);
        self
    }

    /// Set the default properties
    pub fn defaults(mut self, defaults: Properties) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Build the configuration
    pub fn build(self) -> LogConfig {
        let defaults = LogConfig::default();

        LogConfig {
            element: self.element.unwrap_or(defaults.element),
            flow_control: self.flow_control.unwrap_or(defaults.flow_control),
            max_message_payload: self
                .max_message_payload
                .unwrap_or(defaults.max_message_payload),
            send_timeout_ms: self.send_timeout_ms.unwrap_or(defaults.send_timeout_ms),
            receive_timeout_ms: self
                .receive_timeout_ms
                .unwrap_or(defaults.receive_timeout_ms),
            response_delay_ms: self
                .response_delay_ms
                .unwrap_or(defaults.response_delay_ms),
            segment_interval_ms: self
                .segment_interval_ms
                .unwrap_or(defaults.segment_interval_ms),
            defaults: self.defaults.unwrap_or(defaults.defaults),
            ..defaults
        }
    }
}
