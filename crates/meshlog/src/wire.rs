// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data log wire format
//!
//! Every message of the data log opcode family is a single, unsegmented
//! vendor model message of at most [`MAX_MESSAGE_PAYLOAD`] bytes.
//!
//! ## Status (segment) layout
//!
//! ```text
//! ack mode:      +------+----------------------+
//!                | last |  data (<= 246 bytes) |
//!                +------+----------------------+
//!
//! counter mode:  +------+-------+----------------------+
//!                | last | trans |  data (<= 245 bytes) |
//!                +------+-------+----------------------+
//! ```
//!
//! - `last`: 1 on the final segment of a transmission, 0 otherwise
//! - `trans`: rolling transmission counter, identical for all segments of
//!   one transmission

use crate::config::{FlowControl, MAX_MESSAGE_PAYLOAD};
use crate::error::{Error, Result};

/// Outgoing message payload
pub type Frame = heapless::Vec<u8, MAX_MESSAGE_PAYLOAD>;

/// Fixed size of a property value slot (bytes)
pub const PROPERTY_LEN: usize = 4;

/// Length of the status response / sample request placeholder
pub const PLACEHOLDER_LEN: usize = 1;

const LAST: u8 = 1;
const NOT_LAST: u8 = 0;

/// Vendor model address: element + company id + model id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId {
    /// Element index
    pub element: u16,
    /// Company identifier
    pub vendor_id: u16,
    /// Model identifier
    pub model_id: u16,
}

impl ModelId {
    /// Create a model address
    pub const fn new(element: u16, vendor_id: u16, model_id: u16) -> Self {
        Self {
            element,
            vendor_id,
            model_id,
        }
    }
}

/// Data log opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Log segment (server -> client)
    Status = 0x01,
    /// Segment acknowledgment (client -> server)
    StatusResponse = 0x02,
    /// Set report period
    Period = 0x03,
    /// Set sample rate
    SampleRate = 0x04,
    /// Set threshold
    Threshold = 0x05,
    /// Single sample push
    Sample = 0x06,
    /// Request a single sample
    SampleRequest = 0x07,
}

impl Opcode {
    /// Opcode table registered with the stack
    pub const TABLE: [u8; 7] = [
        Opcode::Status as u8,
        Opcode::StatusResponse as u8,
        Opcode::Period as u8,
        Opcode::SampleRate as u8,
        Opcode::Threshold as u8,
        Opcode::Sample as u8,
        Opcode::SampleRequest as u8,
    ];

    /// Raw opcode byte
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Opcode::Status),
            0x02 => Ok(Opcode::StatusResponse),
            0x03 => Ok(Opcode::Period),
            0x04 => Ok(Opcode::SampleRate),
            0x05 => Ok(Opcode::Threshold),
            0x06 => Ok(Opcode::Sample),
            0x07 => Ok(Opcode::SampleRequest),
            other => Err(Error::UnsupportedOpcode(other)),
        }
    }
}

/// Segment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Final segment of the transmission
    pub last: bool,
    /// Transmission counter (counter mode only)
    pub transmission: Option<u8>,
}

impl SegmentHeader {
    /// Header for ack mode
    pub const fn ack(last: bool) -> Self {
        Self {
            last,
            transmission: None,
        }
    }

    /// Header for counter mode
    pub const fn counted(last: bool, transmission: u8) -> Self {
        Self {
            last,
            transmission: Some(transmission),
        }
    }

    /// Encoded length
    pub const fn len(&self) -> usize {
        match self.transmission {
            Some(_) => 2,
            None => 1,
        }
    }

    /// Encode header into buffer
    ///
    /// # Returns
    ///
    /// Number of bytes written
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < self.len() {
            return Err(Error::BufferTooSmall);
        }

        buf[0] = if self.last { LAST } else { NOT_LAST };
        if let Some(count) = self.transmission {
            buf[1] = count;
        }

        Ok(self.len())
    }

    /// Decode header from buffer
    pub fn decode(buf: &[u8], flow_control: FlowControl) -> Result<Self> {
        if buf.len() < flow_control.header_len() {
            return Err(Error::InvalidData);
        }

        let last = buf[0] == LAST;
        Ok(match flow_control {
            FlowControl::AckPerSegment => Self::ack(last),
            FlowControl::CounterWithTimeout => Self::counted(last, buf[1]),
        })
    }
}

/// Number of segments needed to carry `entries` entries of `entry_size` bytes
pub const fn segment_count(entries: usize, entry_size: usize, max_segment_payload: usize) -> usize {
    if max_segment_payload == 0 {
        return 0;
    }
    let bytes = entries * entry_size;
    bytes / max_segment_payload + if bytes % max_segment_payload != 0 { 1 } else { 0 }
}

/// Pack a property value into its fixed slot
pub fn property_payload(value: &[u8]) -> Result<heapless::Vec<u8, PROPERTY_LEN>> {
    heapless::Vec::from_slice(value).map_err(|_| Error::InvalidRange)
}

/// Decode a 4-byte little-endian interval
pub fn decode_interval(payload: &[u8]) -> Result<u32> {
    match payload.get(..4) {
        Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(Error::InvalidData),
    }
}

/// Decode a threshold (first byte, signed)
pub fn decode_threshold(payload: &[u8]) -> Result<i8> {
    payload.first().map(|&b| b as i8).ok_or(Error::InvalidData)
}
