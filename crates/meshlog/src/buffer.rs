// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-capacity log storage
//!
//! [`LogBuffer`] is the server-side append-only sample store.
//! [`ReassemblyBuffer`] is its client-side twin, filled from segment
//! payloads. Both see their content as the byte stream obtained by encoding
//! every entry back to back.

use crate::entry::{LogEntry, MAX_ENTRY_SIZE};
use crate::error::{Error, Result};

/// Outcome of an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    /// Entry stored, room left
    Stored,
    /// Entry stored in the last free slot
    Full,
    /// Log already full, entry dropped
    Overflow,
}

/// Append-only log with a fixed capacity of `N` entries
#[derive(Debug)]
pub struct LogBuffer<E: LogEntry, const N: usize> {
    entries: [E; N],
    index: usize,
}

impl<E: LogEntry, const N: usize> LogBuffer<E, N> {
    /// Create an empty log
    pub fn new() -> Self {
        debug_assert!(E::SIZE > 0 && E::SIZE <= MAX_ENTRY_SIZE);
        Self {
            entries: [E::default(); N],
            index: 0,
        }
    }

    /// Capacity in entries
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of stored entries (write cursor)
    pub const fn len(&self) -> usize {
        self.index
    }

    /// Check if the log is empty
    pub const fn is_empty(&self) -> bool {
        self.index == 0
    }

    /// Check if every slot is used
    pub const fn is_full(&self) -> bool {
        self.index >= N
    }

    /// Stored entries, oldest first
    pub fn entries(&self) -> &[E] {
        &self.entries[..self.index]
    }

    /// Size of the encoded content in bytes
    pub const fn byte_len(&self) -> usize {
        self.index * E::SIZE
    }

    /// Append an entry
    pub fn push(&mut self, entry: E) -> Append {
        if self.index >= N {
            return Append::Overflow;
        }

        self.entries[self.index] = entry;
        self.index += 1;

        if self.index == N {
            Append::Full
        } else {
            Append::Stored
        }
    }

    /// Rewind the write cursor
    pub fn clear(&mut self) {
        self.index = 0;
    }

    /// Rewind the write cursor and zero every slot
    pub fn wipe(&mut self) {
        self.entries = [E::default(); N];
        self.index = 0;
    }

    /// Copy encoded bytes starting at `offset` into `out`
    ///
    /// # Returns
    ///
    /// Number of bytes copied (less than `out.len()` at the end of the log)
    pub fn copy_bytes(&self, offset: usize, out: &mut [u8]) -> usize {
        let end = (offset + out.len()).min(self.byte_len());
        if offset >= end {
            return 0;
        }

        let mut scratch = [0u8; MAX_ENTRY_SIZE];
        let mut pos = offset;
        while pos < end {
            let slot = pos / E::SIZE;
            let within = pos % E::SIZE;
            self.entries[slot].encode(&mut scratch[..E::SIZE]);

            let take = (E::SIZE - within).min(end - pos);
            let dst = pos - offset;
            out[dst..dst + take].copy_from_slice(&scratch[within..within + take]);
            pos += take;
        }

        end - offset
    }
}

impl<E: LogEntry, const N: usize> Default for LogBuffer<E, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Completed log as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedLog<'a, E> {
    /// Address of the sending server
    pub source: u16,
    /// Address the segments were sent to
    pub destination: u16,
    /// Received entries, oldest first
    pub entries: &'a [E],
}

/// Client-side reassembly buffer
///
/// Entries split across two segments are held in a scratch area until
/// their remaining bytes arrive.
#[derive(Debug)]
pub struct ReassemblyBuffer<E: LogEntry, const N: usize> {
    entries: [E; N],
    index: usize,
    pending: [u8; MAX_ENTRY_SIZE],
    pending_len: usize,
    source: u16,
    destination: u16,
}

impl<E: LogEntry, const N: usize> ReassemblyBuffer<E, N> {
    /// Create an empty buffer
    pub fn new() -> Self {
        debug_assert!(E::SIZE > 0 && E::SIZE <= MAX_ENTRY_SIZE);
        Self {
            entries: [E::default(); N],
            index: 0,
            pending: [0u8; MAX_ENTRY_SIZE],
            pending_len: 0,
            source: 0,
            destination: 0,
        }
    }

    /// Capacity in entries
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of complete entries (write cursor)
    pub const fn len(&self) -> usize {
        self.index
    }

    /// Check if nothing has been received
    pub const fn is_empty(&self) -> bool {
        self.index == 0 && self.pending_len == 0
    }

    /// Bytes received so far
    pub const fn byte_len(&self) -> usize {
        self.index * E::SIZE + self.pending_len
    }

    /// An entry is only partially received
    pub const fn has_partial(&self) -> bool {
        self.pending_len != 0
    }

    /// Received entries, oldest first
    pub fn entries(&self) -> &[E] {
        &self.entries[..self.index]
    }

    /// Source address of the last completed reception
    pub const fn source(&self) -> u16 {
        self.source
    }

    /// Destination address of the last completed reception
    pub const fn destination(&self) -> u16 {
        self.destination
    }

    /// Start writing from the beginning again
    pub fn restart(&mut self) {
        self.index = 0;
        self.pending_len = 0;
    }

    /// Append segment data
    ///
    /// Fails with [`Error::Full`] without touching the buffer if the data
    /// does not fit.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        if self.byte_len() + bytes.len() > N * E::SIZE {
            return Err(Error::Full);
        }

        for &byte in bytes {
            self.pending[self.pending_len] = byte;
            self.pending_len += 1;
            if self.pending_len == E::SIZE {
                self.entries[self.index] = E::decode(&self.pending[..E::SIZE]);
                self.index += 1;
                self.pending_len = 0;
            }
        }

        Ok(())
    }

    /// Record where the completed reception came from
    pub fn set_provenance(&mut self, source: u16, destination: u16) {
        self.source = source;
        self.destination = destination;
    }

    /// View of the received log
    pub fn view(&self) -> ReceivedLog<'_, E> {
        ReceivedLog {
            source: self.source,
            destination: self.destination,
            entries: self.entries(),
        }
    }
}

impl<E: LogEntry, const N: usize> Default for ReassemblyBuffer<E, N> {
    fn default() -> Self {
        Self::new()
    }
}
