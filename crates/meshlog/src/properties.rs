// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sampling/reporting properties and their persistence
//!
//! The three properties live in one fixed-layout record under a single
//! storage key:
//!
//! ```text
//! +---------+----------------+-----------+-----------+
//! | version | sample_rate LE | period LE | threshold |
//! |   1 B   |      4 B       |    4 B    |    1 B    |
//! +---------+----------------+-----------+-----------+
//! ```
//!
//! Updates always rewrite the whole record (read-modify-write).

use crate::config::{DEFAULT_PERIOD_MS, DEFAULT_SAMPLE_RATE_MS, DEFAULT_THRESHOLD};
use crate::error::{Error, Result};

/// Storage key of the properties record
pub const PROPERTIES_KEY: u16 = 0x4001;

/// Record format version
pub const RECORD_VERSION: u8 = 1;

/// Encoded record length
pub const RECORD_LEN: usize = 10;

/// Sampling and reporting parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Properties {
    /// Interval between two samples (ms)
    pub sample_rate_ms: u32,
    /// Interval between two reports (ms)
    pub period_ms: u32,
    /// Application threshold
    pub threshold: i8,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            sample_rate_ms: DEFAULT_SAMPLE_RATE_MS,
            period_ms: DEFAULT_PERIOD_MS,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Properties {
    /// Both intervals are usable as timer periods
    pub const fn is_valid(&self) -> bool {
        self.sample_rate_ms != 0 && self.period_ms != 0
    }

    /// Encode the persisted record
    pub fn to_record(&self) -> [u8; RECORD_LEN] {
        let mut record = [0u8; RECORD_LEN];
        record[0] = RECORD_VERSION;
        record[1..5].copy_from_slice(&self.sample_rate_ms.to_le_bytes());
        record[5..9].copy_from_slice(&self.period_ms.to_le_bytes());
        record[9] = self.threshold as u8;
        record
    }

    /// Decode a persisted record
    pub fn from_record(record: &[u8]) -> Result<Self> {
        if record.len() != RECORD_LEN || record[0] != RECORD_VERSION {
            return Err(Error::InvalidData);
        }

        let props = Self {
            sample_rate_ms: u32::from_le_bytes([record[1], record[2], record[3], record[4]]),
            period_ms: u32::from_le_bytes([record[5], record[6], record[7], record[8]]),
            threshold: record[9] as i8,
        };

        if !props.is_valid() {
            return Err(Error::InvalidData);
        }
        Ok(props)
    }

    /// Copy with one property replaced
    pub fn apply(mut self, update: PropertyUpdate) -> Self {
        match update {
            PropertyUpdate::SampleRate(ms) => self.sample_rate_ms = ms,
            PropertyUpdate::Period(ms) => self.period_ms = ms,
            PropertyUpdate::Threshold(value) => self.threshold = value,
        }
        self
    }
}

/// A single property change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyUpdate {
    /// New sample rate (ms)
    SampleRate(u32),
    /// New report period (ms)
    Period(u32),
    /// New threshold
    Threshold(i8),
}

impl PropertyUpdate {
    /// Reject zero intervals
    pub const fn validate(&self) -> Result<()> {
        match self {
            PropertyUpdate::SampleRate(0) | PropertyUpdate::Period(0) => {
                Err(Error::InvalidParameter)
            }
            _ => Ok(()),
        }
    }
}

/// Key-value persistent storage (NVM style)
pub trait Storage {
    /// Check whether a record exists
    fn contains(&mut self, key: u16) -> Result<bool>;

    /// Read a record into `buf`
    ///
    /// # Returns
    ///
    /// Length of the record
    fn read(&mut self, key: u16, buf: &mut [u8]) -> Result<usize>;

    /// Create or replace a record
    fn write(&mut self, key: u16, value: &[u8]) -> Result<()>;

    /// Delete a record (no-op if missing)
    fn delete(&mut self, key: u16) -> Result<()>;
}

/// Largest record held by [`RamStorage`]
pub const RAM_RECORD_MAX: usize = 16;

#[derive(Debug, Clone, Copy)]
struct RamSlot {
    key: u16,
    len: usize,
    data: [u8; RAM_RECORD_MAX],
}

/// In-memory storage with `SLOTS` records
#[derive(Debug)]
pub struct RamStorage<const SLOTS: usize> {
    slots: [Option<RamSlot>; SLOTS],
}

impl<const SLOTS: usize> RamStorage<SLOTS> {
    /// Create an empty storage
    pub const fn new() -> Self {
        Self {
            slots: [None; SLOTS],
        }
    }

    fn find(&self, key: u16) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(s) if s.key == key))
    }
}

impl<const SLOTS: usize> Default for RamStorage<SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SLOTS: usize> Storage for RamStorage<SLOTS> {
    fn contains(&mut self, key: u16) -> Result<bool> {
        Ok(self.find(key).is_some())
    }

    fn read(&mut self, key: u16, buf: &mut [u8]) -> Result<usize> {
        let slot = self
            .find(key)
            .and_then(|i| self.slots[i])
            .ok_or(Error::Storage)?;

        if buf.len() < slot.len {
            return Err(Error::BufferTooSmall);
        }
        buf[..slot.len].copy_from_slice(&slot.data[..slot.len]);
        Ok(slot.len)
    }

    fn write(&mut self, key: u16, value: &[u8]) -> Result<()> {
        if value.len() > RAM_RECORD_MAX {
            return Err(Error::Storage);
        }

        let index = match self.find(key) {
            Some(i) => i,
            None => self
                .slots
                .iter()
                .position(Option::is_none)
                .ok_or(Error::Storage)?,
        };

        let mut data = [0u8; RAM_RECORD_MAX];
        data[..value.len()].copy_from_slice(value);
        self.slots[index] = Some(RamSlot {
            key,
            len: value.len(),
            data,
        });
        Ok(())
    }

    fn delete(&mut self, key: u16) -> Result<()> {
        if let Some(i) = self.find(key) {
            self.slots[i] = None;
        }
        Ok(())
    }
}

/// Persists [`Properties`] through a [`Storage`] backend
#[derive(Debug)]
pub struct PropertiesStore<S: Storage> {
    storage: S,
    key: u16,
}

impl<S: Storage> PropertiesStore<S> {
    /// Create a store using [`PROPERTIES_KEY`]
    pub const fn new(storage: S) -> Self {
        Self::with_key(storage, PROPERTIES_KEY)
    }

    /// Create a store using a custom key
    pub const fn with_key(storage: S, key: u16) -> Self {
        Self { storage, key }
    }

    /// Load the persisted properties
    ///
    /// Falls back to `defaults` when no record exists or the record cannot
    /// be used.
    pub fn load(&mut self, defaults: Properties) -> Properties {
        match self.storage.contains(self.key) {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("[properties] no record, using defaults");
                return defaults;
            }
            Err(e) => {
                log::warn!("[properties] probe failed ({}), using defaults", e);
                return defaults;
            }
        }

        match self.read_record() {
            Ok(props) => {
                log::debug!("[properties] loaded {:?}", props);
                props
            }
            Err(e) => {
                log::warn!("[properties] unusable record ({}), using defaults", e);
                defaults
            }
        }
    }

    /// Persist one property change
    ///
    /// The whole record is rewritten; its other fields come from the stored
    /// record, or from `current` when nothing valid is stored.
    ///
    /// # Returns
    ///
    /// The properties as persisted
    pub fn update(&mut self, current: Properties, update: PropertyUpdate) -> Result<Properties> {
        update.validate()?;

        let base = if self.storage.contains(self.key)? {
            match self.read_record() {
                Ok(props) => props,
                Err(Error::InvalidData) => {
                    log::warn!("[properties] stored record invalid, rebuilding");
                    current
                }
                Err(e) => return Err(e),
            }
        } else {
            current
        };

        let updated = base.apply(update);
        self.storage
            .write(self.key, &updated.to_record())
            .map_err(|e| {
                log::warn!("[properties] write failed: {}", e);
                Error::Storage
            })?;

        log::info!("[properties] persisted {:?}", updated);
        Ok(updated)
    }

    /// Delete the persisted record
    pub fn reset(&mut self) -> Result<()> {
        self.storage.delete(self.key).map_err(|e| {
            log::warn!("[properties] delete failed: {}", e);
            Error::Storage
        })
    }

    /// Borrow the storage backend
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutably borrow the storage backend
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn read_record(&mut self) -> Result<Properties> {
        let mut buf = [0u8; RECORD_LEN + 1];
        let len = match self.storage.read(self.key, &mut buf) {
            Ok(len) => len,
            Err(Error::BufferTooSmall) => return Err(Error::InvalidData),
            Err(_) => return Err(Error::Storage),
        };
        Properties::from_record(&buf[..len])
    }
}
