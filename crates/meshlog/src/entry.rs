// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log entry encoding

/// Largest supported entry size in bytes
pub const MAX_ENTRY_SIZE: usize = 8;

/// One fixed-size log sample
///
/// Entries are written to the wire back to back, so a segment boundary may
/// fall inside an entry. `SIZE` must be in `1..=MAX_ENTRY_SIZE`.
pub trait LogEntry: Copy + Default {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Encode into `out` (exactly `SIZE` bytes)
    fn encode(&self, out: &mut [u8]);

    /// Decode from `bytes` (exactly `SIZE` bytes)
    fn decode(bytes: &[u8]) -> Self;
}

impl LogEntry for u8 {
    const SIZE: usize = 1;

    fn encode(&self, out: &mut [u8]) {
        out[0] = *self;
    }

    fn decode(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

/// Temperature/humidity pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClimateSample {
    /// Temperature in degrees Celsius
    pub temperature: i8,
    /// Relative humidity in percent
    pub humidity: u8,
}

impl ClimateSample {
    /// Create a new sample
    pub const fn new(temperature: i8, humidity: u8) -> Self {
        Self {
            temperature,
            humidity,
        }
    }
}

impl LogEntry for ClimateSample {
    const SIZE: usize = 2;

    fn encode(&self, out: &mut [u8]) {
        out[0] = self.temperature as u8;
        out[1] = self.humidity;
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            temperature: bytes[0] as i8,
            humidity: bytes[1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_climate_sample_layout() {
        let sample = ClimateSample::new(-12, 55);
        let mut buf = [0u8; 2];
        sample.encode(&mut buf);

        assert_eq!(buf, [0xF4, 55]);
        assert_eq!(ClimateSample::decode(&buf), sample);
    }

    #[test]
    fn test_entry_sizes_fit_scratch() {
        assert!(<u8 as LogEntry>::SIZE <= MAX_ENTRY_SIZE);
        assert!(ClimateSample::SIZE <= MAX_ENTRY_SIZE);
    }
}
