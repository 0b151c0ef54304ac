//! Capture boundary types
//!
//! A capture exposes, per physical channel, a channel number, a name and a
//! dense array of 0/1 samples. `ChannelData` doubles as the prepared
//! per-decoder-slot buffer type: `Matcher::prepare` copies capture channels
//! into slot-indexed buffers with an independent lifetime, so a decoder run
//! never aliases the originating capture.

use std::fmt;

/// One channel's worth of sample data
///
/// `samples` holds one byte per sample, each 0 or 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelData {
    /// Physical channel number in the capture
    pub number: usize,
    /// Display name ("SCL", "MOSI", ...)
    pub name: String,
    /// Dense single-bit samples, one per byte
    pub samples: Vec<u8>,
}

impl ChannelData {
    /// Create a new channel buffer
    pub fn new(number: usize, name: impl Into<String>, samples: Vec<u8>) -> Self {
        Self {
            number,
            name: name.into(),
            samples,
        }
    }

    /// Create an all-zero buffer, used to fill unmapped decoder slots
    pub fn zero_filled(number: usize, len: usize) -> Self {
        Self {
            number,
            name: String::new(),
            samples: vec![0; len],
        }
    }

    /// Number of samples in this buffer
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample at `index`, or 0 when out of range
    #[inline]
    pub fn sample_at(&self, index: usize) -> u8 {
        self.samples.get(index).copied().unwrap_or(0)
    }
}

impl fmt::Display for ChannelData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ChannelData[#{} '{}', {} samples]",
            self.number,
            self.name,
            self.samples.len()
        )
    }
}
