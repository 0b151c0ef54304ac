//! Bundled protocol decoders
//!
//! These are deliberately small: all sample-level work goes through the
//! matcher's `wait`/`put` primitives, so each decoder is little more than a
//! descriptor plus a frame state machine. They double as reference
//! implementations for writing new decoders against the [`Decoder`] trait.
//!
//! [`Decoder`]: crate::orchestrator::Decoder

mod i2c;
mod spi;

pub use i2c::I2cDecoder;
pub use spi::SpiDecoder;
