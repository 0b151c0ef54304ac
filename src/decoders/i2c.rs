//! I2C bus decoder
//!
//! Watches three things at once through a single multi-set `wait`: a start
//! condition (SDA falling while SCL high), a stop condition (SDA rising
//! while SCL high) and a data bit (SCL rising). Bytes are collected 8 bits
//! MSB-first followed by the ACK/NACK bit; the first byte after a start is
//! decoded as the 7-bit address plus the read/write flag.

use crate::descriptor::{AnnotationCatalog, AnnotationRow, ChannelSpec, DecoderDescriptor};
use crate::engine::{ConditionSet, ConditionType, Matcher, SpanOutput};
use crate::orchestrator::Decoder;
use crate::{DecodeError, Result};
use tracing::trace;

const ANN_START: usize = 0;
const ANN_STOP: usize = 1;
const ANN_ADDRESS: usize = 2;
const ANN_DATA: usize = 3;
const ANN_ACK: usize = 4;
const ANN_NACK: usize = 5;

const SLOT_SCL: usize = 0;
const SLOT_SDA: usize = 1;

const SET_START: usize = 0;
const SET_STOP: usize = 1;
const SET_BIT: usize = 2;

pub struct I2cDecoder {
    descriptor: DecoderDescriptor,
}

impl I2cDecoder {
    pub fn new() -> Self {
        Self {
            descriptor: DecoderDescriptor {
                id: "i2c".to_string(),
                name: "I2C".to_string(),
                longname: "Inter-Integrated Circuit".to_string(),
                license: "gplv2+".to_string(),
                inputs: vec!["logic".to_string()],
                outputs: vec!["i2c".to_string()],
                tags: vec!["Embedded/industrial".to_string()],
                channels: vec![
                    ChannelSpec::required("scl", "SCL", "Serial clock line", SLOT_SCL),
                    ChannelSpec::required("sda", "SDA", "Serial data line", SLOT_SDA),
                ],
                options: Vec::new(),
                annotations: AnnotationCatalog::new(&[
                    ("s", "Start"),
                    ("p", "Stop"),
                    ("addr", "Address"),
                    ("d", "Data"),
                    ("a", "ACK"),
                    ("n", "NACK"),
                ]),
                annotation_rows: vec![AnnotationRow {
                    id: "bus".to_string(),
                    name: "Bus".to_string(),
                    ann_types: vec![
                        ANN_START,
                        ANN_STOP,
                        ANN_ADDRESS,
                        ANN_DATA,
                        ANN_ACK,
                        ANN_NACK,
                    ],
                }],
            },
        }
    }
}

impl Default for I2cDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for I2cDecoder {
    fn descriptor(&self) -> &DecoderDescriptor {
        &self.descriptor
    }

    fn decode(&mut self, matcher: &mut Matcher) -> Result<()> {
        let sets = [
            ConditionSet::new()
                .with(SLOT_SCL, ConditionType::High)
                .with(SLOT_SDA, ConditionType::Falling),
            ConditionSet::new()
                .with(SLOT_SCL, ConditionType::High)
                .with(SLOT_SDA, ConditionType::Rising),
            ConditionSet::single(SLOT_SCL, ConditionType::Rising),
        ];

        let mut byte: u64 = 0;
        let mut bit_count: u32 = 0;
        let mut byte_start = 0usize;
        let mut expecting_address = false;

        loop {
            let m = match matcher.wait(&sets) {
                Ok(m) => m,
                Err(DecodeError::EndOfSamples) => break,
                Err(e) => return Err(e),
            };

            match m.matched_set {
                Some(SET_START) => {
                    trace!("i2c start at sample {}", m.sample_number);
                    matcher.put(
                        m.sample_number,
                        m.sample_number,
                        SpanOutput::annotation(ANN_START, &["Start", "S"]),
                    );
                    byte = 0;
                    bit_count = 0;
                    expecting_address = true;
                }
                Some(SET_STOP) => {
                    trace!("i2c stop at sample {}", m.sample_number);
                    matcher.put(
                        m.sample_number,
                        m.sample_number,
                        SpanOutput::annotation(ANN_STOP, &["Stop", "P"]),
                    );
                    byte = 0;
                    bit_count = 0;
                    expecting_address = false;
                }
                Some(SET_BIT) => {
                    let bit = m.pins.get(SLOT_SDA).copied().unwrap_or(0);
                    if bit_count == 8 {
                        // Ninth clock carries the ACK/NACK from the receiver
                        let (ann, text) = if bit == 0 {
                            (ANN_ACK, ["ACK", "A"])
                        } else {
                            (ANN_NACK, ["NACK", "N"])
                        };
                        matcher.put(
                            m.sample_number,
                            m.sample_number,
                            SpanOutput::annotation(ann, &text),
                        );
                        byte = 0;
                        bit_count = 0;
                        continue;
                    }

                    if bit_count == 0 {
                        byte_start = m.sample_number;
                    }
                    byte = (byte << 1) | u64::from(bit);
                    bit_count += 1;

                    if bit_count == 8 {
                        if expecting_address {
                            let address = byte >> 1;
                            let rw = if byte & 1 == 1 { "R" } else { "W" };
                            let long = format!("Address: {:02X} {}", address, rw);
                            let short = format!("{:02X} {}", address, rw);
                            matcher.put(
                                byte_start,
                                m.sample_number,
                                SpanOutput::annotation(ANN_ADDRESS, &[&long, &short])
                                    .with_raw(byte),
                            );
                            expecting_address = false;
                        } else {
                            let long = format!("Data: {:02X}", byte);
                            let short = format!("{:02X}", byte);
                            matcher.put(
                                byte_start,
                                m.sample_number,
                                SpanOutput::annotation(ANN_DATA, &[&long, &short]).with_raw(byte),
                            );
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ChannelData;
    use std::sync::Arc;

    /// Waveform builder over (SCL, SDA) sample pairs
    struct Wave {
        scl: Vec<u8>,
        sda: Vec<u8>,
    }

    impl Wave {
        fn new() -> Self {
            Self {
                scl: vec![1],
                sda: vec![1],
            }
        }

        fn push(&mut self, scl: u8, sda: u8) -> &mut Self {
            self.scl.push(scl);
            self.sda.push(sda);
            self
        }

        /// SDA falls while SCL stays high
        fn start(&mut self) -> &mut Self {
            self.push(1, 0)
        }

        /// One clocked bit: SDA set while SCL low, then SCL rises
        fn bit(&mut self, b: u8) -> &mut Self {
            self.push(0, b).push(1, b)
        }

        fn byte(&mut self, value: u8, ack: bool) -> &mut Self {
            for i in (0..8).rev() {
                self.bit((value >> i) & 1);
            }
            self.bit(u8::from(!ack))
        }

        /// SDA rises while SCL stays high
        fn stop(&mut self) -> &mut Self {
            self.push(0, 0).push(1, 0).push(1, 1)
        }

        fn channels(&self) -> Vec<ChannelData> {
            vec![
                ChannelData::new(0, "SCL", self.scl.clone()),
                ChannelData::new(1, "SDA", self.sda.clone()),
            ]
        }
    }

    fn decode(channels: &[ChannelData]) -> Vec<crate::engine::DecodeSpan> {
        let mut decoder = I2cDecoder::new();
        let mut matcher = Matcher::new(Arc::new(decoder.descriptor().clone()));
        matcher.prepare(channels, &[(0, 0), (1, 1)]);
        decoder.decode(&mut matcher).unwrap();
        matcher.take_results()
    }

    #[test]
    fn test_address_write_transaction() {
        let mut wave = Wave::new();
        wave.start().byte(0xA0, true).stop();
        let spans = decode(&wave.channels());

        let types: Vec<_> = spans.iter().map(|s| s.ann_type).collect();
        assert_eq!(types, vec![ANN_START, ANN_ADDRESS, ANN_ACK, ANN_STOP]);
        assert_eq!(spans[1].raw, Some(0xA0));
        assert_eq!(spans[1].values[0], "Address: 50 W");
    }

    #[test]
    fn test_address_read_flag() {
        let mut wave = Wave::new();
        wave.start().byte(0xA1, true).stop();
        let spans = decode(&wave.channels());
        assert_eq!(spans[1].values[0], "Address: 50 R");
    }

    #[test]
    fn test_data_bytes_after_address() {
        let mut wave = Wave::new();
        wave.start()
            .byte(0xA0, true)
            .byte(0x42, true)
            .byte(0x99, false)
            .stop();
        let spans = decode(&wave.channels());

        let data: Vec<_> = spans
            .iter()
            .filter(|s| s.ann_type == ANN_DATA)
            .map(|s| s.raw)
            .collect();
        assert_eq!(data, vec![Some(0x42), Some(0x99)]);

        let nacks = spans.iter().filter(|s| s.ann_type == ANN_NACK).count();
        assert_eq!(nacks, 1, "last byte was not acknowledged");
    }

    #[test]
    fn test_idle_bus_produces_nothing() {
        let channels = vec![
            ChannelData::new(0, "SCL", vec![1; 32]),
            ChannelData::new(1, "SDA", vec![1; 32]),
        ];
        assert!(decode(&channels).is_empty());
    }

    #[test]
    fn test_repeated_start_resets_byte_state() {
        let mut wave = Wave::new();
        // Restart mid-byte: the partial byte must be discarded and the
        // next byte decoded as an address again
        wave.start().bit(1).bit(0).bit(1);
        wave.push(1, 1).start().byte(0x42, true).stop();
        let spans = decode(&wave.channels());

        let addresses: Vec<_> = spans
            .iter()
            .filter(|s| s.ann_type == ANN_ADDRESS)
            .map(|s| s.raw)
            .collect();
        assert_eq!(addresses, vec![Some(0x42)]);
        assert_eq!(
            spans.iter().filter(|s| s.ann_type == ANN_START).count(),
            2
        );
    }
}
