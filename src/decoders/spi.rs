//! SPI bus decoder
//!
//! Samples MOSI and MISO on every rising clock edge and groups the bits
//! MSB-first into words. Each completed word becomes one annotation span;
//! the MOSI bit stream is also published as a secondary channel ("bits")
//! so that payload decoders can stack on top.

use crate::descriptor::{
    AnnotationCatalog, AnnotationRow, ChannelSpec, DecoderDescriptor, OptionKind, OptionSpec,
    OptionValue,
};
use crate::engine::{ConditionSet, ConditionType, Matcher, SpanOutput};
use crate::orchestrator::Decoder;
use crate::{DecodeError, Result};
use tracing::trace;

const ANN_MOSI: usize = 0;
const ANN_MISO: usize = 1;

const SLOT_CLK: usize = 0;
const SLOT_MOSI: usize = 1;
const SLOT_MISO: usize = 2;

pub struct SpiDecoder {
    descriptor: DecoderDescriptor,
    word_size: u32,
}

impl SpiDecoder {
    pub fn new() -> Self {
        Self::with_word_size(8)
    }

    /// Word sizes outside 1..=64 are clamped
    pub fn with_word_size(word_size: u32) -> Self {
        Self {
            descriptor: DecoderDescriptor {
                id: "spi".to_string(),
                name: "SPI".to_string(),
                longname: "Serial Peripheral Interface".to_string(),
                license: "gplv2+".to_string(),
                inputs: vec!["logic".to_string()],
                outputs: vec!["spi".to_string()],
                tags: vec!["Embedded/industrial".to_string()],
                channels: vec![
                    ChannelSpec::required("clk", "CLK", "Clock", SLOT_CLK),
                    ChannelSpec::required("mosi", "MOSI", "Master out, slave in", SLOT_MOSI),
                    ChannelSpec::optional("miso", "MISO", "Master in, slave out", SLOT_MISO),
                ],
                options: vec![OptionSpec {
                    id: "wordsize".to_string(),
                    desc: "Word size (bits)".to_string(),
                    default: OptionValue::Int(8),
                    values: Vec::new(),
                    kind: OptionKind::Int,
                }],
                annotations: AnnotationCatalog::new(&[
                    ("mosi-data", "MOSI data"),
                    ("miso-data", "MISO data"),
                ]),
                annotation_rows: vec![
                    AnnotationRow {
                        id: "mosi".to_string(),
                        name: "MOSI".to_string(),
                        ann_types: vec![ANN_MOSI],
                    },
                    AnnotationRow {
                        id: "miso".to_string(),
                        name: "MISO".to_string(),
                        ann_types: vec![ANN_MISO],
                    },
                ],
            },
            word_size: word_size.clamp(1, 64),
        }
    }
}

impl Default for SpiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SpiDecoder {
    fn descriptor(&self) -> &DecoderDescriptor {
        &self.descriptor
    }

    fn decode(&mut self, matcher: &mut Matcher) -> Result<()> {
        let sample_edge = ConditionSet::single(SLOT_CLK, ConditionType::Rising);

        let mut mosi_word: u64 = 0;
        let mut miso_word: u64 = 0;
        let mut bit_count: u32 = 0;
        let mut word_start = 0usize;
        let mut bit_stream: Vec<u8> = Vec::new();

        loop {
            let m = match matcher.wait(std::slice::from_ref(&sample_edge)) {
                Ok(m) => m,
                Err(DecodeError::EndOfSamples) => break,
                Err(e) => return Err(e),
            };

            let mosi_bit = m.pins.get(SLOT_MOSI).copied().unwrap_or(0);
            let miso_bit = m.pins.get(SLOT_MISO).copied().unwrap_or(0);
            let miso_present = m.pins.len() > SLOT_MISO;

            if bit_count == 0 {
                word_start = m.sample_number;
            }
            mosi_word = (mosi_word << 1) | u64::from(mosi_bit);
            miso_word = (miso_word << 1) | u64::from(miso_bit);
            bit_stream.push(mosi_bit);
            bit_count += 1;

            if bit_count == self.word_size {
                trace!(
                    "spi word at samples {}..{}: mosi={:#04x}",
                    word_start, m.sample_number, mosi_word
                );
                let mosi_text = format!("{:02X}", mosi_word);
                matcher.put(
                    word_start,
                    m.sample_number,
                    SpanOutput::annotation(ANN_MOSI, &[&mosi_text]).with_raw(mosi_word),
                );
                if miso_present {
                    let miso_text = format!("{:02X}", miso_word);
                    matcher.put(
                        word_start,
                        m.sample_number,
                        SpanOutput::annotation(ANN_MISO, &[&miso_text]).with_raw(miso_word),
                    );
                }
                mosi_word = 0;
                miso_word = 0;
                bit_count = 0;
            }
        }

        // Trailing partial word is dropped, but the bit stream keeps every
        // sampled bit for stacked decoders
        if !bit_stream.is_empty() {
            matcher.emit_channel("bits", bit_stream);
        }
        Ok(())
    }
}
