//! Decoded output types: annotation spans and output kinds

use std::fmt;

/// Rendering shape hint for a span
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpanShape {
    #[default]
    Hexagon,
    Rectangle,
    Circle,
}

/// A labeled, sample-ranged decoding result ("START condition", "byte 0x41")
///
/// Immutable once emitted via `Matcher::put`; spans accumulate in the order
/// they were emitted.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeSpan {
    /// First sample covered by this span
    pub start_sample: usize,
    /// Last sample covered by this span
    pub end_sample: usize,
    /// Index into the decoder's annotation catalog
    pub ann_type: usize,
    /// Display values, most detailed first ("Address write: 0x41", "AW", "A")
    pub values: Vec<String>,
    /// Raw decoded value, when the span carries one
    pub raw: Option<u64>,
    pub shape: SpanShape,
}

impl fmt::Display for DecodeSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}..{}] {} ({})",
            self.start_sample,
            self.end_sample,
            self.values.first().map(String::as_str).unwrap_or(""),
            self.ann_type,
        )
    }
}

/// Payload for `Matcher::put`; unspecified fields take their defaults
/// (annotation type 0, hexagon shape)
#[derive(Clone, Debug, Default)]
pub struct SpanOutput {
    pub ann_type: Option<usize>,
    pub values: Vec<String>,
    pub raw: Option<u64>,
    pub shape: Option<SpanShape>,
}

impl SpanOutput {
    /// Annotation with type and display values
    pub fn annotation(ann_type: usize, values: &[&str]) -> Self {
        Self {
            ann_type: Some(ann_type),
            values: values.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Attach the raw decoded value
    pub fn with_raw(mut self, raw: u64) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn with_shape(mut self, shape: SpanShape) -> Self {
        self.shape = Some(shape);
        self
    }
}

/// Kind of output a decoder registers during a run
///
/// `Annotation` and `Channel` are auto-registered at run start as handles
/// 0 and 1; registering the same kind again returns the same handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Annotation span list, the primary output
    Annotation,
    /// Secondary channel data consumed by stacked decoders
    Channel,
    /// Opaque binary output (exporters)
    Binary,
    /// Out-of-band metadata (bit rates and the like)
    Meta,
}
