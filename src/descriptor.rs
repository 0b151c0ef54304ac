//! Static decoder identity: channels, options, annotation catalog
//!
//! A `DecoderDescriptor` is built once by a decoder's constructor and is
//! read-only afterwards, shared by the matching engine (option/channel
//! validation) and the orchestrator (registry search, branch naming).

use serde::{Deserialize, Serialize};

/// One named signal a decoder consumes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Short identifier ("scl", "mosi")
    pub id: String,
    /// Display name ("Clock", "Master out, slave in")
    pub name: String,
    /// Longer description for UIs
    pub desc: String,
    /// Whether decoding is impossible without this channel mapped
    pub required: bool,
    /// Slot index within the decoder's channel list
    pub index: usize,
}

impl ChannelSpec {
    pub fn required(id: &str, name: &str, desc: &str, index: usize) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            required: true,
            index,
        }
    }

    pub fn optional(id: &str, name: &str, desc: &str, index: usize) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            required: false,
            index,
        }
    }
}

/// Value a decoder option can take
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Str(s.to_string())
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

/// Kind of an option, for UI rendering
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKind {
    Str,
    Int,
    Float,
    /// Value must be one of `OptionSpec::values`
    Enum,
}

/// One configurable decoder option
#[derive(Clone, Debug, PartialEq)]
pub struct OptionSpec {
    pub id: String,
    pub desc: String,
    pub default: OptionValue,
    /// Allowed values; empty means unconstrained
    pub values: Vec<OptionValue>,
    pub kind: OptionKind,
}

/// A supplied option value, addressed by index into the descriptor's
/// option list
#[derive(Clone, Debug, PartialEq)]
pub struct OptionBinding {
    pub index: usize,
    pub value: OptionValue,
}

impl OptionBinding {
    pub fn new(index: usize, value: impl Into<OptionValue>) -> Self {
        Self {
            index,
            value: value.into(),
        }
    }
}

/// One annotation type a decoder can emit: display name plus a short code
/// used in compact renderings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationType {
    pub code: String,
    pub name: String,
}

/// Ordered catalog of a decoder's annotation types
///
/// `DecodeSpan::ann_type` indexes into this list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnotationCatalog {
    pub types: Vec<AnnotationType>,
}

impl AnnotationCatalog {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            types: entries
                .iter()
                .map(|(code, name)| AnnotationType {
                    code: code.to_string(),
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Grouping of annotation types into one display row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationRow {
    pub id: String,
    pub name: String,
    /// Indices into the annotation catalog shown on this row
    pub ann_types: Vec<usize>,
}

/// Static identity of a decoder type
///
/// Immutable after construction; the engine and orchestrator only ever read
/// from it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecoderDescriptor {
    pub id: String,
    pub name: String,
    pub longname: String,
    pub license: String,
    /// Input data kinds ("logic", or a parent decoder's output kind)
    pub inputs: Vec<String>,
    /// Output data kinds this decoder produces for stacking
    pub outputs: Vec<String>,
    pub tags: Vec<String>,
    pub channels: Vec<ChannelSpec>,
    pub options: Vec<OptionSpec>,
    pub annotations: AnnotationCatalog,
    pub annotation_rows: Vec<AnnotationRow>,
}

impl DecoderDescriptor {
    /// Channel specs that are required for decoding
    pub fn required_channels(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.channels.iter().filter(|c| c.required)
    }

    /// Channel specs that are optional
    pub fn optional_channels(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.channels.iter().filter(|c| !c.required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_and_optional_split() {
        let desc = DecoderDescriptor {
            channels: vec![
                ChannelSpec::required("clk", "Clock", "", 0),
                ChannelSpec::optional("en", "Enable", "", 1),
                ChannelSpec::required("data", "Data", "", 2),
            ],
            ..Default::default()
        };
        let required: Vec<_> = desc.required_channels().map(|c| c.id.as_str()).collect();
        let optional: Vec<_> = desc.optional_channels().map(|c| c.id.as_str()).collect();
        assert_eq!(required, vec!["clk", "data"]);
        assert_eq!(optional, vec!["en"]);
    }

    #[test]
    fn test_annotation_catalog_from_pairs() {
        let catalog = AnnotationCatalog::new(&[("s", "Start"), ("d", "Data")]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.types[1].name, "Data");
    }
}
