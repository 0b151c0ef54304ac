//! Mapping validation, auto-assignment and cross-decoder conflict detection

use crate::capture::ChannelData;
use crate::descriptor::DecoderDescriptor;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Outcome of validating one decoder's mapping against a capture
#[derive(Clone, Debug, Default)]
pub struct MappingValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Display names of required channels absent from the mapping
    pub missing_required: Vec<String>,
    /// Physical index -> decoder-channel ids sharing it
    pub conflicts: BTreeMap<usize, Vec<String>>,
}

/// Validate a `channel id -> physical index` mapping
///
/// Missing required channels, out-of-range indices and two ids sharing one
/// physical channel are errors. A mapped channel with no sample data is a
/// warning only: decoding can proceed, the slot gets zero-filled.
pub fn validate(
    descriptor: &DecoderDescriptor,
    mapping: &BTreeMap<String, usize>,
    available_channels: &[ChannelData],
) -> MappingValidation {
    let mut result = MappingValidation {
        is_valid: true,
        ..Default::default()
    };

    for spec in descriptor.required_channels() {
        if !mapping.contains_key(&spec.id) {
            result.is_valid = false;
            result.missing_required.push(spec.name.clone());
            result
                .errors
                .push(format!("required channel '{}' is not mapped", spec.name));
        }
    }

    for (id, &index) in mapping {
        if index >= available_channels.len() {
            result.is_valid = false;
            result.errors.push(format!(
                "channel '{}' mapped to index {} outside the capture's {} channel(s)",
                id,
                index,
                available_channels.len()
            ));
            continue;
        }
        let data = available_channels.iter().find(|c| c.number == index);
        if data.map_or(true, |c| c.is_empty()) {
            result.warnings.push(format!(
                "channel '{}' mapped to physical channel {} which has no sample data",
                id, index
            ));
        }
    }

    // Group by physical index; two or more ids on one index is an error
    let mut by_index: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (id, &index) in mapping {
        by_index.entry(index).or_default().push(id.clone());
    }
    for (index, ids) in by_index {
        if ids.len() >= 2 {
            result.is_valid = false;
            result.errors.push(format!(
                "physical channel {} is mapped by {} decoder channels",
                index,
                ids.len()
            ));
            result.conflicts.insert(index, ids);
        }
    }

    debug!(
        "validated mapping for '{}': valid={}, {} error(s), {} warning(s)",
        descriptor.id,
        result.is_valid,
        result.errors.len(),
        result.warnings.len()
    );
    result
}

/// Assign the lowest unused physical indices to a decoder's channels
///
/// Required channels are assigned first in declaration order, then optional
/// ones. Assignment stops silently when indices run out; the partial result
/// is never an error.
pub fn auto_assign(
    descriptor: &DecoderDescriptor,
    used_indices: &BTreeSet<usize>,
    max_channels: usize,
) -> BTreeMap<String, usize> {
    let mut assigned = BTreeMap::new();
    let mut taken = used_indices.clone();
    let next_free = |taken: &mut BTreeSet<usize>| {
        let free = (0..max_channels).find(|i| !taken.contains(i))?;
        taken.insert(free);
        Some(free)
    };

    let ordered = descriptor
        .required_channels()
        .chain(descriptor.optional_channels());
    for spec in ordered {
        match next_free(&mut taken) {
            Some(index) => {
                assigned.insert(spec.id.clone(), index);
            }
            None => break,
        }
    }
    assigned
}

/// Find physical channels shared between active decoders
///
/// Returns, for each physical index used by two or more decoders, the
/// `(decoder id, decoder-channel id)` pairs sharing it.
pub fn detect_conflicts(
    active_mappings: &[(&str, &BTreeMap<String, usize>)],
) -> BTreeMap<usize, Vec<(String, String)>> {
    let mut by_index: BTreeMap<usize, Vec<(String, String)>> = BTreeMap::new();
    for (decoder_id, mapping) in active_mappings {
        for (channel_id, &index) in *mapping {
            by_index
                .entry(index)
                .or_default()
                .push((decoder_id.to_string(), channel_id.clone()));
        }
    }
    by_index.retain(|_, users| {
        let decoders: BTreeSet<&str> = users.iter().map(|(d, _)| d.as_str()).collect();
        decoders.len() >= 2
    });
    by_index
}
