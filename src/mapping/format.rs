//! Format adapters for channel mappings
//!
//! The resolver and persistence layer work with the `name -> index` map
//! shape; the orchestrator boundary passes mappings as an ordered list of
//! pairs. Conversion is loss-free in both directions: the list form is
//! ordered by channel id, matching the map's iteration order.

use std::collections::BTreeMap;

/// Map form to ordered list-of-pairs form
pub fn to_list_form(mapping: &BTreeMap<String, usize>) -> Vec<(String, usize)> {
    mapping
        .iter()
        .map(|(id, index)| (id.clone(), *index))
        .collect()
}

/// Ordered list-of-pairs form back to map form
pub fn from_list_form(pairs: &[(String, usize)]) -> BTreeMap<String, usize> {
    pairs.iter().cloned().collect()
}
