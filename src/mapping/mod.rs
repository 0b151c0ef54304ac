//! Channel mapping: validation, auto-assignment, persistence
//!
//! Resolves a decoder's named channel requirements against a capture's
//! physical channels, independent of the matching engine. Mappings persist
//! across decode runs as JSON-serializable records keyed by decoder id.

pub mod format;
pub mod resolver;
pub mod store;

pub use format::{from_list_form, to_list_form};
pub use resolver::{MappingValidation, auto_assign, detect_conflicts, validate};
pub use store::{ChannelMappingRecord, ImportOutcome, MappingStore};
