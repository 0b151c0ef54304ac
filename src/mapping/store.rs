//! Persistence of channel-mapping records
//!
//! Records live in an in-memory collection keyed by decoder id; `export`
//! serializes everything to one self-describing JSON document and `import`
//! reads one back. Where the blob goes between the two calls (a file, a
//! settings store, a remote service) is the caller's concern.
//!
//! Import is deliberately tolerant: only an unparsable document or a missing
//! `records` array fails the whole call. A malformed individual record is
//! logged and skipped so one bad entry cannot take the rest down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

const EXPORT_VERSION: &str = "1.0";

/// One persisted decoder-to-capture channel binding
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMappingRecord {
    pub decoder_id: String,
    pub decoder_name: String,
    /// Decoder channel id -> physical channel index
    pub mapping: BTreeMap<String, usize>,
    /// Set once when the record is first saved, never changed after
    pub created_at: DateTime<Utc>,
    /// Refreshed on every save
    pub updated_at: DateTime<Utc>,
}

/// Self-describing export document
#[derive(Debug, Serialize, Deserialize)]
struct ExportDocument {
    version: String,
    exported_at: DateTime<Utc>,
    records: Vec<serde_json::Value>,
}

/// Result of an `import` call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportOutcome {
    pub success: bool,
    pub imported_count: usize,
    pub error: Option<String>,
}

/// In-memory store of mapping records keyed by decoder id
#[derive(Debug, Default)]
pub struct MappingStore {
    records: HashMap<String, ChannelMappingRecord>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a mapping for a decoder
    ///
    /// Re-saving an existing decoder id preserves `created_at` and
    /// refreshes `updated_at`.
    pub fn save(
        &mut self,
        decoder_id: &str,
        decoder_name: &str,
        mapping: BTreeMap<String, usize>,
    ) {
        let now = Utc::now();
        let created_at = self
            .records
            .get(decoder_id)
            .map(|r| r.created_at)
            .unwrap_or(now);
        self.records.insert(
            decoder_id.to_string(),
            ChannelMappingRecord {
                decoder_id: decoder_id.to_string(),
                decoder_name: decoder_name.to_string(),
                mapping,
                created_at,
                updated_at: now,
            },
        );
        debug!("saved mapping for '{}'", decoder_id);
    }

    pub fn load(&self, decoder_id: &str) -> Option<&ChannelMappingRecord> {
        self.records.get(decoder_id)
    }

    pub fn delete(&mut self, decoder_id: &str) -> bool {
        self.records.remove(decoder_id).is_some()
    }

    /// All records, most recently updated first
    pub fn list_all(&self) -> Vec<&ChannelMappingRecord> {
        let mut all: Vec<_> = self.records.values().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all
    }

    pub fn clear_all(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize every record into one versioned JSON document
    pub fn export(&self) -> String {
        let doc = ExportDocument {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            records: self
                .list_all()
                .into_iter()
                .map(|r| serde_json::to_value(r).unwrap_or(serde_json::Value::Null))
                .collect(),
        };
        serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string())
    }

    /// Import a previously exported document
    ///
    /// Fails as a whole only when the document itself is unusable. A record
    /// that does not deserialize is skipped with a warning and the rest keep
    /// going; imported records overwrite existing ones with the same id.
    pub fn import(&mut self, blob: &str) -> ImportOutcome {
        let doc: ExportDocument = match serde_json::from_str(blob) {
            Ok(doc) => doc,
            Err(e) => {
                return ImportOutcome {
                    success: false,
                    imported_count: 0,
                    error: Some(format!("invalid mapping document: {}", e)),
                };
            }
        };

        let mut imported = 0;
        for value in doc.records {
            match serde_json::from_value::<ChannelMappingRecord>(value) {
                Ok(record) => {
                    self.records.insert(record.decoder_id.clone(), record);
                    imported += 1;
                }
                Err(e) => {
                    warn!("skipping malformed mapping record: {}", e);
                }
            }
        }

        debug!("imported {} mapping record(s)", imported);
        ImportOutcome {
            success: true,
            imported_count: imported,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_save_and_load() {
        let mut store = MappingStore::new();
        store.save("i2c", "I2C", mapping(&[("scl", 0), ("sda", 1)]));
        let record = store.load("i2c").expect("record saved");
        assert_eq!(record.decoder_name, "I2C");
        assert_eq!(record.mapping["sda"], 1);
        assert!(store.load("spi").is_none());
    }

    #[test]
    fn test_resave_preserves_created_at() {
        let mut store = MappingStore::new();
        store.save("i2c", "I2C", mapping(&[("scl", 0)]));
        let created = store.load("i2c").unwrap().created_at;
        store.save("i2c", "I2C", mapping(&[("scl", 4)]));
        let record = store.load("i2c").unwrap();
        assert_eq!(record.created_at, created, "created_at must never change");
        assert!(record.updated_at >= created);
        assert_eq!(record.mapping["scl"], 4);
    }

    #[test]
    fn test_delete_and_clear() {
        let mut store = MappingStore::new();
        store.save("i2c", "I2C", mapping(&[("scl", 0)]));
        store.save("spi", "SPI", mapping(&[("clk", 1)]));
        assert!(store.delete("i2c"));
        assert!(!store.delete("i2c"), "second delete finds nothing");
        store.clear_all();
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_all_ordered_by_updated_at_desc() {
        let mut store = MappingStore::new();
        let blob = r#"{
            "version": "1.0",
            "exported_at": "2026-01-01T00:00:00Z",
            "records": [
                {"decoder_id": "a", "decoder_name": "A", "mapping": {},
                 "created_at": "2026-01-01T00:00:00Z",
                 "updated_at": "2026-01-01T00:00:00Z"},
                {"decoder_id": "b", "decoder_name": "B", "mapping": {},
                 "created_at": "2026-01-02T00:00:00Z",
                 "updated_at": "2026-01-03T00:00:00Z"}
            ]
        }"#;
        assert!(store.import(blob).success);
        let ids: Vec<_> = store.list_all().iter().map(|r| r.decoder_id.clone()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut store = MappingStore::new();
        store.save("i2c", "I2C", mapping(&[("scl", 0), ("sda", 1)]));
        store.save("spi", "SPI", mapping(&[("clk", 2)]));
        let blob = store.export();

        let mut restored = MappingStore::new();
        let outcome = restored.import(&blob);
        assert!(outcome.success);
        assert_eq!(outcome.imported_count, 2);
        assert_eq!(
            restored.load("i2c").unwrap().mapping,
            store.load("i2c").unwrap().mapping
        );
    }

    #[test]
    fn test_import_skips_malformed_record() {
        let mut store = MappingStore::new();
        let blob = r#"{
            "version": "1.0",
            "exported_at": "2026-01-01T00:00:00Z",
            "records": [
                {"decoder_id": "good", "decoder_name": "Good", "mapping": {"clk": 0},
                 "created_at": "2026-01-01T00:00:00Z",
                 "updated_at": "2026-01-01T00:00:00Z"},
                {"decoder_id": "bad", "created_at": "not-a-timestamp"}
            ]
        }"#;
        let outcome = store.import(blob);
        assert!(outcome.success, "per-record failure must not fail the call");
        assert_eq!(outcome.imported_count, 1);
        assert!(store.load("good").is_some());
        assert!(store.load("bad").is_none());
    }

    #[test]
    fn test_import_rejects_bad_document() {
        let mut store = MappingStore::new();
        for blob in ["not json at all", r#"{"version": "1.0"}"#] {
            let outcome = store.import(blob);
            assert!(!outcome.success, "document-level failure for {:?}", blob);
            assert_eq!(outcome.imported_count, 0);
            assert!(outcome.error.is_some());
        }
    }
}
