//! Per-quantum task metadata
//!
//! Written by the driver to `<label>_metadata` after the task returns, and
//! read back when the attempt is ingested into the provenance graph. The
//! caveat flag set lives under [`CAVEATS_KEY`].

use quanta_core::QuantumSuccessCaveats;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known slot carrying the success caveats
pub const CAVEATS_KEY: &str = "quantum.caveats";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskMetadata {
    entries: BTreeMap<String, Value>,
}

impl TaskMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_caveats(&mut self, caveats: QuantumSuccessCaveats) {
        self.entries.insert(CAVEATS_KEY.to_string(), Value::from(caveats.bits()));
    }

    /// Caveats in the slot; empty when absent or malformed.
    #[must_use]
    pub fn caveats(&self) -> QuantumSuccessCaveats {
        self.entries
            .get(CAVEATS_KEY)
            .and_then(Value::as_u64)
            .and_then(|bits| u32::try_from(bits).ok())
            .map_or(QuantumSuccessCaveats::NONE, QuantumSuccessCaveats::from_bits_truncate)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// # Errors
    /// Fails only if a stored value cannot be serialized.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// # Errors
    /// Fails if `value` is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn caveats_survive_the_metadata_slot() {
        let mut md = TaskMetadata::new();
        assert_eq!(md.caveats(), QuantumSuccessCaveats::NONE);

        md.set_caveats(QuantumSuccessCaveats::NO_WORK_FOUND | QuantumSuccessCaveats::ALL_OUTPUTS_MISSING);
        md.insert("elapsed", json!(1.5));
        let value = md.to_value().unwrap();
        assert_eq!(value[CAVEATS_KEY], json!(5));

        let back = TaskMetadata::from_value(value).unwrap();
        assert!(back.caveats().contains(QuantumSuccessCaveats::NO_WORK_FOUND));
        assert_eq!(back.get("elapsed"), Some(&json!(1.5)));
    }

    #[test]
    fn malformed_slot_reads_as_no_caveats() {
        let md = TaskMetadata::from_value(json!({"quantum.caveats": "lots"})).unwrap();
        assert!(md.caveats().is_empty());
        assert!(TaskMetadata::from_value(json!([1, 2])).is_err());
    }
}
