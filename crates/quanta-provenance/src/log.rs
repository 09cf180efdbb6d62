//! Append-only, hash-chained record of every state-changing ingestion

use crate::error::ProvenanceError;
use crate::status::QuantumStatus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quanta_core::{QuantumId, QuantumSuccessCaveats};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestEntry {
    pub sequence: u64,
    pub quantum: QuantumId,
    pub attempt: u32,
    /// Reported status of the attempt
    pub status: QuantumStatus,
    pub caveats: QuantumSuccessCaveats,
    pub recorded_at: DateTime<Utc>,
    /// Hex sha256 of the previous entry, zeros for the first
    pub prev_hash: String,
    pub hash: String,
}

const GENESIS: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Default)]
pub struct IngestLog {
    inner: Mutex<Vec<IngestEntry>>,
}

impl IngestLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, verifying the chain.
    ///
    /// # Errors
    /// [`ProvenanceError::IntegrityViolation`] if the chain is broken.
    pub fn from_entries(entries: Vec<IngestEntry>) -> Result<Self, ProvenanceError> {
        let log = Self {
            inner: Mutex::new(entries),
        };
        log.verify_integrity()?;
        Ok(log)
    }

    pub fn append(
        &self,
        quantum: QuantumId,
        attempt: u32,
        status: QuantumStatus,
        caveats: QuantumSuccessCaveats,
    ) -> u64 {
        let mut guard = self.inner.lock();
        let prev_hash = guard.last().map_or_else(|| GENESIS.to_string(), |e| e.hash.clone());
        let mut entry = IngestEntry {
            sequence: guard.len() as u64,
            quantum,
            attempt,
            status,
            caveats,
            recorded_at: Utc::now(),
            prev_hash,
            hash: String::new(),
        };
        entry.hash = compute_hash(&entry);
        let sequence = entry.sequence;
        guard.push(entry);
        sequence
    }

    #[must_use]
    pub fn entries(&self) -> Vec<IngestEntry> {
        self.inner.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Errors
    /// [`ProvenanceError::IntegrityViolation`] naming the first bad entry.
    pub fn verify_integrity(&self) -> Result<(), ProvenanceError> {
        let guard = self.inner.lock();
        let mut prev = GENESIS.to_string();
        for (i, e) in guard.iter().enumerate() {
            if e.sequence != i as u64 || e.prev_hash != prev || e.hash != compute_hash(e) {
                return Err(ProvenanceError::IntegrityViolation(e.sequence));
            }
            prev.clone_from(&e.hash);
        }
        Ok(())
    }
}

fn compute_hash(entry: &IngestEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.sequence.to_le_bytes());
    hasher.update(entry.quantum.0.as_bytes());
    hasher.update(entry.attempt.to_le_bytes());
    hasher.update(entry.status.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(entry.caveats.bits().to_le_bytes());
    hasher.update(entry.recorded_at.timestamp_micros().to_le_bytes());
    hasher.update(entry.prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_integrity() {
        let log = IngestLog::new();
        log.append(QuantumId::new(), 1, QuantumStatus::Failed, QuantumSuccessCaveats::NONE);
        log.append(
            QuantumId::new(),
            1,
            QuantumStatus::SucceededWithCaveats,
            QuantumSuccessCaveats::NO_WORK_FOUND,
        );
        assert_eq!(log.len(), 2);
        assert!(log.verify_integrity().is_ok());

        let entries = log.entries();
        assert_eq!(entries[1].prev_hash, entries[0].hash);
        assert!(IngestLog::from_entries(entries).is_ok());
    }

    #[test]
    fn test_tampered_entry_is_detected() {
        let log = IngestLog::new();
        log.append(QuantumId::new(), 1, QuantumStatus::Failed, QuantumSuccessCaveats::NONE);
        log.append(QuantumId::new(), 2, QuantumStatus::Succeeded, QuantumSuccessCaveats::NONE);
        let mut entries = log.entries();
        entries[0].status = QuantumStatus::Succeeded;
        assert_eq!(
            IngestLog::from_entries(entries).unwrap_err(),
            ProvenanceError::IntegrityViolation(0)
        );
    }
}
