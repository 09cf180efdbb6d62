//! Error types for Quanta Provenance

use crate::status::QuantumStatus;
use quanta_core::QuantumId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvenanceError {
    /// Same (quantum, attempt) re-ingested with a different outcome; the
    /// first record is kept
    #[error("conflicting outcome for quantum {quantum} attempt {attempt}: recorded {recorded:?}, got {incoming:?}")]
    ProvenanceConflict {
        quantum: QuantumId,
        attempt: u32,
        recorded: QuantumStatus,
        incoming: QuantumStatus,
    },

    #[error("quantum {quantum} attempt {attempt} arrived after attempt {latest}")]
    AttemptOutOfOrder { quantum: QuantumId, attempt: u32, latest: u32 },

    #[error("quantum {0} is not in the provenance graph")]
    UnknownQuantum(QuantumId),

    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition { from: QuantumStatus, to: QuantumStatus },

    #[error("invalid outcome: {0}")]
    InvalidOutcome(String),

    #[error("ingestion log integrity violation at entry {0}")]
    IntegrityViolation(u64),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl ProvenanceError {
    /// Whether the error signals corrupted or inconsistent input rather
    /// than a caller mistake.
    #[inline]
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ProvenanceConflict { .. } | Self::IntegrityViolation(_) | Self::InvalidSnapshot(_)
        )
    }
}

/// Errors loading report configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
