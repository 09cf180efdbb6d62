//! Quantum success caveats
//!
//! A qualified success: the quantum finished without raising, but something
//! about its outputs is worth reporting. Flags combine with `|`.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bit-flag set of success caveats
///
/// Serialized as its bits; unknown bits are dropped on deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct QuantumSuccessCaveats(u32);

impl From<u32> for QuantumSuccessCaveats {
    fn from(bits: u32) -> Self {
        Self::from_bits_truncate(bits)
    }
}

impl From<QuantumSuccessCaveats> for u32 {
    fn from(caveats: QuantumSuccessCaveats) -> Self {
        caveats.0
    }
}

impl QuantumSuccessCaveats {
    pub const NONE: Self = Self(0);
    /// The task reported that there was no work to do.
    pub const NO_WORK_FOUND: Self = Self(1 << 0);
    /// At least one predicted output was not written.
    pub const ANY_OUTPUTS_MISSING: Self = Self(1 << 1);
    /// No predicted output was written.
    pub const ALL_OUTPUTS_MISSING: Self = Self(1 << 2);
    /// Input adjustment before execution reported no work.
    pub const ADJUST_QUANTUM_RAISED: Self = Self(1 << 3);
    /// The task declined to process data it considered unusable.
    pub const UNPROCESSABLE_DATA: Self = Self(1 << 4);
    /// The task wrote some outputs and then reported a recoverable error.
    pub const PARTIAL_OUTPUTS_ERROR: Self = Self(1 << 5);

    const ALL: [(Self, &'static str, char, &'static str); 6] = [
        (Self::NO_WORK_FOUND, "NO_WORK_FOUND", 'N', "task found no work to do"),
        (Self::ANY_OUTPUTS_MISSING, "ANY_OUTPUTS_MISSING", '*', "some outputs were not written"),
        (Self::ALL_OUTPUTS_MISSING, "ALL_OUTPUTS_MISSING", '+', "no outputs were written"),
        (Self::ADJUST_QUANTUM_RAISED, "ADJUST_QUANTUM_RAISED", 'A', "input adjustment found no work"),
        (Self::UNPROCESSABLE_DATA, "UNPROCESSABLE_DATA", 'U', "data could not be processed"),
        (Self::PARTIAL_OUTPUTS_ERROR, "PARTIAL_OUTPUTS_ERROR", 'P', "error after partial outputs"),
    ];

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits, dropping unknown flags.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0b11_1111)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Names of the set flags, in declaration order.
    pub fn iter_names(self) -> impl Iterator<Item = &'static str> {
        Self::ALL
            .into_iter()
            .filter(move |(flag, ..)| self.contains(*flag))
            .map(|(_, name, ..)| name)
    }

    /// Look a flag up by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(_, n, ..)| *n == name)
            .map(|(flag, ..)| *flag)
    }

    /// One character per set flag, for compact tables.
    #[must_use]
    pub fn concise(self) -> String {
        Self::ALL
            .iter()
            .filter(|(flag, ..)| self.contains(*flag))
            .map(|(_, _, code, _)| *code)
            .collect()
    }

    /// `(code, description)` for every flag.
    #[must_use]
    pub fn legend() -> Vec<(char, &'static str)> {
        Self::ALL.iter().map(|(_, _, code, desc)| (*code, *desc)).collect()
    }
}

impl BitOr for QuantumSuccessCaveats {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for QuantumSuccessCaveats {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for QuantumSuccessCaveats {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Display for QuantumSuccessCaveats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names: Vec<_> = self.iter_names().collect();
        write!(f, "{}", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let c = QuantumSuccessCaveats::NO_WORK_FOUND | QuantumSuccessCaveats::ALL_OUTPUTS_MISSING;
        assert!(c.contains(QuantumSuccessCaveats::NO_WORK_FOUND));
        assert!(c.contains(QuantumSuccessCaveats::ALL_OUTPUTS_MISSING));
        assert!(!c.contains(QuantumSuccessCaveats::UNPROCESSABLE_DATA));
        assert_eq!(c.to_string(), "NO_WORK_FOUND|ALL_OUTPUTS_MISSING");
        assert_eq!(c.concise(), "N+");
    }

    #[test]
    fn empty_is_none() {
        assert!(QuantumSuccessCaveats::default().is_empty());
        assert_eq!(QuantumSuccessCaveats::NONE.to_string(), "NONE");
        assert_eq!(QuantumSuccessCaveats::NONE.iter_names().count(), 0);
    }

    #[test]
    fn name_lookup_round_trips() {
        for name in ["NO_WORK_FOUND", "PARTIAL_OUTPUTS_ERROR"] {
            let flag = QuantumSuccessCaveats::from_name(name).unwrap();
            assert_eq!(flag.iter_names().collect::<Vec<_>>(), vec![name]);
        }
        assert!(QuantumSuccessCaveats::from_name("BOGUS").is_none());
    }

    #[test]
    fn truncate_drops_unknown_bits() {
        let c = QuantumSuccessCaveats::from_bits_truncate(u32::MAX);
        assert_eq!(c.iter_names().count(), 6);
        assert_eq!(c.bits(), 0b11_1111);
    }

    #[test]
    fn serializes_as_bits() {
        let c = QuantumSuccessCaveats::NO_WORK_FOUND | QuantumSuccessCaveats::UNPROCESSABLE_DATA;
        assert_eq!(serde_json::to_string(&c).unwrap(), "17");
    }

    #[test]
    fn deserializing_drops_unknown_bits() {
        let c: QuantumSuccessCaveats = serde_json::from_str("65").unwrap();
        assert_eq!(c, QuantumSuccessCaveats::NO_WORK_FOUND);
        assert_eq!(c.to_string(), "NO_WORK_FOUND");
    }
}
