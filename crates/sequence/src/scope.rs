//! Counter identity and state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tablepos_core::{DomainError, DomainResult};

/// Longest scope key accepted (matches the `sequence_state.scope` column).
pub const MAX_SCOPE_LEN: usize = 128;

/// Independent counter namespace, e.g. `backend_department_seq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceScope(String);

impl SequenceScope {
    pub fn new(key: impl Into<String>) -> DomainResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(DomainError::validation("sequence scope must not be empty"));
        }
        if key.len() > MAX_SCOPE_LEN {
            return Err(DomainError::validation(format!(
                "sequence scope exceeds {MAX_SCOPE_LEN} bytes"
            )));
        }
        Ok(Self(key))
    }

    /// Scope for one of the built-in `BusinessCode` keys.
    pub(crate) fn from_static(key: &'static str) -> Self {
        debug_assert!(!key.trim().is_empty() && key.len() <= MAX_SCOPE_LEN);
        Self(key.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SequenceScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Period a counter belongs to.
///
/// Empty for never-resetting counters, `YYYYMMDD` for daily ones. Keys order
/// chronologically, and the empty key sorts before every date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(String);

impl PeriodKey {
    /// The constant period used by `IncrSequence`.
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn business_date(date: NaiveDate) -> Self {
        Self(date.format("%Y%m%d").to_string())
    }

    /// Rebuild a key read back from storage.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counter state as observed right after an atomic advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    pub scope: SequenceScope,
    pub period_key: PeriodKey,
    pub counter: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_rejects_blank_and_oversized_keys() {
        assert!(SequenceScope::new("  ").is_err());
        assert!(SequenceScope::new("x".repeat(MAX_SCOPE_LEN + 1)).is_err());
        assert_eq!(
            SequenceScope::new("backend_role_seq").unwrap().as_str(),
            "backend_role_seq"
        );
    }

    #[test]
    fn built_in_scope_keys_pass_validation() {
        for kind in crate::codes::BusinessCode::ALL {
            let key = kind.scope_key();
            assert_eq!(SequenceScope::new(key).unwrap(), SequenceScope::from_static(key));
        }
    }

    #[test]
    fn period_keys_order_chronologically() {
        let d1 = PeriodKey::business_date(NaiveDate::from_ymd_opt(2024, 5, 21).unwrap());
        let d2 = PeriodKey::business_date(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        let d3 = PeriodKey::business_date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());

        assert_eq!(d1.as_str(), "20240521");
        assert!(PeriodKey::none() < d1);
        assert!(d1 < d2);
        assert!(d2 < d3);
    }
}
