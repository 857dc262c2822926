//! Invocation defaults loadable from JSON.

use serde::Deserialize;

use crate::memory::DEFAULT_CACHE_CAPACITY;

/// Tunables for an invocation. Address-space constants are fixed and not
/// configurable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PvmConfig {
    /// Gas budget when the caller supplies none.
    pub gas: u64,
    /// Entry `pc` when the caller supplies none.
    pub pc: u32,
    /// Entries in the page-access cache; 0 disables it.
    pub access_cache_capacity: usize,
}

impl Default for PvmConfig {
    fn default() -> Self {
        Self {
            gas: 100_000_000,
            pc: 0,
            access_cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl PvmConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = PvmConfig::from_json(r#"{"gas": 50}"#).unwrap();
        assert_eq!(config.gas, 50);
        assert_eq!(config.pc, 0);
        assert_eq!(config.access_cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(PvmConfig::from_json("{}").unwrap(), PvmConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(PvmConfig::from_json(r#"{"gass": 1}"#).is_err());
    }
}
