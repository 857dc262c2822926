//! Gas accounting.

use std::fmt;

/// Remaining gas. Signed so host calls may overdraw it; arithmetic saturates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Gas(i64);

impl Gas {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    /// Deduct `amount`, saturating at `i64::MIN`.
    pub fn consume(&mut self, amount: u64) {
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        self.0 = self.0.saturating_sub(amount);
    }

    /// No instruction may start once gas is at or below zero.
    pub fn is_exhausted(self) -> bool {
        self.0 <= 0
    }

    /// Gas spent going from `initial` to `self`, or 0 if none was.
    pub fn used_since(self, initial: Gas) -> u64 {
        u64::try_from(i128::from(initial.0) - i128::from(self.0)).unwrap_or(0)
    }
}

impl From<u64> for Gas {
    fn from(value: u64) -> Self {
        Self(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Gas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_saturates() {
        let mut gas = Gas::new(i64::MIN + 1);
        gas.consume(10);
        assert_eq!(gas.value(), i64::MIN);

        let mut gas = Gas::new(5);
        gas.consume(u64::MAX);
        assert!(gas.is_exhausted());
    }

    #[test]
    fn exhaustion_boundary() {
        assert!(Gas::new(0).is_exhausted());
        assert!(Gas::new(-1).is_exhausted());
        assert!(!Gas::new(1).is_exhausted());
    }

    #[test]
    fn conversion_and_usage() {
        assert_eq!(Gas::from(u64::MAX).value(), i64::MAX);
        assert_eq!(Gas::new(3).used_since(Gas::new(10)), 7);
        assert_eq!(Gas::new(-2).used_since(Gas::new(10)), 12);
    }
}
