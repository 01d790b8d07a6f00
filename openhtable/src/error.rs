//! Error types for table operations that can fail for reasons other than
//! "key already present" (`spec.md` §7: the two must never be collapsed into
//! one signal).

use std::fmt;

/// Failure modes for mutating operations on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Growth was needed to satisfy the operation but the allocator
    /// returned null, or the capacity table has already saturated at its
    /// largest prime (`primes::is_at_capacity_ceiling`).
    CapacityExhausted,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::CapacityExhausted => {
                write!(f, "table capacity exhausted: allocation or growth failed")
            }
        }
    }
}

impl std::error::Error for TableError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_human_readable() {
        assert_eq!(
            TableError::CapacityExhausted.to_string(),
            "table capacity exhausted: allocation or growth failed"
        );
    }

    #[test]
    fn implements_std_error() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&TableError::CapacityExhausted);
    }
}
