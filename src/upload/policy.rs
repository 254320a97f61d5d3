//! Size policy
//!
//! Pure predicates evaluated per candidate, plus the pre-flight batch size
//! gate evaluated once before any worker starts.

use super::BatchError;

/// Smallest file accepted for upload (10 MiB)
pub const MIN_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Ceiling on the bucket's aggregate size across all versions (1 GiB)
pub const MAX_AGGREGATE_SIZE: u64 = 1024 * 1024 * 1024;

/// Smallest batch accepted for a run
pub const MIN_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    pub min_file_size: u64,
    pub max_aggregate_size: u64,
    pub min_candidates: usize,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            min_file_size: MIN_FILE_SIZE,
            max_aggregate_size: MAX_AGGREGATE_SIZE,
            min_candidates: MIN_CANDIDATES,
        }
    }
}

impl SizePolicy {
    #[inline]
    pub fn is_too_small(&self, size: u64) -> bool {
        size < self.min_file_size
    }

    /// `current_total + size > max_aggregate_size`, overflow counts as exceeding
    #[inline]
    pub fn would_exceed_ceiling(&self, current_total: u64, size: u64) -> bool {
        current_total
            .checked_add(size)
            .map_or(true, |total| total > self.max_aggregate_size)
    }

    pub fn check_candidate_count(&self, found: usize) -> Result<(), BatchError> {
        if found < self.min_candidates {
            return Err(BatchError::Preflight {
                found,
                required: self.min_candidates,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_is_too_small_boundary() {
        let policy = SizePolicy::default();
        assert!(policy.is_too_small(4 * MIB));
        assert!(policy.is_too_small(10 * MIB - 1));
        assert!(!policy.is_too_small(10 * MIB));
        assert!(!policy.is_too_small(12 * MIB));
    }

    #[test]
    fn test_would_exceed_ceiling_boundary() {
        let policy = SizePolicy::default();
        assert!(!policy.would_exceed_ceiling(0, 1024 * MIB));
        assert!(policy.would_exceed_ceiling(1, 1024 * MIB));
        assert!(policy.would_exceed_ceiling(990 * MIB, 50 * MIB));
        assert!(!policy.would_exceed_ceiling(990 * MIB, 34 * MIB));
    }

    #[test]
    fn test_would_exceed_ceiling_on_overflow() {
        let policy = SizePolicy::default();
        assert!(policy.would_exceed_ceiling(u64::MAX, 1));
    }

    #[test]
    fn test_predicates_are_pure() {
        let policy = SizePolicy::default();
        for (total, size) in [(0, 12 * MIB), (1000 * MIB, 30 * MIB), (5, 0)] {
            assert_eq!(
                policy.would_exceed_ceiling(total, size),
                policy.would_exceed_ceiling(total, size)
            );
            assert_eq!(policy.is_too_small(size), policy.is_too_small(size));
        }
    }

    #[test]
    fn test_candidate_count_gate() {
        let policy = SizePolicy::default();
        assert!(matches!(
            policy.check_candidate_count(4),
            Err(BatchError::Preflight {
                found: 4,
                required: 5
            })
        ));
        assert!(policy.check_candidate_count(5).is_ok());
        assert!(policy.check_candidate_count(9).is_ok());
    }
}
