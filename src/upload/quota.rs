//! Quota accountant
//!
//! Owns the running total of bytes committed to the bucket. The only way to
//! change it is [`QuotaAccountant::try_admit`], which checks the ceiling and
//! commits in a single critical section.
//!
//! Admissions are never refunded: if the transfer that follows an admission
//! fails, the admitted bytes stay counted for the rest of the run.

use super::SizePolicy;
use crate::metrics;
use parking_lot::Mutex;

#[derive(Debug)]
pub struct QuotaAccountant {
    policy: SizePolicy,
    committed: Mutex<u64>,
}

impl QuotaAccountant {
    /// `initial` is the bucket's total stored size before the run.
    pub fn new(initial: u64, policy: SizePolicy) -> Self {
        metrics::set_quota_committed(initial);
        Self {
            policy,
            committed: Mutex::new(initial),
        }
    }

    /// Reserve `size` bytes if that keeps the total within the ceiling.
    pub fn try_admit(&self, size: u64) -> bool {
        let mut committed = self.committed.lock();
        if self.policy.would_exceed_ceiling(*committed, size) {
            return false;
        }
        *committed += size;
        metrics::set_quota_committed(*committed);
        true
    }

    /// Snapshot of the committed total
    pub fn committed(&self) -> u64 {
        *self.committed.lock()
    }

    pub fn remaining(&self) -> u64 {
        self.policy
            .max_aggregate_size
            .saturating_sub(self.committed())
    }

    pub fn ceiling(&self) -> u64 {
        self.policy.max_aggregate_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(ceiling: u64) -> SizePolicy {
        SizePolicy {
            max_aggregate_size: ceiling,
            ..SizePolicy::default()
        }
    }

    #[test]
    fn test_admit_until_ceiling() {
        let quota = QuotaAccountant::new(0, policy(100));
        assert!(quota.try_admit(60));
        assert!(quota.try_admit(40));
        assert!(!quota.try_admit(1));
        assert_eq!(quota.committed(), 100);
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn test_rejection_leaves_total_unchanged() {
        let quota = QuotaAccountant::new(90, policy(100));
        assert!(!quota.try_admit(11));
        assert_eq!(quota.committed(), 90);
        assert!(quota.try_admit(10));
        assert_eq!(quota.committed(), 100);
    }

    #[test]
    fn test_initial_above_ceiling_rejects_everything() {
        let quota = QuotaAccountant::new(150, policy(100));
        assert!(!quota.try_admit(0));
        assert!(!quota.try_admit(1));
        assert_eq!(quota.committed(), 150);
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn test_concurrent_admissions_never_overcommit() {
        let quota = std::sync::Arc::new(QuotaAccountant::new(0, policy(1000)));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let quota = std::sync::Arc::clone(&quota);
                std::thread::spawn(move || (0..50).filter(|_| quota.try_admit(7)).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 1000 / 7);
        assert_eq!(quota.committed(), (1000 / 7) * 7);
    }
}
