//! Per-user in-flight job accounting.
//!
//! [`QuotaLedger`] is plain data; the queue wraps it in a mutex so that
//! the limit check and the increment happen under one lock.

use std::collections::HashMap;

use sdbot_core::types::UserId;

use crate::error::PipelineError;

/// Counts each user's admitted-but-not-completed jobs.
///
/// Users with no jobs in flight have no entry, so the map only grows
/// with the number of currently active users.
#[derive(Debug, Default)]
pub struct QuotaLedger {
    default_limit: usize,
    user_limits: HashMap<UserId, usize>,
    counts: HashMap<UserId, usize>,
}

impl QuotaLedger {
    pub fn new(default_limit: usize, user_limits: HashMap<UserId, usize>) -> Self {
        Self {
            default_limit,
            user_limits,
            counts: HashMap::new(),
        }
    }

    /// The limit that applies to `user_id`.
    pub fn limit_for(&self, user_id: UserId) -> usize {
        self.user_limits
            .get(&user_id)
            .copied()
            .unwrap_or(self.default_limit)
    }

    /// Jobs `user_id` currently has in flight.
    pub fn in_flight(&self, user_id: UserId) -> usize {
        self.counts.get(&user_id).copied().unwrap_or(0)
    }

    /// Number of users with at least one job in flight.
    pub fn active_users(&self) -> usize {
        self.counts.len()
    }

    /// Admit one more job for `user_id`.
    ///
    /// A user already at their limit is rejected and the ledger is left
    /// untouched.
    pub fn try_acquire(&mut self, user_id: UserId) -> Result<usize, PipelineError> {
        let limit = self.limit_for(user_id);
        let current = self.in_flight(user_id);
        if current >= limit {
            return Err(PipelineError::QuotaExceeded { user_id, limit });
        }
        let count = current + 1;
        self.counts.insert(user_id, count);
        Ok(count)
    }

    /// Return one job's slot, removing the user once they reach zero.
    pub fn release(&mut self, user_id: UserId) {
        match self.counts.get_mut(&user_id) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.counts.remove(&user_id);
            }
            None => {
                tracing::warn!(user_id, "Released quota for user with no jobs in flight");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn rejects_at_limit_without_mutation() {
        let mut ledger = QuotaLedger::new(2, HashMap::new());
        assert_eq!(ledger.try_acquire(1).unwrap(), 1);
        assert_eq!(ledger.try_acquire(1).unwrap(), 2);
        assert_matches!(
            ledger.try_acquire(1),
            Err(PipelineError::QuotaExceeded { user_id: 1, limit: 2 })
        );
        assert_eq!(ledger.in_flight(1), 2);
    }

    #[test]
    fn override_replaces_default() {
        let mut ledger = QuotaLedger::new(4, HashMap::from([(9, 1)]));
        assert_eq!(ledger.limit_for(9), 1);
        assert_eq!(ledger.limit_for(8), 4);
        ledger.try_acquire(9).unwrap();
        assert!(ledger.try_acquire(9).is_err());
    }

    #[test]
    fn release_prunes_idle_users() {
        let mut ledger = QuotaLedger::new(4, HashMap::new());
        ledger.try_acquire(1).unwrap();
        ledger.try_acquire(1).unwrap();
        ledger.release(1);
        assert_eq!(ledger.in_flight(1), 1);
        ledger.release(1);
        assert_eq!(ledger.in_flight(1), 0);
        assert_eq!(ledger.active_users(), 0);
    }

    #[test]
    fn release_of_unknown_user_is_noop() {
        let mut ledger = QuotaLedger::new(4, HashMap::new());
        ledger.release(42);
        assert_eq!(ledger.active_users(), 0);
    }

    #[test]
    fn many_users_leave_no_footprint() {
        let mut ledger = QuotaLedger::new(3, HashMap::new());
        for round in 0..3 {
            for user in 0..500 {
                for _ in 0..=(user + round) % 3 {
                    ledger.try_acquire(user).unwrap();
                }
            }
            assert_eq!(ledger.active_users(), 500);
            for user in 0..500 {
                while ledger.in_flight(user) > 0 {
                    ledger.release(user);
                }
            }
            assert_eq!(ledger.active_users(), 0);
        }
    }
}
