//! Queue and worker tuning.

use std::collections::HashMap;
use std::time::Duration;

use sdbot_core::types::UserId;
use sdbot_core::CoreError;

/// Default number of in-flight jobs a single user may hold.
pub const DEFAULT_USER_LIMIT: usize = 4;

/// Default number of entries the queue holds before submitters wait.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default period between progress updates of the running job.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Settings consumed by [`AdmissionQueue`](crate::queue::AdmissionQueue)
/// and [`QueueWorker`](crate::worker::QueueWorker).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Max in-flight jobs per user unless overridden.
    pub default_limit: usize,
    /// Per-user overrides of `default_limit`.
    pub user_limits: HashMap<UserId, usize>,
    /// Queue capacity; submissions beyond it wait for space.
    pub capacity: usize,
    /// Period of the progress ticker.
    pub progress_interval: Duration,
    /// Upper bound on a job's execution. `None` waits indefinitely.
    pub job_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_USER_LIMIT,
            user_limits: HashMap::new(),
            capacity: DEFAULT_CAPACITY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            job_timeout: None,
        }
    }
}

impl QueueConfig {
    /// Check every value is in range.
    ///
    /// Rules:
    /// - `default_limit`, every override, and `capacity` must be at least 1.
    /// - `progress_interval` must be at least one second.
    /// - `job_timeout`, when set, must be non-zero.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.default_limit == 0 {
            return Err(CoreError::Validation(
                "Default per-user limit must be at least 1".to_string(),
            ));
        }
        if let Some((user_id, _)) = self.user_limits.iter().find(|(_, limit)| **limit == 0) {
            return Err(CoreError::Validation(format!(
                "Limit for user {user_id} must be at least 1"
            )));
        }
        if self.capacity == 0 {
            return Err(CoreError::Validation(
                "Queue capacity must be at least 1".to_string(),
            ));
        }
        if self.progress_interval < Duration::from_secs(1) {
            return Err(CoreError::Validation(
                "Progress interval must be at least 1 second".to_string(),
            ));
        }
        if self.job_timeout.is_some_and(|t| t.is_zero()) {
            return Err(CoreError::Validation(
                "Job timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse per-user overrides written as `user:limit,user:limit`.
///
/// Whitespace around entries is ignored and an empty string yields no
/// overrides.
pub fn parse_user_limits(raw: &str) -> Result<HashMap<UserId, usize>, CoreError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (user, limit) = entry.split_once(':').ok_or_else(|| {
                CoreError::Validation(format!("Expected `user:limit`, got `{entry}`"))
            })?;
            let user_id = user.trim().parse::<UserId>().map_err(|_| {
                CoreError::Validation(format!("Invalid user id in `{entry}`"))
            })?;
            let limit = limit.trim().parse::<usize>().map_err(|_| {
                CoreError::Validation(format!("Invalid limit in `{entry}`"))
            })?;
            Ok((user_id, limit))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(QueueConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_default_limit_rejected() {
        let config = QueueConfig {
            default_limit: 0,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn zero_override_rejected() {
        let config = QueueConfig {
            user_limits: HashMap::from([(7, 0)]),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(CoreError::Validation(msg)) if msg.contains('7'));
    }

    #[test]
    fn sub_second_interval_rejected() {
        let config = QueueConfig {
            progress_interval: Duration::from_millis(500),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = QueueConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_overrides() {
        let limits = parse_user_limits(" 100:8, 200:1 ").unwrap();
        assert_eq!(limits.get(&100), Some(&8));
        assert_eq!(limits.get(&200), Some(&1));
    }

    #[test]
    fn parse_empty_overrides() {
        assert!(parse_user_limits("").unwrap().is_empty());
    }

    #[test]
    fn parse_malformed_override() {
        assert_matches!(parse_user_limits("100=8"), Err(CoreError::Validation(_)));
        assert_matches!(parse_user_limits("abc:2"), Err(CoreError::Validation(_)));
    }
}
