//! Task manager configuration.

use std::time::Duration;

/// Default number of workers.
pub const DEFAULT_MAX_WORKERS: usize = 3;

/// Longest single `sleep` the control loop may request.
pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_secs(60);

/// Wait used when the control loop gives no `max_wait_time`.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(30);

/// Configuration for the task manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Number of long-lived workers (at least one)
    pub max_workers: usize,
    /// Upper bound for `sleep`
    pub max_sleep: Duration,
    /// Default bound for `wait_for_tasks`
    pub default_wait: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_sleep: DEFAULT_MAX_SLEEP,
            default_wait: DEFAULT_WAIT,
        }
    }
}

impl ManagerConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count. Zero is bumped to one.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Set the sleep cap.
    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    /// Set the default wait.
    pub fn with_default_wait(mut self, default_wait: Duration) -> Self {
        self.default_wait = default_wait;
        self
    }

    /// Worker count actually used by the pool.
    pub fn worker_count(&self) -> usize {
        self.max_workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.max_sleep, Duration::from_secs(60));
        assert_eq!(config.default_wait, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_workers_is_one() {
        assert_eq!(ManagerConfig::new().with_max_workers(0).worker_count(), 1);
        let config = ManagerConfig { max_workers: 0, ..Default::default() };
        assert_eq!(config.worker_count(), 1);
    }
}
