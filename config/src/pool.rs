//! Connection pool tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::duration_millis;

/// Pool tuning parameters
///
/// Negative `max_total` and `max_idle` mean "unbounded". Durations are kept
/// in milliseconds so the struct maps directly onto the `[pool]` TOML table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_total: i32,
    pub max_idle: i32,
    pub min_idle: u32,
    pub min_evictable_idle_ms: u64,
    pub eviction_batch_size: u32,
    /// Interval of the background evictor, 0 disables it
    pub eviction_interval_ms: u64,
    pub test_on_create: bool,
    pub test_on_borrow: bool,
    pub test_on_return: bool,
    pub test_while_idle: bool,
    pub max_wait_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: -1,
            max_idle: 1000,
            min_idle: 5,
            min_evictable_idle_ms: 864_000_000, // 10 days
            eviction_batch_size: 300_000,
            eviction_interval_ms: 30_000,
            test_on_create: true,
            test_on_borrow: true,
            test_on_return: false,
            test_while_idle: false,
            max_wait_ms: 3000,
        }
    }
}

impl PoolConfig {
    pub fn with_max_total(mut self, max_total: i32) -> Self {
        self.max_total = max_total;
        self
    }

    pub fn with_max_idle(mut self, max_idle: i32) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_min_idle(mut self, min_idle: u32) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = duration_millis(max_wait);
        self
    }

    pub fn with_min_evictable_idle(mut self, idle: Duration) -> Self {
        self.min_evictable_idle_ms = duration_millis(idle);
        self
    }

    pub fn with_eviction_batch_size(mut self, batch: u32) -> Self {
        self.eviction_batch_size = batch;
        self
    }

    pub fn with_eviction_interval(mut self, interval: Option<Duration>) -> Self {
        self.eviction_interval_ms = interval.map(duration_millis).unwrap_or(0);
        self
    }

    /// Set `test_on_create`, `test_on_borrow`, `test_on_return` and
    /// `test_while_idle` in that order
    pub fn with_validation(mut self, create: bool, borrow: bool, ret: bool, idle: bool) -> Self {
        self.test_on_create = create;
        self.test_on_borrow = borrow;
        self.test_on_return = ret;
        self.test_while_idle = idle;
        self
    }

    /// `None` when the pool is unbounded
    pub fn max_total_limit(&self) -> Option<usize> {
        usize::try_from(self.max_total).ok()
    }

    /// `None` when the idle set is unbounded
    pub fn max_idle_limit(&self) -> Option<usize> {
        usize::try_from(self.max_idle).ok()
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn min_evictable_idle(&self) -> Duration {
        Duration::from_millis(self.min_evictable_idle_ms)
    }

    pub fn eviction_interval(&self) -> Option<Duration> {
        (self.eviction_interval_ms > 0).then(|| Duration::from_millis(self.eviction_interval_ms))
    }

    /// Clamp values that break the pool invariants, warning about each one.
    pub fn sanitized(mut self) -> Self {
        if let Some(max_idle) = self.max_idle_limit() {
            if self.min_idle as usize > max_idle {
                tracing::warn!(
                    min_idle = self.min_idle,
                    max_idle,
                    "pool min_idle exceeds max_idle, clamping"
                );
                self.min_idle = max_idle as u32;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huge_durations_saturate() {
        let config = PoolConfig::default()
            .with_max_wait(Duration::MAX)
            .with_min_evictable_idle(Duration::MAX)
            .with_eviction_interval(Some(Duration::MAX));
        assert_eq!(config.max_wait_ms, u64::MAX);
        assert_eq!(config.min_evictable_idle_ms, u64::MAX);
        assert_eq!(config.eviction_interval_ms, u64::MAX);
    }

    #[test]
    fn test_default_tuning() {
        let config = PoolConfig::default();
        assert_eq!(config.max_total_limit(), None);
        assert_eq!(config.max_idle_limit(), Some(1000));
        assert_eq!(config.min_idle, 5);
        assert_eq!(config.max_wait(), Duration::from_secs(3));
        assert_eq!(config.min_evictable_idle(), Duration::from_secs(864_000));
        assert_eq!(config.eviction_interval(), Some(Duration::from_secs(30)));
        assert!(config.test_on_create);
        assert!(config.test_on_borrow);
        assert!(!config.test_on_return);
        assert!(!config.test_while_idle);
    }

    #[test]
    fn test_sanitized_clamps_min_idle() {
        let config = PoolConfig::default().with_max_idle(2).with_min_idle(8).sanitized();
        assert_eq!(config.min_idle, 2);

        let unbounded = PoolConfig::default().with_max_idle(-1).with_min_idle(8).sanitized();
        assert_eq!(unbounded.min_idle, 8);
    }

    #[test]
    fn test_eviction_interval_can_be_disabled() {
        let config = PoolConfig::default().with_eviction_interval(None);
        assert_eq!(config.eviction_interval(), None);
    }
}
