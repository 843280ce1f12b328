use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Search rates below this (one request per ~17 minutes) are raised to it.
pub const MIN_RATE_PER_SEC: f64 = 0.001;

/// Tunables for batch review. Every field can be overridden from the environment.
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub batch_size_default: u32,
    pub batch_size_min: u32,
    pub batch_size_max: u32,
    pub search_max_results: usize,
    pub search_rate_per_sec: f64,
    pub search_burst: f64,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    pub trigger_batch_size: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            batch_size_default: 25,
            batch_size_min: 1,
            batch_size_max: 100,
            search_max_results: 12,
            search_rate_per_sec: 1.0,
            search_burst: 1.0,
            poll_interval: Duration::from_secs(2),
            poll_max_attempts: 30,
            trigger_batch_size: 5,
        }
    }
}

impl ReviewConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        let batch_size_max = parse_env("BATCH_SIZE_MAX", |v: &u32| *v >= 1)
            .unwrap_or(default.batch_size_max);
        Self {
            batch_size_default: parse_env("BATCH_SIZE_DEFAULT", |v: &u32| *v >= 1)
                .unwrap_or(default.batch_size_default)
                .min(batch_size_max),
            batch_size_min: default.batch_size_min,
            batch_size_max,
            search_max_results: parse_env("SEARCH_MAX_RESULTS", |v: &usize| *v >= 1)
                .unwrap_or(default.search_max_results),
            search_rate_per_sec: parse_env("SEARCH_RATE_PER_SEC", |v: &f64| v.is_finite() && *v > 0.0)
                .map(|v| v.max(MIN_RATE_PER_SEC))
                .unwrap_or(default.search_rate_per_sec),
            search_burst: parse_env("SEARCH_BURST", |v: &f64| *v >= 1.0)
                .unwrap_or(default.search_burst),
            poll_interval: parse_env("POLL_INTERVAL_MS", |v: &u64| *v > 0)
                .map(Duration::from_millis)
                .unwrap_or(default.poll_interval),
            poll_max_attempts: parse_env("POLL_MAX_ATTEMPTS", |v: &u32| *v >= 1)
                .unwrap_or(default.poll_max_attempts),
            trigger_batch_size: parse_env("TRIGGER_BATCH_SIZE", |v: &u32| *v >= 1)
                .unwrap_or(default.trigger_batch_size),
        }
    }

    pub fn clamp_batch_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.batch_size_default)
            .clamp(self.batch_size_min, self.batch_size_max)
    }
}

fn parse_env<T: FromStr>(key: &str, valid: impl Fn(&T) -> bool) -> Option<T> {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_clamped_into_range() {
        let config = ReviewConfig::default();
        assert_eq!(config.clamp_batch_size(None), 25);
        assert_eq!(config.clamp_batch_size(Some(0)), 1);
        assert_eq!(config.clamp_batch_size(Some(500)), 100);
        assert_eq!(config.clamp_batch_size(Some(40)), 40);
    }
}
