use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("hermes-hero-rs/", env!("CARGO_PKG_VERSION"));

/// Shared outbound client for catalog, search and storage calls.
pub fn build_client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(secs_from_env("HTTP_TIMEOUT_SECS", 15))
        .connect_timeout(secs_from_env("HTTP_CONNECT_TIMEOUT_SECS", 5))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn secs_from_env(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_zero_timeouts_use_default() {
        assert_eq!(
            secs_from_env("HERMES_TEST_UNSET_TIMEOUT", 15),
            Duration::from_secs(15)
        );
    }
}
