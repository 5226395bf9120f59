use std::env;
use std::time::Duration;

use runtime::PullPolicy;
use scene::BackendKind;
use tracing::debug;

pub const PULL_TIMEOUT_ENV: &str = "ANYMAP_PULL_TIMEOUT_MS";
pub const PULL_INTERVAL_ENV: &str = "ANYMAP_PULL_INTERVAL_MS";
pub const MAX_RETAINED_CALLS_ENV: &str = "ANYMAP_MAX_RETAINED_CALLS";

/// Host-side synchronization settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upper bound for a synchronous pull from the surface.
    pub pull_timeout: Duration,

    /// Sleep between pull attempts.
    pub pull_interval: Duration,

    /// Delivered call records kept before rotation. `None` keeps everything.
    pub max_retained_calls: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pull_timeout: Duration::from_millis(200),
            pull_interval: Duration::from_millis(10),
            max_retained_calls: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or unparsable values keep
    /// their defaults. A retention of 0 means unbounded.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            Duration::from_millis(parse_u64(lookup(key), default.as_millis() as u64))
        };
        let retained = parse_u64(lookup(MAX_RETAINED_CALLS_ENV), 0);
        Self {
            pull_timeout: millis(PULL_TIMEOUT_ENV, defaults.pull_timeout),
            pull_interval: millis(PULL_INTERVAL_ENV, defaults.pull_interval),
            max_retained_calls: (retained > 0).then_some(retained as usize),
        }
    }

    pub fn pull_policy(&self) -> PullPolicy {
        PullPolicy {
            timeout: self.pull_timeout,
            interval: self.pull_interval,
        }
    }
}

pub fn env_var_u64(key: &str, default: u64) -> u64 {
    parse_u64(env::var(key).ok(), default)
}

fn parse_u64(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// First non-empty token from the backend's token variables.
pub fn resolve_access_token(kind: BackendKind) -> Option<String> {
    resolve_token_with(kind, |key| env::var(key).ok())
}

pub fn resolve_token_with(
    kind: BackendKind,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    for &key in kind.token_env_vars() {
        if let Some(value) = lookup(key)
            && !value.trim().is_empty()
        {
            debug!("using {kind} access token from {key}");
            return Some(value.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{SyncConfig, resolve_token_with};
    use pretty_assertions::assert_eq;
    use scene::BackendKind;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_values_fall_back_to_defaults() {
        assert_eq!(SyncConfig::from_lookup(lookup(&[])), SyncConfig::default());
    }

    #[test]
    fn values_are_read_and_garbage_ignored() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("ANYMAP_PULL_TIMEOUT_MS", "1500"),
            ("ANYMAP_PULL_INTERVAL_MS", "fast"),
            ("ANYMAP_MAX_RETAINED_CALLS", " 64 "),
        ]));
        assert_eq!(config.pull_timeout, Duration::from_millis(1500));
        assert_eq!(config.pull_interval, Duration::from_millis(10));
        assert_eq!(config.max_retained_calls, Some(64));
        assert_eq!(config.pull_policy().timeout, Duration::from_millis(1500));
    }

    #[test]
    fn token_lookup_skips_blank_values() {
        let token = resolve_token_with(
            BackendKind::Mapbox,
            lookup(&[("MAPBOX_TOKEN", "  "), ("MAPBOX_ACCESS_TOKEN", "pk.abc")]),
        );
        assert_eq!(token.as_deref(), Some("pk.abc"));
        assert_eq!(resolve_token_with(BackendKind::MapLibre, lookup(&[])), None);
    }
}
