use std::time::Duration;

/// Typed process configuration, resolved once at startup and shared
/// immutably with every component.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the HTTP surface binds to.
    pub port: u16,
    /// Optional wrapper bearer token. When set, the API-key guard is active.
    pub api_key: Option<String>,
    /// Session time-to-live after last access.
    pub session_ttl: Duration,
    /// Interval between reaper passes over the session store.
    pub cleanup_interval: Duration,
    /// Per-request deadline for completion calls.
    pub request_timeout: Duration,
    /// Override path for the Claude executable, if the operator set one.
    pub claude_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8000,
            api_key: None,
            session_ttl: Duration::from_secs(60 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            request_timeout: Duration::from_secs(600),
            claude_command: None,
        }
    }
}

impl Config {
    /// Build a `Config` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a `Config` from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to the default for that key with a
    /// warning rather than failing startup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let port = parse_or(&lookup, "PORT", defaults.port);
        let ttl_minutes = parse_or(&lookup, "SESSION_TTL_MINUTES", 60u64);
        let cleanup_minutes = parse_or(&lookup, "SESSION_CLEANUP_INTERVAL_MINUTES", 5u64);
        let timeout_seconds = parse_or(&lookup, "REQUEST_TIMEOUT_SECONDS", 600u64);

        let api_key = lookup("API_KEY").filter(|k| !k.trim().is_empty());
        let claude_command = lookup("CLAUDE_COMMAND")
            .or_else(|| lookup("CLAUDE_CLI_PATH"))
            .filter(|p| !p.trim().is_empty());

        Config {
            port,
            api_key,
            session_ttl: Duration::from_secs(ttl_minutes * 60),
            cleanup_interval: Duration::from_secs(cleanup_minutes * 60),
            request_timeout: Duration::from_secs(timeout_seconds),
            claude_command,
        }
    }

    pub fn session_ttl_hours(&self) -> f64 {
        self.session_ttl.as_secs_f64() / 3600.0
    }

    pub fn cleanup_interval_minutes(&self) -> f64 {
        self.cleanup_interval.as_secs_f64() / 60.0
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparseable config value, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.port, 8000);
        assert_eq!(config.api_key, None);
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.cleanup_interval, Duration::from_secs(300));
    }

    #[test]
    fn reads_port_and_key() {
        let config = Config::from_lookup(lookup_from(&[("PORT", "9090"), ("API_KEY", "secret")]));
        assert_eq!(config.port, 9090);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn blank_api_key_means_no_guard() {
        let config = Config::from_lookup(lookup_from(&[("API_KEY", "   ")]));
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn ttl_and_cleanup_tunables() {
        let config = Config::from_lookup(lookup_from(&[
            ("SESSION_TTL_MINUTES", "120"),
            ("SESSION_CLEANUP_INTERVAL_MINUTES", "1"),
        ]));
        assert_eq!(config.session_ttl, Duration::from_secs(7200));
        assert_eq!(config.cleanup_interval, Duration::from_secs(60));
        assert!((config.session_ttl_hours() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn garbage_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[("PORT", "not-a-port")]));
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn claude_command_prefers_primary_var() {
        let config = Config::from_lookup(lookup_from(&[
            ("CLAUDE_COMMAND", "/opt/claude"),
            ("CLAUDE_CLI_PATH", "/usr/bin/claude"),
        ]));
        assert_eq!(config.claude_command.as_deref(), Some("/opt/claude"));

        let config = Config::from_lookup(lookup_from(&[("CLAUDE_CLI_PATH", "/usr/bin/claude")]));
        assert_eq!(config.claude_command.as_deref(), Some("/usr/bin/claude"));
    }
}
