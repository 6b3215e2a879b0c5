use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://localhost:5000";
pub const GENERATE_AVATAR_PATH: &str = "/generate-avatar";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Where the avatar service lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ServiceConfig {
    /// Reads `AVATAR_API_BASE` and `AVATAR_HTTP_TIMEOUT_SECS`, falling back to
    /// defaults for unset or unusable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_base = env::var("AVATAR_API_BASE")
            .ok()
            .map(|value| normalize_api_base(&value))
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.api_base);
        let timeout = env::var("AVATAR_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        Self { api_base, timeout }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        let normalized = normalize_api_base(api_base);
        if !normalized.is_empty() {
            self.api_base = normalized;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.api_base, GENERATE_AVATAR_PATH)
    }
}

fn normalize_api_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_fixed_path() {
        let config = ServiceConfig::default().with_api_base("https://avatars.example.com/api/");
        assert_eq!(
            config.endpoint(),
            "https://avatars.example.com/api/generate-avatar"
        );
    }

    #[test]
    fn blank_override_keeps_previous_base() {
        let config = ServiceConfig::default().with_api_base("   ");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }
}
