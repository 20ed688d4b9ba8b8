//! API configuration.

use std::str::FromStr;
use std::time::Duration;

/// HTTP ingress configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
    pub request_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
    /// Requests whose video blocks multiply past this are refused with 422.
    pub max_combinations: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            max_body_size: 2 * 1024 * 1024,
            max_combinations: 4000,
        }
    }
}

impl ApiConfig {
    /// Read the config from `API_*` and related variables, keeping defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .ok()
                .map(|s| parse_origins(&s))
                .filter(|o| !o.is_empty())
                .unwrap_or(defaults.cors_origins),
            request_timeout: env_parse("REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            max_combinations: env_parse("MAX_COMBINATIONS").unwrap_or(defaults.max_combinations),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.max_combinations, 4000);
        assert_eq!(config.cors_origins, ["*"]);
    }

    #[test]
    fn test_parse_origins_drops_blanks() {
        assert_eq!(
            parse_origins("https://a.example, ,https://b.example,"),
            ["https://a.example", "https://b.example"]
        );
    }
}
