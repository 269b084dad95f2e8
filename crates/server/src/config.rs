//! Process configuration from `OMNIBASE_*` environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use omnibase_store::repo::usage::DEFAULT_MONTHLY_LIMIT;
use tracing::warn;

const DEFAULT_PORT: u16 = 16969;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub region: String,
    pub monthly_limit: u64,
    pub import_pace: Duration,
    /// Used while the settings document holds no streaming key.
    pub streaming_api_key: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset or unparsable values
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = var("OMNIBASE_BIND")
            .and_then(|v| match v.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!(value = %v, error = %e, "invalid OMNIBASE_BIND, using default");
                    None
                }
            })
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));

        Self {
            data_dir: var("OMNIBASE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            bind,
            region: var("OMNIBASE_REGION")
                .map(|v| v.trim().to_uppercase())
                .unwrap_or_else(|| "DE".to_string()),
            monthly_limit: parse_u64(var("OMNIBASE_MONTHLY_LIMIT"), DEFAULT_MONTHLY_LIMIT),
            import_pace: Duration::from_millis(parse_u64(var("OMNIBASE_IMPORT_PACE_MS"), 50)),
            streaming_api_key: var("OMNIBASE_STREAMING_API_KEY").unwrap_or_default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_u64(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const DEFAULT_BIND: &str = "0.0.0.0:16969";

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ServerConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.region, "DE");
        assert_eq!(config.monthly_limit, 1000);
        assert_eq!(config.import_pace, Duration::from_millis(50));
        assert!(config.streaming_api_key.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("OMNIBASE_DATA_DIR", "/var/lib/omnibase"),
            ("OMNIBASE_BIND", "127.0.0.1:8080"),
            ("OMNIBASE_REGION", "us"),
            ("OMNIBASE_MONTHLY_LIMIT", "250"),
            ("OMNIBASE_IMPORT_PACE_MS", "0"),
            ("OMNIBASE_STREAMING_API_KEY", "k"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/omnibase"));
        assert_eq!(config.bind.to_string(), "127.0.0.1:8080");
        assert_eq!(config.region, "US");
        assert_eq!(config.monthly_limit, 250);
        assert!(config.import_pace.is_zero());
        assert_eq!(config.streaming_api_key, "k");
    }

    #[test]
    fn bad_values_fall_back() {
        let config = config(&[("OMNIBASE_BIND", "nowhere"), ("OMNIBASE_MONTHLY_LIMIT", "lots")]);
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.monthly_limit, 1000);
    }
}
