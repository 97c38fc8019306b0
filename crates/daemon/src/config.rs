//! Daemon configuration file.

use std::path::Path;
use std::time::Duration;

use manager::Credentials;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: Vec<Credentials>,
    #[serde(default)]
    pub engine: EngineSection,
}

/// Engine tuning knobs.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Minimum polling delay in seconds.
    pub min_poll_secs: u64,
    /// Maximum polling delay in seconds.
    pub max_poll_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self { min_poll_secs: 2, max_poll_secs: 30 }
    }
}

impl EngineSection {
    pub fn polling_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.min_poll_secs),
            Duration::from_secs(self.max_poll_secs.max(self.min_poll_secs)),
        )
    }
}

/// Load configuration from a TOML file.
///
/// A missing file yields the default (empty) configuration; a present but
/// malformed file is an error.
pub fn load(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| format!("cannot parse {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            min_poll_secs = 1
            max_poll_secs = 10

            [[credentials]]
            name = "deribit"
            exchange = "deribit"
            key = "k"
            secret = "s"

            [[credentials]]
            name = "bitfinex"
            exchange = "bitfinex"
            key = "k2"
            secret = "s2"
            passphrase = "p"
            endpoint = "https://api-test.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.credentials.len(), 2);
        assert_eq!(config.credentials[0].name, "deribit");
        assert_eq!(
            config.engine.polling_bounds(),
            (Duration::from_secs(1), Duration::from_secs(10))
        );
    }

    #[test]
    fn test_empty_config_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.credentials.is_empty());
        assert_eq!(
            config.engine.polling_bounds(),
            (Duration::from_secs(2), Duration::from_secs(30))
        );
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = load(Path::new("/definitely/not/here.toml")).unwrap();
        assert!(config.credentials.is_empty());
    }
}
