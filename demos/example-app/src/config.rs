//! TOML application configuration, loaded the same way
//! `zencan_client::NodeConfig` loads a node configuration: a thin
//! `serde`-derived struct plus a `snafu` error for the two ways loading
//! can fail (bad path, bad TOML).

use std::path::Path;

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("IO error loading {path}: {source}"))]
    Io { path: String, source: std::io::Error },
    #[snafu(display("error parsing TOML: {source}"))]
    TomlDeserialization { source: toml::de::Error },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_root_name")]
    pub root_name: String,
    #[serde(default = "default_separator")]
    pub separator: char,
    #[serde(default)]
    pub ports: PortsConfig,
    #[serde(default)]
    pub timers: TimersConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            root_name: default_root_name(),
            separator: default_separator(),
            ports: PortsConfig::default(),
            timers: TimersConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(IoSnafu {
            path: path.to_string_lossy(),
        })?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(s: &str) -> Result<AppConfig, ConfigError> {
        toml::from_str(s).context(TomlDeserializationSnafu)
    }
}

fn default_root_name() -> String {
    "root".to_string()
}

fn default_separator() -> char {
    ':'
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortsConfig {
    #[serde(default = "default_clisrv_port")]
    pub clisrv: u16,
    #[serde(default = "default_pubsub_port")]
    pub pubsub: u16,
    #[serde(default = "default_scgi_port")]
    pub scgi: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        PortsConfig {
            clisrv: default_clisrv_port(),
            pubsub: default_pubsub_port(),
            scgi: default_scgi_port(),
        }
    }
}

fn default_clisrv_port() -> u16 {
    1998
}

fn default_pubsub_port() -> u16 {
    1999
}

fn default_scgi_port() -> u16 {
    8081
}

/// The three shared poll periods behind `decof_core::observer::TimerHub`'s
/// `Fast`/`Medium`/`Slow` buckets, in milliseconds.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimersConfig {
    #[serde(default = "default_fast_ms")]
    pub fast_ms: u64,
    #[serde(default = "default_medium_ms")]
    pub medium_ms: u64,
    #[serde(default = "default_slow_ms")]
    pub slow_ms: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        TimersConfig {
            fast_ms: default_fast_ms(),
            medium_ms: default_medium_ms(),
            slow_ms: default_slow_ms(),
        }
    }
}

fn default_fast_ms() -> u64 {
    100
}

fn default_medium_ms() -> u64 {
    1000
}

fn default_slow_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_toml_is_empty() {
        let config = AppConfig::load_from_str("").unwrap();
        assert_eq!(config.root_name, "root");
        assert_eq!(config.ports.clisrv, 1998);
        assert_eq!(config.timers.fast_ms, 100);
    }

    #[test]
    fn overrides_apply() {
        let config = AppConfig::load_from_str(
            r#"
            root_name = "laser"
            separator = '/'

            [ports]
            clisrv = 2998
            pubsub = 2999
            scgi = 9081

            [timers]
            fast_ms = 50
            medium_ms = 500
            slow_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.root_name, "laser");
        assert_eq!(config.separator, '/');
        assert_eq!(config.ports.scgi, 9081);
        assert_eq!(config.timers.slow_ms, 5000);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(AppConfig::load_from_str("bogus_field = 1").is_err());
    }
}
