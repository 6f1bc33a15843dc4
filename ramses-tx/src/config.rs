//! TOML-backed configuration for the gateway's transport and traffic
//! filtering (spec.md §6), grounded on `hdds-router`'s `toml`-based config.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::DeviceId;
use crate::error::{Error, Result};
use crate::regex_hack::RegexPipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportSection {
    Serial { port: String, baud_rate: u32 },
    Mqtt { host: String, port: u16, base_topic: String },
    File { path: String },
    Callback,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSection {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub block: Vec<String>,
}

/// `{inbound: {pattern: replacement}, outbound: {...}}`, applied per-frame
/// at the transport layer (spec.md's supplemented `use_regex` feature).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UseRegexSection {
    #[serde(default)]
    pub inbound: HashMap<String, String>,
    #[serde(default)]
    pub outbound: HashMap<String, String>,
}

impl UseRegexSection {
    pub fn build(&self) -> RegexPipeline {
        RegexPipeline::new(self.inbound.clone(), self.outbound.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSection {
    #[serde(default = "default_housekeeping_secs")]
    pub housekeeping_interval_secs: u64,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_housekeeping_secs() -> u64 {
    3600
}

fn default_max_age_secs() -> u64 {
    24 * 3600
}

impl Default for IndexSection {
    fn default() -> Self {
        IndexSection {
            housekeeping_interval_secs: default_housekeeping_secs(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transport: TransportSection,
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub index: IndexSection,
    #[serde(default)]
    pub use_regex: UseRegexSection,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::CommandInvalid(format!("bad config: {e}")))
    }

    pub fn allow_set(&self) -> Result<Option<HashSet<DeviceId>>> {
        if self.filter.allow.is_empty() {
            return Ok(None);
        }
        let ids = self
            .filter
            .allow
            .iter()
            .map(|s| DeviceId::parse(s))
            .collect::<Result<HashSet<_>>>()?;
        Ok(Some(ids))
    }

    pub fn block_set(&self) -> Result<HashSet<DeviceId>> {
        self.filter.block.iter().map(|s| DeviceId::parse(s)).collect()
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.index.housekeeping_interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.index.max_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_serial_config() {
        let text = r#"
            [transport]
            kind = "serial"
            port = "/dev/ttyUSB0"
            baud_rate = 115200

            [filter]
            allow = ["01:145038"]
        "#;
        let cfg = Config::from_toml(text).unwrap();
        assert!(matches!(cfg.transport, TransportSection::Serial { .. }));
        assert_eq!(cfg.allow_set().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn parses_use_regex_rules() {
        let text = r#"
            [transport]
            kind = "callback"

            [use_regex.inbound]
            "^000" = "XXX"

            [use_regex.outbound]
        "#;
        let cfg = Config::from_toml(text).unwrap();
        assert_eq!(cfg.use_regex.inbound.get("^000"), Some(&"XXX".to_string()));
        assert!(cfg.use_regex.outbound.is_empty());
    }

    #[test]
    fn defaults_index_settings_when_absent() {
        let text = r#"
            [transport]
            kind = "callback"
        "#;
        let cfg = Config::from_toml(text).unwrap();
        assert_eq!(cfg.index.housekeeping_interval_secs, 3600);
        assert_eq!(cfg.index.max_age_secs, 24 * 3600);
    }
}
