//! Config loading and environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::Generation;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the bundled data tables (`gsc/`, `rby/`, `rse/`).
    pub data_root: PathBuf,
    pub link: LinkConfig,
    pub relay: RelayConfig,
    pub trade: TradeConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            link: LinkConfig::default(),
            relay: RelayConfig::default(),
            trade: TradeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Device path of the link-cable adapter.
    pub device: PathBuf,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyUSB0"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub addr: String,
    pub room: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9090".to_string(),
            room: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    pub generation: Generation,
    /// Prefer buffered mode during negotiation.
    pub buffered: bool,
    /// Japanese cartridge on our side of the link.
    pub japanese: bool,
    /// Deliver pool Pokémon as eggs (Gen 2).
    pub egg: bool,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            generation: Generation::Gen2,
            buffered: false,
            japanese: false,
            egg: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Extra tracing filter, e.g. `tradelink::relay=trace`.
    pub filter: Option<String>,
}

/// Loads `path` if it exists, otherwise the defaults; environment
/// overrides apply either way.
pub fn load(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// `TL_*` variables override the file layer.
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(value) = std::env::var("TL_DATA_ROOT") {
        config.data_root = PathBuf::from(value);
    }
    if let Ok(value) = std::env::var("TL_DEVICE") {
        config.link.device = PathBuf::from(value);
    }
    if let Ok(value) = std::env::var("TL_RELAY_ADDR") {
        config.relay.addr = value;
    }
    if let Ok(value) = std::env::var("TL_ROOM") {
        config.relay.room = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.trade.generation, Generation::Gen2);
        assert!(!config.trade.buffered);
        assert_eq!(config.relay.room, "default");
    }

    #[test]
    fn partial_files_merge_over_defaults() {
        let config: Config = toml::from_str(
            "[trade]\ngeneration = \"gen3\"\n\n[relay]\naddr = \"relay.example:7000\"\n",
        )
        .unwrap();
        assert_eq!(config.trade.generation, Generation::Gen3);
        assert_eq!(config.relay.addr, "relay.example:7000");
        assert_eq!(config.relay.room, "default");
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let rendered = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.data_root, config.data_root);
        assert_eq!(parsed.trade.generation, config.trade.generation);
    }
}
