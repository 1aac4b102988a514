// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup configuration: an optional TOML file merged with CLI flags,
//! CLI wins on conflict.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::block::Address;

fn default_node_tag() -> String {
    "dagledger".to_string()
}

fn default_target_block_time() -> String {
    "20s".to_string()
}

fn default_protocol_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub integrator_address: Option<[u8; 33]>,
    pub disable_checkpoints: bool,
    pub simulator: bool,
    pub fastsync: bool,
    pub node_tag: String,
    /// Human-readable duration, e.g. `"20s"`; the difficulty retarget's
    /// target spacing between blocks.
    pub target_block_time: String,
    /// Semantic version advertised at startup and logged for operators
    /// diagnosing a mixed-version deployment.
    pub protocol_version: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            integrator_address: None,
            disable_checkpoints: false,
            simulator: false,
            fastsync: false,
            node_tag: default_node_tag(),
            target_block_time: default_target_block_time(),
            protocol_version: default_protocol_version(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "dagledgerd", about = "DAG ledger consensus engine")]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub integrator_address: Option<String>,

    #[arg(long)]
    pub disable_checkpoints: bool,

    #[arg(long)]
    pub simulator: bool,

    #[arg(long)]
    pub fastsync: bool,

    #[arg(long)]
    pub node_tag: Option<String>,

    #[arg(long)]
    pub target_block_time: Option<String>,

    #[arg(long)]
    pub protocol_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub integrator_address: Address,
    pub disable_checkpoints: bool,
    pub simulator: bool,
    pub fastsync: bool,
    pub node_tag: String,
    pub target_block_time: Duration,
    pub protocol_version: semver::Version,
}

impl Config {
    /// Merge a parsed file config with CLI overrides; CLI flags win.
    pub fn merge(file: FileConfig, cli: Cli) -> Self {
        let integrator_address = cli
            .integrator_address
            .as_deref()
            .map(parse_address)
            .or(file.integrator_address.map(Address::from_bytes))
            .unwrap_or(Address::DEV);

        let target_block_time_str = cli.target_block_time.unwrap_or(file.target_block_time);
        let target_block_time = humantime::parse_duration(&target_block_time_str)
            .unwrap_or_else(|_| Duration::from_secs(20));

        let protocol_version_str = cli.protocol_version.unwrap_or(file.protocol_version);
        let protocol_version = semver::Version::parse(&protocol_version_str)
            .unwrap_or_else(|_| semver::Version::new(1, 0, 0));

        Config {
            integrator_address,
            disable_checkpoints: cli.disable_checkpoints || file.disable_checkpoints,
            simulator: cli.simulator || file.simulator,
            fastsync: cli.fastsync || file.fastsync,
            node_tag: cli.node_tag.unwrap_or(file.node_tag),
            target_block_time,
            protocol_version,
        }
    }

    pub fn load(cli: Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("reading config file {path:?}: {e}"))?;
                toml::from_str(&contents)
                    .map_err(|e| anyhow::anyhow!("parsing config file {path:?}: {e}"))?
            }
            None => FileConfig::default(),
        };
        Ok(Config::merge(file, cli))
    }
}

fn parse_address(s: &str) -> Address {
    let mut bytes = [0u8; 33];
    let decoded = hex::decode(s).unwrap_or_default();
    let len = decoded.len().min(33);
    bytes[..len].copy_from_slice(&decoded[..len]);
    Address::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_file_config() {
        let file = FileConfig {
            simulator: false,
            node_tag: "from-file".into(),
            ..FileConfig::default()
        };
        let cli = Cli {
            config: None,
            integrator_address: None,
            disable_checkpoints: false,
            simulator: true,
            fastsync: false,
            node_tag: Some("from-cli".into()),
            target_block_time: None,
            protocol_version: None,
        };
        let config = Config::merge(file, cli);
        assert!(config.simulator);
        assert_eq!(config.node_tag, "from-cli");
    }

    #[test]
    fn target_block_time_parses_human_readable_duration() {
        let file = FileConfig {
            target_block_time: "30s".into(),
            ..FileConfig::default()
        };
        let cli = Cli {
            config: None,
            integrator_address: None,
            disable_checkpoints: false,
            simulator: false,
            fastsync: false,
            node_tag: None,
            target_block_time: None,
            protocol_version: None,
        };
        let config = Config::merge(file, cli);
        assert_eq!(config.target_block_time, std::time::Duration::from_secs(30));
    }
}
