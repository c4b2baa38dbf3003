//! Typed view of the exporter's own YAML configuration.
//!
//! The validator reads the same config file the exporter runs with, so
//! the structs here mirror the exporter's layout and ignore everything
//! the validation suite has no use for (serde skips unknown fields).

use std::{
    fs,
    path::Path,
};

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub chain_id: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub nodes: NodesConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodesConfig {
    #[serde(default)]
    pub rpc: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub cometbft: CometbftConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CometbftConfig {
    #[serde(default)]
    pub block: BlockModuleConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockModuleConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// The three strings the core is parameterized by.
#[derive(Debug, Clone)]
pub struct ValidationTarget {
    pub chain_id: String,
    pub network: String,
    pub rpc_url: String,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Whether the block module this suite validates is enabled at all.
    pub fn block_module_enabled(&self) -> bool {
        self.network.cometbft.block.enabled
    }

    /// Extract the chain identity and the RPC endpoint to validate
    /// against. Only the first configured RPC node is used: CI runs
    /// against a single known-good node, and rotating across a pool
    /// would make the ground truth non-deterministic.
    pub fn validation_target(&self) -> Result<ValidationTarget, ConfigError> {
        if self.general.chain_id.is_empty() || self.general.network.is_empty() {
            return Err(ConfigError::MissingIdentity);
        }

        let rpc_url = self
            .general
            .nodes
            .rpc
            .first()
            .map(|node| node.url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingRpcNode)?;

        Ok(ValidationTarget {
            chain_id: self.general.chain_id.clone(),
            network: self.general.network.clone(),
            rpc_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;

    const FULL_CONFIG: &str = r#"
general:
  chain_id: testchain-1
  network: testnet
  mode: network
  nodes:
    rpc:
      - name: primary
        url: http://localhost:26657/
        healthEndpoint: /health
      - name: backup
        url: http://localhost:26658
network:
  cometbft:
    validators:
      enabled: true
      interval: 10
    block:
      enabled: true
      interval: 5
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_the_exporter_config_layout() {
        let file = write_config(FULL_CONFIG);
        let config = AppConfig::from_file(file.path()).unwrap();

        assert!(config.block_module_enabled());
        let target = config.validation_target().unwrap();
        assert_eq!(target.chain_id, "testchain-1");
        assert_eq!(target.network, "testnet");
        // First node wins, trailing slash normalized.
        assert_eq!(target.rpc_url, "http://localhost:26657");
    }

    #[test]
    fn block_module_defaults_to_disabled() {
        let file = write_config("general:\n  chain_id: c\n  network: n\n");
        let config = AppConfig::from_file(file.path()).unwrap();
        assert!(!config.block_module_enabled());
    }

    #[test]
    fn missing_rpc_nodes_is_a_config_error() {
        let file = write_config("general:\n  chain_id: c\n  network: n\n");
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_matches!(
            config.validation_target(),
            Err(ConfigError::MissingRpcNode)
        );
    }

    #[test]
    fn empty_rpc_url_is_a_config_error() {
        let file = write_config(
            "general:\n  chain_id: c\n  network: n\n  nodes:\n    rpc:\n      - name: x\n        url: \"\"\n",
        );
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_matches!(
            config.validation_target(),
            Err(ConfigError::MissingRpcNode)
        );
    }

    #[test]
    fn missing_identity_is_a_config_error() {
        let file = write_config(
            "general:\n  chain_id: \"\"\n  network: n\n  nodes:\n    rpc:\n      - url: http://x\n",
        );
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_matches!(
            config.validation_target(),
            Err(ConfigError::MissingIdentity)
        );
    }

    #[test]
    fn unreadable_file_is_an_io_error() {
        let err = AppConfig::from_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert_matches!(err, ConfigError::Io(_));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let file = write_config("general: [not, a, mapping");
        assert_matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Yaml(_))
        );
    }
}
