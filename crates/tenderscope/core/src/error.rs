//! Error types for the validation suite.

use cometbft_client::ClientError;
use thiserror::Error;

/// Errors loading or interpreting the exporter's YAML config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("no RPC nodes found in config")]
    MissingRpcNode,

    #[error("missing chain_id or network in config")]
    MissingIdentity,
}

/// Run-level failures of a validation run.
///
/// Only the two mandatory fetch points abort a run; everything else
/// degrades to findings inside the report.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("client setup failed: {0}")]
    ClientSetup(ClientError),

    #[error("failed to capture baseline metrics: {0}")]
    BaselineCapture(ClientError),

    #[error("failed to fetch metrics: {0}")]
    FinalCapture(ClientError),

    #[error("failed to get latest block height: {0}")]
    ChainHead(ClientError),
}
