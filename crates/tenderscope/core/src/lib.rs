#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod blocks;
pub mod checks;
pub mod config;
pub mod error;
pub mod exposition;
pub mod finding;
pub mod runner;
pub mod validate;

/// Aggregate current-height gauge emitted by the exporter.
pub const HEIGHT_METRIC: &str = "cosmoswatch_cometbft_current_block_height";

/// Gauge for the distance between the chain head and the exporter's
/// processed height.
pub const GAP_METRIC: &str = "cosmoswatch_cometbft_block_gap";

/// Per-block transaction count gauge.
pub const BLOCK_TXS_METRIC: &str = "cosmoswatch_cometbft_block_txs";

/// Per-validator missed-blocks counter. Only exists for validators the
/// exporter has started tracking.
pub const MISSED_BLOCKS_METRIC: &str = "cosmoswatch_cometbft_validator_missed_blocks";

/// Default exporter metrics endpoint when none is supplied.
pub const DEFAULT_METRICS_URL: &str = "http://localhost:9100/metrics";
