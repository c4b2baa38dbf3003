//! The `blocks` command: sequential-processing check over an explicit
//! height range, independent of the main validation run.

use std::path::PathBuf;

use clap::{
    Parser,
    ValueHint,
};
use colored::Colorize;
use cometbft_client::NodeClient;

use crate::{
    checks::sequential_check,
    config::AppConfig,
    error::ValidateError,
    validate::RunOutcome,
};

/// Command-line arguments for the sequential block-range check.
#[derive(Debug, Parser)]
#[clap(
    name = "blocks",
    about = "Verify a block range is fully fetchable with no gaps.",
    long_about = "Fetch every block in an inclusive height range from the configured RPC \
                  node. Any unfetchable height, or a hole among the fetched heights, is an \
                  error. Useful for confirming a range the exporter claims to have processed."
)]
pub struct BlocksArgs {
    /// Path to the exporter's YAML config file
    #[clap(value_hint = ValueHint::FilePath)]
    pub config: PathBuf,

    /// First height of the range (inclusive)
    #[clap(long = "from")]
    pub from: u64,

    /// Last height of the range (inclusive)
    #[clap(long = "to")]
    pub to: u64,
}

impl BlocksArgs {
    pub async fn run(&self) -> Result<RunOutcome, ValidateError> {
        let config = AppConfig::from_file(&self.config)?;
        let target = config.validation_target()?;
        let node = NodeClient::new(&target.rpc_url).map_err(ValidateError::ClientSetup)?;

        println!(
            "{} blocks {}..={} on {}",
            "Checking".bold(),
            self.from,
            self.to,
            target.chain_id.cyan()
        );

        let findings = sequential_check(&node, self.from, self.to).await;
        if findings.is_empty() {
            println!(
                "{} all {} blocks fetched, no gaps",
                "✅".green(),
                self.to.saturating_sub(self.from) + 1
            );
            return Ok(RunOutcome::Passed);
        }

        for finding in &findings {
            println!("  {} {finding}", "❌".red());
        }
        Ok(RunOutcome::Failed)
    }
}
