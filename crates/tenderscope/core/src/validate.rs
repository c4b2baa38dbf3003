//! The `validate` command: one full cross-validation run.

use std::path::PathBuf;

use clap::{
    Parser,
    ValueHint,
};
use colored::Colorize;

use crate::{
    DEFAULT_METRICS_URL,
    config::AppConfig,
    error::ValidateError,
    runner::{
        MetricValidator,
        RunReport,
    },
};

const VALIDATE_AFTER_HELP: &str =
    "Runs against a live exporter and the RPC node from its config. Exit code 0 means \
     no release-blocking finding was produced (the run may still carry warnings).";

/// How many blocking errors the summary prints before eliding.
const MAX_ERRORS_SHOWN: usize = 10;

/// How many warnings the summary prints before eliding.
const MAX_WARNINGS_SHOWN: usize = 5;

/// What a command run amounts to at the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No release-blocking findings.
    Passed,
    /// The module under validation is disabled; nothing was checked.
    Skipped,
    /// At least one release-blocking finding.
    Failed,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Passed | RunOutcome::Skipped => 0,
            RunOutcome::Failed => 1,
        }
    }
}

/// Command-line arguments for a validation run.
#[derive(Debug, Parser)]
#[clap(
    name = "validate",
    about = "Cross-validate exporter metrics against CometBFT RPC data.",
    long_about = "Cross-validate the exporter's metrics against ground truth fetched from \
                  the chain's RPC interface: monotonicity of counters, gap/catch-up trend, \
                  and missed-block/signature correlation over sampled blocks.",
    after_help = VALIDATE_AFTER_HELP
)]
pub struct ValidateArgs {
    /// Path to the exporter's YAML config file
    #[clap(value_hint = ValueHint::FilePath)]
    pub config: PathBuf,

    /// Number of recent blocks to sample
    #[clap(long = "num-blocks", default_value_t = 5)]
    pub num_blocks: u64,

    /// Seconds to wait for the exporter to make progress
    #[clap(long = "wait-time", default_value_t = 60)]
    pub wait_time: u64,

    /// URL of the exporter's metrics endpoint
    #[clap(
        long = "metrics-url",
        env = "TENDERSCOPE_METRICS_URL",
        value_hint = ValueHint::Url,
        default_value = DEFAULT_METRICS_URL
    )]
    pub metrics_url: String,
}

impl ValidateArgs {
    /// Execute the validation run.
    ///
    /// # Errors
    /// * Returns `ValidateError` if the config cannot be loaded or is
    ///   incomplete
    /// * Returns `ValidateError` if a mandatory fetch point
    ///   (baseline/final capture, chain head) is unreachable
    pub async fn run(&self) -> Result<RunOutcome, ValidateError> {
        let config = AppConfig::from_file(&self.config)?;

        if !config.block_module_enabled() {
            println!(
                "{} block module not enabled for {}, skipping validation",
                "⚠️".yellow(),
                config.general.chain_id
            );
            return Ok(RunOutcome::Skipped);
        }

        let target = config.validation_target()?;
        let validator = MetricValidator::new(&target, &self.metrics_url)?;
        let report = validator.run(self.num_blocks, self.wait_time).await?;

        render_report(&report);
        Ok(if report.passed() {
            RunOutcome::Passed
        } else {
            RunOutcome::Failed
        })
    }
}

fn render_report(report: &RunReport) {
    let errors = report.blocking_errors();
    let warnings = report.warnings();

    println!("\n{}", "=".repeat(60));
    if report.passed() {
        println!("{}", "✅ VALIDATION PASSED".green().bold());
    } else {
        println!("{}", "❌ VALIDATION FAILED".red().bold());
        println!("\n{} error(s):", errors.len());
        for error in errors.iter().take(MAX_ERRORS_SHOWN) {
            println!("  {} {error}", "❌".red());
        }
        if errors.len() > MAX_ERRORS_SHOWN {
            println!("  ... and {} more errors", errors.len() - MAX_ERRORS_SHOWN);
        }
    }

    if !warnings.is_empty() {
        println!("\n{} warning(s):", warnings.len());
        for warning in warnings.iter().take(MAX_WARNINGS_SHOWN) {
            println!("  {} {warning}", "⚠️".yellow());
        }
        if warnings.len() > MAX_WARNINGS_SHOWN {
            println!(
                "  ... and {} more warnings",
                warnings.len() - MAX_WARNINGS_SHOWN
            );
        }
    }
    println!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use clap::Parser;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn defaults_match_the_ci_pipeline_contract() {
        let args = ValidateArgs::try_parse_from(["validate", "config.yaml"]).unwrap();

        assert_eq!(args.config, PathBuf::from("config.yaml"));
        assert_eq!(args.num_blocks, 5);
        assert_eq!(args.wait_time, 60);
        assert_eq!(args.metrics_url, DEFAULT_METRICS_URL);
    }

    #[test]
    fn flags_override_the_defaults() {
        let args = ValidateArgs::try_parse_from([
            "validate",
            "c.yaml",
            "--num-blocks",
            "12",
            "--wait-time",
            "90",
            "--metrics-url",
            "http://exporter:9100/metrics",
        ])
        .unwrap();

        assert_eq!(args.num_blocks, 12);
        assert_eq!(args.wait_time, 90);
        assert_eq!(args.metrics_url, "http://exporter:9100/metrics");
    }

    #[tokio::test]
    async fn disabled_block_module_short_circuits_to_skipped() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"general:\n  chain_id: c\n  network: n\n  nodes:\n    rpc:\n      - url: http://localhost:26657\nnetwork:\n  cometbft:\n    block:\n      enabled: false\n",
        )
        .unwrap();

        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            num_blocks: 5,
            wait_time: 60,
            metrics_url: DEFAULT_METRICS_URL.to_string(),
        };

        let outcome = args.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::Skipped);
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn missing_config_file_is_a_config_error() {
        let args = ValidateArgs {
            config: PathBuf::from("/nope/nothing.yaml"),
            num_blocks: 5,
            wait_time: 60,
            metrics_url: DEFAULT_METRICS_URL.to_string(),
        };

        let err = args.run().await.unwrap_err();
        assert_matches!(err, ValidateError::Config(ConfigError::Io(_)));
    }

    #[tokio::test]
    async fn incomplete_config_is_a_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"general:\n  chain_id: c\n  network: n\nnetwork:\n  cometbft:\n    block:\n      enabled: true\n",
        )
        .unwrap();

        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            num_blocks: 5,
            wait_time: 60,
            metrics_url: DEFAULT_METRICS_URL.to_string(),
        };

        let err = args.run().await.unwrap_err();
        assert_matches!(err, ValidateError::Config(ConfigError::MissingRpcNode));
    }

    #[test]
    fn outcome_exit_codes() {
        assert_eq!(RunOutcome::Passed.exit_code(), 0);
        assert_eq!(RunOutcome::Skipped.exit_code(), 0);
        assert_eq!(RunOutcome::Failed.exit_code(), 1);
    }
}
