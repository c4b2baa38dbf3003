//! The validation run orchestrator.
//!
//! A run is one sequential pass: capture a baseline, wait (bounded) for
//! the exporter to make progress, capture again, then hand the two
//! immutable snapshots to the checks. The two capture points are the
//! only places where an unreachable collaborator aborts the run;
//! everywhere else a failed fetch degrades to a warning and the run
//! continues with the data it has.

use std::collections::{
    HashMap,
    HashSet,
};
use std::time::Duration;

use colored::Colorize;
use cometbft_client::{
    ClientError,
    MetricsClient,
    NodeClient,
};
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use tokio::time::{
    Instant,
    sleep,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    BLOCK_TXS_METRIC,
    GAP_METRIC,
    HEIGHT_METRIC,
    MISSED_BLOCKS_METRIC,
    checks::{
        ChainLabels,
        GapObservation,
        GapTrend,
        VALIDATOR_CAP,
        assess_gap,
        check_correlation,
        check_monotonicity,
        sample_heights,
    },
    config::ValidationTarget,
    error::ValidateError,
    exposition::MetricSnapshot,
    finding::{
        Finding,
        FindingKind,
    },
};

/// Fixed interval between polls of the exporter while waiting for it to
/// make progress.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Correlation only runs when the exporter advanced by more than this
/// many blocks during the run; a shorter range has too little signal.
const CORRELATION_MIN_ADVANCE: u64 = 5;

/// Missed-blocks counter values at or above this are implausible on any
/// chain the exporter runs against.
const MISSED_SANITY_CEILING: f64 = 1_000_000.0;

/// Everything one validation run observed, in the order it was
/// observed. Findings are accumulated and never retracted; the release
/// decision is structural (see [`FindingKind::is_release_blocking`]).
#[derive(Debug, Default)]
pub struct RunReport {
    findings: Vec<Finding>,
}

impl RunReport {
    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        self.findings.extend(findings);
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Findings that must block a release.
    pub fn blocking_errors(&self) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.kind.is_release_blocking())
            .collect()
    }

    /// Everything worth human attention that must not block a release.
    pub fn warnings(&self) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| !f.kind.is_release_blocking())
            .collect()
    }

    pub fn passed(&self) -> bool {
        self.blocking_errors().is_empty()
    }
}

/// Cross-validates one exporter instance against one RPC node.
#[derive(Debug)]
pub struct MetricValidator {
    node: NodeClient,
    metrics: MetricsClient,
    labels: ChainLabels,
}

impl MetricValidator {
    pub fn new(target: &ValidationTarget, metrics_url: &str) -> Result<Self, ValidateError> {
        let node = NodeClient::new(&target.rpc_url).map_err(ValidateError::ClientSetup)?;
        let metrics = MetricsClient::new(metrics_url).map_err(ValidateError::ClientSetup)?;

        Ok(Self {
            node,
            metrics,
            labels: ChainLabels::new(&target.chain_id, &target.network),
        })
    }

    fn create_spinner() -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                .template("{spinner} {msg}")
                .expect("spinner template is static"),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    async fn capture_snapshot(&self) -> Result<MetricSnapshot, ClientError> {
        Ok(MetricSnapshot::parse(&self.metrics.fetch().await?))
    }

    fn exporter_height(&self, snapshot: &MetricSnapshot) -> Option<u64> {
        snapshot
            .value_with_labels(HEIGHT_METRIC, &self.labels.pairs())
            .map(|height| height as u64)
    }

    /// Run the full validation sequence.
    ///
    /// Returns `Err` only when a mandatory fetch point (baseline or
    /// final capture, or either chain-head read) is unreachable; every
    /// other problem lands in the report as a finding.
    pub async fn run(&self, num_blocks: u64, wait_time_secs: u64) -> Result<RunReport, ValidateError> {
        let mut report = RunReport::default();

        println!(
            "{} {} ({})",
            "Validating exporter metrics for".bold(),
            self.labels.chain_id.cyan(),
            self.labels.network
        );
        info!(
            rpc = self.node.base_url(),
            metrics = self.metrics.url(),
            "starting validation run"
        );

        // Baseline capture. First mandatory fetch point.
        let baseline = self
            .capture_snapshot()
            .await
            .map_err(ValidateError::BaselineCapture)?;
        let Some(baseline_height) = self.exporter_height(&baseline) else {
            report.push(Finding::error(
                FindingKind::HeightMetricMissing,
                format!("baseline {HEIGHT_METRIC} metric not found"),
            ));
            return Ok(report);
        };
        let baseline_latest = self
            .node
            .latest_block_height()
            .await
            .map_err(ValidateError::ChainHead)?;
        let baseline_gap = baseline_latest as i64 - baseline_height as i64;
        info!(baseline_height, baseline_latest, baseline_gap, "captured baseline");

        let elapsed_secs = self.wait_for_progress(num_blocks, wait_time_secs).await;

        // Fresh capture. Second mandatory fetch point. From here on the
        // checks only ever see these two snapshots.
        let current = self
            .capture_snapshot()
            .await
            .map_err(ValidateError::FinalCapture)?;
        info!(metrics = current.len(), "fetched metrics from exporter");
        let latest_height = self
            .node
            .latest_block_height()
            .await
            .map_err(ValidateError::ChainHead)?;

        let Some(current_height) = self.exporter_height(&current) else {
            report.push(Finding::error(
                FindingKind::HeightMetricMissing,
                format!("{HEIGHT_METRIC} metric not found"),
            ));
            return Ok(report);
        };
        info!(current_height, latest_height, "captured current state");

        self.assess_gap_metric(
            &current,
            baseline_height,
            baseline_gap,
            current_height,
            latest_height,
            elapsed_secs,
            &mut report,
        );

        // Historical sample blocks are compared against a possibly
        // advanced snapshot, so this stage only ever produces warnings.
        self.sample_recent_blocks(current_height, num_blocks, &current, &mut report)
            .await;

        let validators = match self.node.validators().await {
            Ok(validators) => Some(validators),
            Err(err) => {
                report.push(Finding::warning(
                    FindingKind::RpcUnavailable,
                    format!("could not fetch validator set: {err}"),
                ));
                None
            }
        };

        if let Some(validators) = &validators {
            self.check_validator_presence(&current, validators, &mut report);
        }

        report.extend(check_monotonicity(
            &baseline,
            &current,
            &self.labels,
            validators.as_deref().unwrap_or(&[]),
        ));

        if let Some(validators) = &validators {
            if current_height > baseline_height + CORRELATION_MIN_ADVANCE {
                self.correlate_missed_blocks(
                    baseline_height + 1,
                    current_height,
                    &baseline,
                    &current,
                    validators,
                    &mut report,
                )
                .await;
            } else {
                debug!(
                    baseline_height,
                    current_height, "advance too small for correlation check"
                );
            }
        }

        Ok(report)
    }

    /// Poll until the exporter has processed `num_blocks` since the
    /// first height observed inside the loop, or the wait budget is
    /// spent. Fetch failures here are ignored entirely: the exporter
    /// may simply not be up yet, and the mandatory capture afterwards
    /// catches a dead endpoint.
    async fn wait_for_progress(&self, num_blocks: u64, wait_time_secs: u64) -> u64 {
        let wait = Duration::from_secs(wait_time_secs);
        let started = Instant::now();
        let spinner = Self::create_spinner();
        spinner.set_message(format!(
            "waiting for the exporter to process {num_blocks} blocks (max {wait_time_secs}s)"
        ));

        let mut initial_height: Option<u64> = None;
        while started.elapsed() < wait {
            if let Ok(snapshot) = self.capture_snapshot().await {
                if let Some(height) = self.exporter_height(&snapshot) {
                    let initial = *initial_height.get_or_insert(height);
                    let processed = height.saturating_sub(initial);
                    let elapsed = started.elapsed().as_secs();

                    if processed >= num_blocks {
                        spinner.finish_with_message(format!(
                            "processed {processed} blocks in {elapsed}s (target: {num_blocks})"
                        ));
                        return elapsed.max(1);
                    }
                    spinner.set_message(format!(
                        "processed {processed}/{num_blocks} blocks ({elapsed}s elapsed)"
                    ));
                } else {
                    spinner.set_message(format!(
                        "waiting for metrics to be available ({}s elapsed)",
                        started.elapsed().as_secs()
                    ));
                }
            }

            sleep(POLL_INTERVAL).await;
        }

        spinner.finish_with_message(format!(
            "reached max wait time ({wait_time_secs}s), proceeding with validation"
        ));
        started.elapsed().as_secs().max(1)
    }

    #[allow(clippy::too_many_arguments)]
    fn assess_gap_metric(
        &self,
        current: &MetricSnapshot,
        baseline_height: u64,
        baseline_gap: i64,
        current_height: u64,
        latest_height: u64,
        elapsed_secs: u64,
        report: &mut RunReport,
    ) {
        let Some(reported_gap) = current.value_with_labels(GAP_METRIC, &self.labels.pairs())
        else {
            report.push(Finding::warning(
                FindingKind::GapMetricMissing,
                format!("{GAP_METRIC} metric not found"),
            ));
            return;
        };

        let assessment = assess_gap(&GapObservation {
            baseline_gap,
            reported_gap,
            latest_height,
            current_height,
            elapsed_secs,
        });

        let blocks_processed = current_height.saturating_sub(baseline_height);
        let rate = blocks_processed as f64 / elapsed_secs.max(1) as f64;
        info!(
            current_gap = assessment.current_gap,
            gap_change = assessment.gap_change,
            rate,
            "gap assessment"
        );

        match assessment.trend {
            GapTrend::Acceptable => println!(
                "{} block gap acceptable: {} blocks behind",
                "✅".green(),
                assessment.current_gap
            ),
            GapTrend::LargeButImproving => println!(
                "{} block gap large ({} blocks) but catching up ({} blocks in {elapsed_secs}s)",
                "✅".green(),
                assessment.current_gap,
                assessment.gap_change
            ),
            _ => {}
        }

        report.extend(assessment.findings);
    }

    /// Compare the most recent processed blocks against the block-txs
    /// gauge. The gauge reflects whichever block the exporter processed
    /// last, which is not necessarily any of the sampled ones, so a
    /// mismatch is only ever a warning.
    async fn sample_recent_blocks(
        &self,
        current_height: u64,
        num_blocks: u64,
        snapshot: &MetricSnapshot,
        report: &mut RunReport,
    ) {
        let reported_txs = snapshot.value_with_labels(BLOCK_TXS_METRIC, &self.labels.pairs());
        let sample_count = num_blocks.min(current_height);

        for offset in 0..sample_count {
            let height = current_height - offset;
            match self.node.block(height).await {
                Ok(block) => {
                    if let Some(reported) = reported_txs {
                        if reported != block.tx_count as f64 {
                            report.push(Finding::warning(
                                FindingKind::TxCountMismatch,
                                format!(
                                    "block {height}: block_txs mismatch - expected {}, \
                                     got {reported} (may be from a different block)",
                                    block.tx_count
                                ),
                            ));
                        }
                    }
                }
                Err(err) => report.push(Finding::warning(
                    FindingKind::BlockFetchFailed,
                    format!("block {height}: could not validate - {err}"),
                )),
            }
        }
    }

    /// Sanity-check the missed-blocks counters that exist. A validator
    /// without the counter has simply never missed a block.
    fn check_validator_presence(
        &self,
        snapshot: &MetricSnapshot,
        validators: &[String],
        report: &mut RunReport,
    ) {
        let mut found = 0usize;

        for addr in validators.iter().take(VALIDATOR_CAP) {
            let missed =
                snapshot.value_with_labels(MISSED_BLOCKS_METRIC, &self.labels.validator_pairs(addr));
            if let Some(missed) = missed {
                found += 1;
                if !(0.0..MISSED_SANITY_CEILING).contains(&missed) {
                    report.push(Finding::warning(
                        FindingKind::UnusualMissedCount,
                        format!(
                            "validator {}... has unusual missed_blocks value: {missed}",
                            &addr[..addr.len().min(8)]
                        ),
                    ));
                }
            }
        }

        info!(
            found,
            checked = validators.len().min(VALIDATOR_CAP),
            "validators with missed-blocks counters"
        );
    }

    async fn correlate_missed_blocks(
        &self,
        start: u64,
        end: u64,
        baseline: &MetricSnapshot,
        current: &MetricSnapshot,
        validators: &[String],
        report: &mut RunReport,
    ) {
        let heights = sample_heights(start, end);
        let validator_set: HashSet<&str> = validators.iter().map(String::as_str).collect();
        let mut signed_counts: HashMap<String, usize> = HashMap::new();

        for height in &heights {
            match self.node.block(*height).await {
                Ok(block) => {
                    for signer in &block.signers {
                        if validator_set.contains(signer.as_str()) {
                            *signed_counts.entry(signer.clone()).or_default() += 1;
                        }
                    }
                }
                Err(err) => {
                    warn!(height, %err, "skipping unfetchable sample block");
                    report.push(Finding::warning(
                        FindingKind::BlockFetchFailed,
                        format!("could not fetch block {height}: {err}"),
                    ));
                }
            }
        }

        report.extend(check_correlation(
            baseline,
            current,
            &self.labels,
            validators,
            heights.len(),
            &signed_counts,
        ));
    }
}
