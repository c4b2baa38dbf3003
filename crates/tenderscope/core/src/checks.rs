//! The correctness checks.
//!
//! Everything in this module except [`sequential_check`] is pure: the
//! checks read immutable snapshots and pre-fetched chain facts and
//! produce findings. Fetching lives in the runner so that a check never
//! mixes values from different snapshots mid-analysis.

use std::collections::{
    BTreeSet,
    HashMap,
};

use cometbft_client::NodeClient;

use crate::{
    HEIGHT_METRIC,
    MISSED_BLOCKS_METRIC,
    exposition::MetricSnapshot,
    finding::{
        Finding,
        FindingKind,
    },
};

/// At most this many validators are inspected per check, to bound RPC
/// cost on chains with large validator sets.
pub const VALIDATOR_CAP: usize = 10;

/// At most this many blocks are sampled for the correlation check.
pub const SAMPLE_CAP: u64 = 20;

/// Allowed difference between an observed missed-blocks increase and
/// the increase predicted from sampled signatures. Absorbs
/// block-boundary timing skew.
pub const CORRELATION_TOLERANCE: f64 = 2.0;

/// Gap growth beyond the baseline that counts as falling behind.
const GAP_DIVERGENCE: i64 = 10;

/// A gap above this is only tolerable while shrinking fast.
const GAP_HARD_CEILING: i64 = 1000;

/// A gap at or below this is fine regardless of trend.
const GAP_ACCEPTABLE: i64 = 100;

/// Minimum catch-up (in blocks) a very large gap must show per run.
const MIN_CATCHUP: i64 = 10;

/// Allowed disagreement between the exporter's gap gauge and the gap
/// computed from RPC, in blocks. The two reads are not atomic.
const GAP_SKEW_TOLERANCE: f64 = 5.0;

/// The chain/network identity every exporter metric is labeled with.
#[derive(Debug, Clone)]
pub struct ChainLabels {
    pub chain_id: String,
    pub network: String,
}

impl ChainLabels {
    pub fn new(chain_id: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            network: network.into(),
        }
    }

    /// Label pairs for aggregate (chain-wide) metrics.
    pub fn pairs(&self) -> [(&str, &str); 2] {
        [("chain_id", &self.chain_id), ("network", &self.network)]
    }

    /// Label pairs for per-validator metrics, in the order the
    /// exporter renders them.
    pub fn validator_pairs<'a>(&'a self, address: &'a str) -> [(&'a str, &'a str); 3] {
        [
            ("address", address),
            ("chain_id", &self.chain_id),
            ("network", &self.network),
        ]
    }
}

fn short_addr(addr: &str) -> &str {
    &addr[..addr.len().min(8)]
}

/// Missed-blocks counter for one validator, if the exporter tracks it.
fn missed_counter(snapshot: &MetricSnapshot, labels: &ChainLabels, addr: &str) -> Option<f64> {
    snapshot.value_with_labels(MISSED_BLOCKS_METRIC, &labels.validator_pairs(addr))
}

/// Check that counters only ever increase between two snapshots.
///
/// The aggregate height going backwards is an error; standing still is
/// a warning (the exporter may simply be caught up). Per-validator
/// missed-blocks counters are checked independently for the first
/// [`VALIDATOR_CAP`] addresses; a counter absent on either side means
/// the validator is not tracked yet and is skipped silently.
pub fn check_monotonicity(
    baseline: &MetricSnapshot,
    current: &MetricSnapshot,
    labels: &ChainLabels,
    validators: &[String],
) -> Vec<Finding> {
    let mut findings = Vec::new();

    let before = baseline.value_with_labels(HEIGHT_METRIC, &labels.pairs());
    let after = current.value_with_labels(HEIGHT_METRIC, &labels.pairs());
    if let (Some(before), Some(after)) = (before, after) {
        if after < before {
            findings.push(Finding::error(
                FindingKind::HeightDecreased,
                format!(
                    "current block height decreased: {} -> {} (should be monotonic)",
                    before as i64, after as i64
                ),
            ));
        } else if after == before {
            findings.push(Finding::warning(
                FindingKind::HeightStalled,
                "current block height unchanged (exporter may be caught up or stalled)",
            ));
        }
    }

    for addr in validators.iter().take(VALIDATOR_CAP) {
        let before = missed_counter(baseline, labels, addr);
        let after = missed_counter(current, labels, addr);
        if let (Some(before), Some(after)) = (before, after) {
            if after < before {
                findings.push(Finding::error(
                    FindingKind::CounterDecreased,
                    format!(
                        "validator {}... missed_blocks decreased: {} -> {} (should be monotonic)",
                        short_addr(addr),
                        before as i64,
                        after as i64
                    ),
                ));
            }
        }
    }

    findings
}

/// One run's worth of gap readings.
#[derive(Debug, Clone, Copy)]
pub struct GapObservation {
    /// RPC head minus exporter height, at baseline time.
    pub baseline_gap: i64,
    /// The exporter's own gap gauge at the end of the run.
    pub reported_gap: f64,
    /// RPC head at the end of the run.
    pub latest_height: u64,
    /// Exporter height at the end of the run.
    pub current_height: u64,
    /// Wall-clock seconds between the two readings.
    pub elapsed_secs: u64,
}

/// Where the gap is heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapTrend {
    /// Gap grew past the divergence threshold.
    FallingBehind,
    /// Gap above the hard ceiling and barely moving.
    NotCatchingUp,
    /// Gap large but shrinking; normal during initial backfill.
    LargeButImproving,
    /// Gap within the acceptable band.
    Acceptable,
    /// Gap large and shrinking too slowly to clear soon.
    ImprovingSlowly,
}

#[derive(Debug)]
pub struct GapAssessment {
    pub trend: GapTrend,
    pub current_gap: i64,
    pub gap_change: i64,
    pub findings: Vec<Finding>,
}

/// Evaluate the gap/catch-up policy.
///
/// In CI the exporter routinely starts with a large backfill gap, so
/// the catch-up rate matters more than the absolute size. The branches
/// are evaluated in priority order; only the first that applies
/// decides the trend. Independently of the trend, a disagreement
/// between the reported gap and the RPC-computed one beyond
/// [`GAP_SKEW_TOLERANCE`] is noted as a timing-skew warning.
pub fn assess_gap(obs: &GapObservation) -> GapAssessment {
    let current_gap = obs.reported_gap as i64;
    let gap_change = obs.baseline_gap - current_gap;
    let elapsed = obs.elapsed_secs.max(1);
    let mut findings = Vec::new();

    let trend = if current_gap > obs.baseline_gap + GAP_DIVERGENCE {
        findings.push(Finding::error(
            FindingKind::GapDiverging,
            format!(
                "block gap increasing: {} -> {} blocks (exporter is falling behind)",
                obs.baseline_gap, current_gap
            ),
        ));
        GapTrend::FallingBehind
    } else if current_gap > GAP_HARD_CEILING && gap_change < MIN_CATCHUP {
        findings.push(Finding::error(
            FindingKind::GapNotCatchingUp,
            format!(
                "block gap too large ({current_gap} blocks) and not catching up \
                 (only {gap_change} blocks in {elapsed}s)"
            ),
        ));
        GapTrend::NotCatchingUp
    } else if current_gap > GAP_ACCEPTABLE && gap_change > 0 {
        GapTrend::LargeButImproving
    } else if current_gap <= GAP_ACCEPTABLE {
        GapTrend::Acceptable
    } else {
        findings.push(Finding::warning(
            FindingKind::GapCatchingUpSlowly,
            format!(
                "block gap large ({current_gap} blocks) but catching up slowly \
                 ({gap_change} blocks in {elapsed}s)"
            ),
        ));
        GapTrend::ImprovingSlowly
    };

    let computed_gap = obs.latest_height as i64 - obs.current_height as i64;
    let skew = (obs.reported_gap - computed_gap as f64).abs();
    if skew > GAP_SKEW_TOLERANCE {
        findings.push(Finding::warning(
            FindingKind::GapSkew,
            format!(
                "block gap metric mismatch: calculated from RPC: {computed_gap} blocks, \
                 exporter reports: {} blocks (difference: {skew}, likely timing skew \
                 between fetches)",
                obs.reported_gap
            ),
        ));
    }

    GapAssessment {
        trend,
        current_gap,
        gap_change,
        findings,
    }
}

/// Heights to sample for the correlation check.
///
/// For a range of at least [`SAMPLE_CAP`] heights, [`SAMPLE_CAP`]
/// evenly strided heights starting at `start`; for a shorter range,
/// every height in it.
pub fn sample_heights(start: u64, end: u64) -> Vec<u64> {
    if end < start {
        return Vec::new();
    }

    let span = end - start;
    let sample_size = SAMPLE_CAP.min(span + 1);
    if span >= sample_size {
        let step = (span / sample_size).max(1);
        (0..sample_size).map(|i| start + i * step).collect()
    } else {
        (start..=end).collect()
    }
}

/// Correlate missed-blocks counter increases with observed signature
/// absence over a sampled height range.
///
/// Only validators the exporter tracks (counter present in either
/// snapshot) participate. A validator whose counter appeared mid-run
/// has no baseline to diff against and is skipped. Drift beyond
/// [`CORRELATION_TOLERANCE`] is a warning, never an error: sampling is
/// inherently approximate.
pub fn check_correlation(
    baseline: &MetricSnapshot,
    current: &MetricSnapshot,
    labels: &ChainLabels,
    validators: &[String],
    sample_count: usize,
    signed_counts: &HashMap<String, usize>,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    let tracked: Vec<&String> = validators
        .iter()
        .filter(|addr| {
            missed_counter(baseline, labels, addr).is_some()
                || missed_counter(current, labels, addr).is_some()
        })
        .collect();

    if tracked.is_empty() {
        findings.push(Finding::warning(
            FindingKind::NoTrackedValidators,
            "no validators are being tracked yet (exporter may have just started)",
        ));
        return findings;
    }

    for addr in tracked.into_iter().take(VALIDATOR_CAP) {
        let signed = signed_counts.get(addr.as_str()).copied().unwrap_or(0);
        let expected_missed = sample_count.saturating_sub(signed) as f64;

        let before = missed_counter(baseline, labels, addr);
        let after = missed_counter(current, labels, addr);
        match (before, after) {
            (Some(before), Some(after)) => {
                let actual_increase = after - before;
                if (actual_increase - expected_missed).abs() > CORRELATION_TOLERANCE {
                    findings.push(Finding::warning(
                        FindingKind::CorrelationDrift,
                        format!(
                            "validator {}... missed blocks correlation: expected \
                             {expected_missed} increase, got {actual_increase} \
                             (sampled {sample_count} blocks)",
                            short_addr(addr),
                        ),
                    ));
                }
            }
            // Counter appeared during the run; nothing to diff against.
            (None, Some(_)) => {}
            _ => {}
        }
    }

    findings
}

/// Report a gap among the successfully fetched heights of a range.
pub fn check_sequence(fetched: &BTreeSet<u64>) -> Option<Finding> {
    let (min, max) = (fetched.first()?, fetched.last()?);
    let expected = (max - min + 1) as usize;
    if fetched.len() != expected {
        return Some(Finding::error(
            FindingKind::BlockRangeGap,
            format!(
                "gap detected: expected {expected} consecutive blocks, got {} blocks",
                fetched.len()
            ),
        ));
    }
    None
}

/// Fetch every block in `[start, end]` and verify the range has no
/// holes. Unlike the sampling checks, an unfetchable height here is an
/// error: the range was claimed to be processed.
pub async fn sequential_check(node: &NodeClient, start: u64, end: u64) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut fetched = BTreeSet::new();

    for height in start..=end {
        match node.block(height).await {
            Ok(block) => {
                fetched.insert(block.height);
            }
            Err(err) => findings.push(Finding::error(
                FindingKind::BlockFetchFailed,
                format!("could not fetch block {height}: {err}"),
            )),
        }
    }

    findings.extend(check_sequence(&fetched));
    findings
}
