//! The outcome vocabulary shared by every check.
//!
//! Checks produce [`Finding`]s and never panic past their boundary.
//! Severity is assigned structurally at the point of creation; the
//! release gate at the end of a run consults [`FindingKind`], not the
//! message text, so no caller ever inspects substrings.

use std::fmt;

/// How serious a finding was at the point the check produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// An invariant was broken.
    Error,
    /// Suspicious but tolerable: timing artifact, cold start, sampling
    /// tolerance.
    Warning,
}

/// What a finding is about. Closed set; adding a variant is a reviewed
/// decision about what can block a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    /// The aggregate height gauge moved backwards.
    HeightDecreased,
    /// The aggregate height gauge did not move during the run.
    HeightStalled,
    /// A per-validator missed-blocks counter moved backwards.
    CounterDecreased,
    /// The gap grew by more than the divergence threshold.
    GapDiverging,
    /// The gap is very large and the exporter is not catching up.
    GapNotCatchingUp,
    /// The gap is large and shrinking, but slowly.
    GapCatchingUpSlowly,
    /// Exporter-reported gap and RPC-computed gap disagree beyond the
    /// timing tolerance.
    GapSkew,
    /// The gap gauge is absent from the snapshot.
    GapMetricMissing,
    /// The mandatory aggregate height gauge is absent.
    HeightMetricMissing,
    /// The block-txs gauge disagrees with a sampled block.
    TxCountMismatch,
    /// A missed-blocks counter holds an implausible value.
    UnusualMissedCount,
    /// A single block could not be fetched.
    BlockFetchFailed,
    /// Fetched heights in a range are not consecutive.
    BlockRangeGap,
    /// The exporter is not tracking any validator yet.
    NoTrackedValidators,
    /// A missed-blocks counter moved out of step with observed
    /// signature absence.
    CorrelationDrift,
    /// An RPC lookup a check depends on was unavailable.
    RpcUnavailable,
}

impl FindingKind {
    /// Whether findings of this kind fail the run.
    ///
    /// Everything else is worth human attention but must not block a
    /// release: historical-sample comparisons, timing skew and
    /// correlation drift all have benign explanations in CI.
    pub fn is_release_blocking(self) -> bool {
        matches!(
            self,
            FindingKind::GapNotCatchingUp | FindingKind::HeightMetricMissing
        )
    }
}

/// One observation from one check. Accumulated across the run, never
/// retracted.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn error(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_two_kinds_block_a_release() {
        let blocking = [
            FindingKind::GapNotCatchingUp,
            FindingKind::HeightMetricMissing,
        ];
        let non_blocking = [
            FindingKind::HeightDecreased,
            FindingKind::HeightStalled,
            FindingKind::CounterDecreased,
            FindingKind::GapDiverging,
            FindingKind::GapCatchingUpSlowly,
            FindingKind::GapSkew,
            FindingKind::GapMetricMissing,
            FindingKind::TxCountMismatch,
            FindingKind::UnusualMissedCount,
            FindingKind::BlockFetchFailed,
            FindingKind::BlockRangeGap,
            FindingKind::NoTrackedValidators,
            FindingKind::CorrelationDrift,
            FindingKind::RpcUnavailable,
        ];

        for kind in blocking {
            assert!(kind.is_release_blocking(), "{kind:?}");
        }
        for kind in non_blocking {
            assert!(!kind.is_release_blocking(), "{kind:?}");
        }
    }

    #[test]
    fn constructors_set_severity() {
        let e = Finding::error(FindingKind::HeightDecreased, "went backwards");
        let w = Finding::warning(FindingKind::HeightStalled, "no movement");

        assert_eq!(e.severity, Severity::Error);
        assert_eq!(w.severity, Severity::Warning);
        assert_eq!(e.to_string(), "went backwards");
    }
}
