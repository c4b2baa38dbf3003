//! Minimal exposition-format parsing and label-aware metric lookup.
//!
//! This deliberately does not implement the full Prometheus exposition
//! grammar. The exporter under validation emits plain `name value` and
//! `name{label="value",...} value` lines, and that is all the checks
//! need. HELP/TYPE lines, histograms and exemplars are out of scope.

use std::collections::HashMap;

/// An immutable point-in-time view of the exporter's metrics.
///
/// Keys are the metric name plus the label block exactly as it appeared
/// in the exposition text. Equality on keys is raw string equality; the
/// lookup layer compensates for label-order differences, so two
/// renderings of the same label set are distinct keys here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSnapshot {
    values: HashMap<String, f64>,
}

impl MetricSnapshot {
    /// Parse a block of exposition-format text.
    ///
    /// Blank lines and `#` comment lines are skipped. Malformed lines
    /// are silently dropped rather than failing the parse: a scrape of
    /// a live exporter can race a partially written family, and one bad
    /// line must not invalidate the rest of the snapshot. When the same
    /// key appears twice, the last occurrence wins.
    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.contains('{') {
                // Labeled: split on the closing brace. A line with more
                // than one `}` does not fit the grammar and is dropped.
                let parts: Vec<&str> = line.split('}').collect();
                if parts.len() != 2 {
                    continue;
                }
                if let Ok(value) = parts[1].trim().parse::<f64>() {
                    values.insert(format!("{}}}", parts[0]), value);
                }
            } else {
                let mut tokens = line.split_whitespace();
                let (Some(name), Some(raw), None) =
                    (tokens.next(), tokens.next(), tokens.next())
                else {
                    continue;
                };
                if let Ok(value) = raw.parse::<f64>() {
                    values.insert(name.to_string(), value);
                }
            }
        }

        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up an unlabeled metric by exact name.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Look up a labeled metric.
    ///
    /// The fast path renders the labels in the supplied order and tries
    /// an exact key match. On a miss, every key of the family is
    /// scanned and its label block parsed; the first key whose labels
    /// are a superset of the required ones wins. Extra labels on the
    /// metric are ignored.
    ///
    /// `None` is a valid, expected outcome (e.g. a validator that has
    /// never missed a block has no missed-blocks counter) and must not
    /// be conflated with a zero value by callers.
    pub fn value_with_labels(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        if labels.is_empty() {
            return self.value(name);
        }

        let rendered = labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect::<Vec<_>>()
            .join(",");
        if let Some(value) = self.values.get(&format!("{name}{{{rendered}}}")) {
            return Some(*value);
        }

        let prefix = format!("{name}{{");
        for (key, value) in &self.values {
            if !key.starts_with(&prefix) || !key.ends_with('}') {
                continue;
            }
            let interior = &key[prefix.len()..key.len() - 1];
            let found = parse_label_block(interior);
            if labels
                .iter()
                .all(|(k, v)| found.get(*k).is_some_and(|fv| fv == v))
            {
                return Some(*value);
            }
        }

        None
    }
}

/// Parse the interior of a `{...}` label block into a name → value map.
///
/// Only called on the lookup fallback path; the parser itself never
/// inspects label content. Values keep whatever is between the quotes,
/// so a label value containing `,` or `=` will not round-trip. The
/// exporter emits neither.
fn parse_label_block(interior: &str) -> HashMap<&str, &str> {
    let mut labels = HashMap::new();
    for part in interior.split(',') {
        if let Some((name, value)) = part.split_once('=') {
            labels.insert(name.trim(), value.trim().trim_matches('"'));
        }
    }
    labels
}
