use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use simstack_simulation::SimulationResult;

/// Whether larger or smaller values of a metric are preferable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    /// Larger values score higher (throughput-like metrics).
    HigherIsBetter,
    /// Smaller values score higher (wait-time-like metrics).
    LowerIsBetter,
}

/// Configurable per-metric directionality table.
///
/// Rules are ordered name fragments; the first fragment contained in a metric
/// key decides its direction, otherwise the default applies. Supplying the
/// table as configuration keeps the scoring explicit instead of burying a
/// name convention in the ranking code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringTable {
    rules: Vec<(String, MetricDirection)>,
    default: MetricDirection,
}

impl Default for ScoringTable {
    fn default() -> Self {
        Self {
            rules: vec![("wait".into(), MetricDirection::LowerIsBetter)],
            default: MetricDirection::HigherIsBetter,
        }
    }
}

impl ScoringTable {
    /// Creates a table from explicit rules and a default direction.
    #[must_use]
    pub const fn new(rules: Vec<(String, MetricDirection)>, default: MetricDirection) -> Self {
        Self { rules, default }
    }

    /// Direction applied to the given metric key.
    #[must_use]
    pub fn direction_for(&self, key: &str) -> MetricDirection {
        self.rules
            .iter()
            .find(|(fragment, _)| key.contains(fragment.as_str()))
            .map_or(self.default, |(_, direction)| *direction)
    }

    /// Mean score of one metric map: `1/(1+v)` for lower-is-better metrics,
    /// `v` directly otherwise. An empty map scores zero.
    #[must_use]
    pub fn score(&self, metrics: &IndexMap<String, f64>) -> f64 {
        if metrics.is_empty() {
            return 0.0;
        }
        let total: f64 = metrics
            .iter()
            .map(|(key, value)| match self.direction_for(key) {
                MetricDirection::LowerIsBetter => 1.0 / (1.0 + value),
                MetricDirection::HigherIsBetter => *value,
            })
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let count = metrics.len() as f64;
        total / count
    }
}

/// Picks the result with the strictly greatest score; ties keep the
/// first-seen result. Returns the winning index and its score.
#[must_use]
pub fn rank(results: &[SimulationResult], table: &ScoringTable) -> Option<(usize, f64)> {
    if results.is_empty() {
        return None;
    }
    let mut best_idx = 0;
    let mut best_score = 0.0;
    for (idx, result) in results.iter().enumerate() {
        let score = table.score(&result.metrics);
        if score > best_score {
            best_score = score;
            best_idx = idx;
        }
    }
    Some((best_idx, best_score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(variant_id: &str, metrics: &[(&str, f64)]) -> SimulationResult {
        SimulationResult {
            variant_id: variant_id.into(),
            metrics: metrics
                .iter()
                .map(|(key, value)| ((*key).to_string(), *value))
                .collect(),
            artifacts: IndexMap::new(),
        }
    }

    #[test]
    fn lower_wait_time_wins() {
        let table = ScoringTable::default();
        let results = vec![
            result("v1", &[("queue_wait_time", 5.0)]),
            result("v2", &[("queue_wait_time", 1.0)]),
        ];
        let (winner, score) = rank(&results, &table).unwrap();
        assert_eq!(winner, 1);
        assert!((score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn higher_throughput_wins_by_default_direction() {
        let table = ScoringTable::default();
        let results = vec![
            result("v1", &[("queue_throughput", 4.0)]),
            result("v2", &[("queue_throughput", 9.0)]),
        ];
        assert_eq!(rank(&results, &table).unwrap().0, 1);
    }

    #[test]
    fn ties_keep_first_seen_result() {
        let table = ScoringTable::default();
        let results = vec![
            result("v1", &[("queue_throughput", 3.0)]),
            result("v2", &[("queue_throughput", 3.0)]),
        ];
        assert_eq!(rank(&results, &table).unwrap().0, 0);
    }

    #[test]
    fn custom_rules_override_the_default_table() {
        let table = ScoringTable::new(
            vec![("latency".into(), MetricDirection::LowerIsBetter)],
            MetricDirection::HigherIsBetter,
        );
        assert_eq!(
            table.direction_for("queue_latency_p99"),
            MetricDirection::LowerIsBetter
        );
        assert_eq!(
            table.direction_for("wait_time"),
            MetricDirection::HigherIsBetter
        );
    }

    #[test]
    fn empty_metrics_score_zero() {
        let table = ScoringTable::default();
        assert!(table.score(&IndexMap::new()).abs() < f64::EPSILON);
    }
}
