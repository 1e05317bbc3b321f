use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Critique output. Confidence is an estimate in `[0, 1]`; no hard range is
/// enforced on deserialized values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// Winning variant id; empty when there was nothing to analyze.
    #[serde(default)]
    pub winner: String,
    /// Recommendation text.
    #[serde(default)]
    pub recommendation: String,
    /// Confidence estimate.
    #[serde(default)]
    pub confidence: f64,
    /// Trade-off notes.
    #[serde(default)]
    pub trade_offs: Vec<String>,
    /// Counterfactual insights.
    #[serde(default)]
    pub counterfactuals: Vec<String>,
    /// Metric snapshot of the winner.
    #[serde(default)]
    pub key_metrics: IndexMap<String, f64>,
}

impl Analysis {
    /// Fixed analysis for runs that produced zero results.
    #[must_use]
    pub fn nothing_to_analyze() -> Self {
        Self {
            winner: String::new(),
            recommendation: "No results to analyze".into(),
            confidence: 0.0,
            trade_offs: Vec::new(),
            counterfactuals: Vec::new(),
            key_metrics: IndexMap::new(),
        }
    }

    /// True when the deserialized document carries the expected shape.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.winner.is_empty() && !self.recommendation.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_run_analysis_has_zero_confidence() {
        let analysis = Analysis::nothing_to_analyze();
        assert!((analysis.confidence - 0.0).abs() < f64::EPSILON);
        assert!(analysis.trade_offs.is_empty());
        assert!(!analysis.is_well_formed());
    }

    #[test]
    fn lenient_deserialization_fills_defaults() {
        let analysis: Analysis =
            serde_json::from_str(r#"{"winner": "plan-1-v2", "recommendation": "use v2"}"#).unwrap();
        assert!(analysis.is_well_formed());
        assert!(analysis.counterfactuals.is_empty());
    }
}
