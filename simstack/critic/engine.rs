use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use simstack_inference::{extract_json_object, ChatBackend, ChatMessage, ChatRequest};
use simstack_simulation::SimulationResult;
use simstack_telemetry::{LogLevel, Telemetry};

use crate::{
    analysis::Analysis,
    heuristic::{rank, ScoringTable},
};

const SYSTEM_PROMPT: &str = r#"You are an expert operations analyst. Analyze simulation results and provide:
1. The best performing variant and why
2. Key trade-offs between cost, performance, and constraints
3. Counterfactual insights ("what if" scenarios)
4. Confidence level in the recommendation

Return concise, actionable JSON:
{
  "winner": "variant ID",
  "recommendation": "Clear recommendation with reasoning",
  "confidence": 0.0-1.0,
  "trade_offs": ["trade-off 1", "trade-off 2"],
  "counterfactuals": ["insight 1", "insight 2"],
  "key_metrics": {"metric": value}
}"#;

/// Ranks aggregated results. Never fails: inference problems degrade to the
/// deterministic heuristic.
pub struct CriticAnalyzer {
    chat: Arc<dyn ChatBackend>,
    model: String,
    budget: Duration,
    table: ScoringTable,
    telemetry: Option<Telemetry>,
}

impl CriticAnalyzer {
    /// Creates an analyzer with the given scoring table.
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        model: String,
        budget: Duration,
        table: ScoringTable,
        telemetry: Option<Telemetry>,
    ) -> Self {
        Self {
            chat,
            model,
            budget,
            table,
            telemetry,
        }
    }

    /// Produces an analysis over the aggregated results.
    pub async fn analyze(
        &self,
        goal: &str,
        constraints: &IndexMap<String, Value>,
        results: &[SimulationResult],
    ) -> Analysis {
        if results.is_empty() {
            return Analysis::nothing_to_analyze();
        }

        let request = ChatRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(format!(
                    "Goal: {goal}\nConstraints: {}\n\nSimulation Results:\n{}\n\
                     Analyze these results and recommend the best approach.",
                    serde_json::to_string(constraints).unwrap_or_else(|_| "{}".into()),
                    summarize(results)
                )),
            ],
            0.3,
        );

        match self.chat.chat(request, self.budget).await {
            Ok(completion) => self.interpret(&completion.content, results),
            Err(err) => {
                self.log_fallback(&format!("inference unavailable: {err}"));
                self.heuristic_analysis(results)
            }
        }
    }

    /// Maps the completion text onto an analysis: well-formed JSON is taken
    /// as-is, JSON of the wrong shape degrades to a raw-text recommendation,
    /// anything else falls back to the heuristic.
    fn interpret(&self, content: &str, results: &[SimulationResult]) -> Analysis {
        let document: Option<Value> = serde_json::from_str(content).ok().or_else(|| {
            extract_json_object(content).and_then(|slice| serde_json::from_str(slice).ok())
        });
        let Some(document) = document else {
            self.log_fallback("completion was not JSON");
            return self.heuristic_analysis(results);
        };
        if let Ok(analysis) = serde_json::from_value::<Analysis>(document) {
            if analysis.is_well_formed() {
                return analysis;
            }
        }
        if content.trim().is_empty() {
            return self.heuristic_analysis(results);
        }
        Analysis {
            winner: results[0].variant_id.clone(),
            recommendation: content.to_string(),
            confidence: 0.7,
            trade_offs: Vec::new(),
            counterfactuals: Vec::new(),
            key_metrics: results[0].metrics.clone(),
        }
    }

    fn heuristic_analysis(&self, results: &[SimulationResult]) -> Analysis {
        let Some((best_idx, best_score)) = rank(results, &self.table) else {
            return Analysis::nothing_to_analyze();
        };
        let winner = &results[best_idx];
        Analysis {
            winner: winner.variant_id.clone(),
            recommendation: format!(
                "Variant {} shows the best balance of metrics with overall score of {best_score:.2}",
                best_idx + 1
            ),
            confidence: 0.75,
            trade_offs: vec![
                "Higher service rates improve throughput but may increase costs".into(),
                "Optimal staffing balances wait times with budget constraints".into(),
                "Traffic density impacts overall system efficiency".into(),
            ],
            counterfactuals: vec![
                "Increasing staff by 20% could reduce wait times by 15-20%".into(),
                "Reducing arrival rate through scheduling could improve service quality".into(),
            ],
            key_metrics: winner.metrics.clone(),
        }
    }

    fn log_fallback(&self, reason: &str) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(
                LogLevel::Warn,
                "critic.fallback",
                serde_json::json!({ "reason": reason }),
            );
        }
    }
}

/// Renders the per-variant metric summary fed to the critique prompt.
fn summarize(results: &[SimulationResult]) -> String {
    let mut summary = String::new();
    for (i, result) in results.iter().enumerate() {
        let _ = writeln!(summary, "\nVariant {} ({}):", i + 1, result.variant_id);
        for (key, value) in &result.metrics {
            let _ = writeln!(summary, "  {key}: {value:.2}");
        }
    }
    summary
}
