use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use simstack_inference::{extract_json_object, ChatBackend, ChatMessage, ChatRequest};
use simstack_telemetry::{LogLevel, Telemetry};

use crate::{
    catalog::ToolSpec,
    grid::fallback_grid,
    plan::{Plan, Variant},
};

/// Result of one planning attempt.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// The plan, always usable.
    pub plan: Plan,
    /// Observed inference throughput, when the backend reported token usage
    /// and the call took measurable time.
    pub tokens_per_second: Option<f64>,
}

/// Turns a goal plus constraints into a plan, falling back to the
/// deterministic grid whenever the inference service is unusable.
pub struct PlanGenerator {
    chat: Arc<dyn ChatBackend>,
    model: String,
    budget: Duration,
    requested_variants: usize,
    catalog: Vec<ToolSpec>,
    telemetry: Option<Telemetry>,
}

#[derive(Debug, Deserialize)]
struct ParsedVariants {
    #[serde(default)]
    variants: Vec<IndexMap<String, IndexMap<String, Value>>>,
}

impl PlanGenerator {
    /// Creates a generator over the given tool catalog.
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        model: String,
        budget: Duration,
        requested_variants: usize,
        catalog: Vec<ToolSpec>,
        telemetry: Option<Telemetry>,
    ) -> Self {
        Self {
            chat,
            model,
            budget,
            requested_variants,
            catalog,
            telemetry,
        }
    }

    /// Produces a plan. Never fails: planning errors degrade to the fallback
    /// grid.
    pub async fn plan(&self, goal: &str, constraints: &IndexMap<String, Value>) -> PlanOutcome {
        let plan_id = next_plan_id();
        let request = ChatRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(self.system_prompt()),
                ChatMessage::user(format!(
                    "Goal: {goal}. Constraints: {}. Create {} test variants.",
                    serde_json::to_string(constraints).unwrap_or_else(|_| "{}".into()),
                    self.requested_variants
                )),
            ],
            0.7,
        );

        let started = Instant::now();
        let outcome = self.chat.chat(request, self.budget).await;
        let elapsed = started.elapsed();

        let (variants, tokens_per_second) = match outcome {
            Ok(completion) => {
                let throughput = completion.total_tokens.and_then(|total| {
                    let secs = elapsed.as_secs_f64();
                    if secs > 0.0 {
                        #[allow(clippy::cast_precision_loss)]
                        let rate = total as f64 / secs;
                        Some(rate)
                    } else {
                        None
                    }
                });
                let parsed = parse_variants(&completion.content, &plan_id);
                if parsed.is_empty() {
                    self.log_fallback("planner returned no parseable variants");
                    (fallback_grid(&plan_id), throughput)
                } else {
                    (parsed, throughput)
                }
            }
            Err(err) => {
                self.log_fallback(&format!("inference unavailable: {err}"));
                (fallback_grid(&plan_id), None)
            }
        };

        PlanOutcome {
            plan: Plan {
                plan_id,
                tools: self.catalog.clone(),
                variants,
            },
            tokens_per_second,
        }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::from(
            "You are a simulation planning AI. Given a goal, create variant \
             parameter sets to test different scenarios.\n\nAvailable simulators:\n",
        );
        for (idx, tool) in self.catalog.iter().enumerate() {
            let schema = tool
                .input_schema
                .iter()
                .map(|(field, kind)| format!("{field} ({kind})"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(prompt, "{}. {}_simulator: {schema}", idx + 1, tool.name);
        }
        prompt.push_str(
            "\nReturn ONLY valid JSON with this structure:\n\
             {\"variants\": [{\"queue\": {\"arrival_rate\": 10, \"service_rate\": 12}, \
             \"traffic\": {\"density\": 0.5}, \"resource\": {\"staff\": 20}}]}",
        );
        prompt
    }

    fn log_fallback(&self, reason: &str) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(
                LogLevel::Warn,
                "planner.fallback",
                serde_json::json!({ "reason": reason }),
            );
        }
    }
}

fn next_plan_id() -> String {
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_millis());
    format!("plan-{nanos}")
}

/// Parses `{"variants": [...]}` out of model output; entries are maps of
/// tool name to parameter map, merged flat per variant.
fn parse_variants(content: &str, plan_id: &str) -> Vec<Variant> {
    let parsed: Option<ParsedVariants> = serde_json::from_str(content).ok().or_else(|| {
        extract_json_object(content).and_then(|slice| serde_json::from_str(slice).ok())
    });
    let Some(parsed) = parsed else {
        return Vec::new();
    };
    parsed
        .variants
        .into_iter()
        .enumerate()
        .map(|(i, grouped)| {
            let mut merged: IndexMap<String, Value> = IndexMap::new();
            for (_tool, params) in grouped {
                for (key, value) in params {
                    merged.insert(key, value);
                }
            }
            Variant {
                variant_id: Plan::variant_id(plan_id, i + 1),
                parameters: merged,
            }
        })
        .collect()
}
