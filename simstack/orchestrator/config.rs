use std::env;
use std::time::Duration;

/// Tunables for one orchestration deployment, resolved once at bootstrap.
///
/// The four timeout scopes are deliberately independent: the run budget is
/// not the parent of the variant budget, so one variant expiring cannot
/// cascade into its siblings or the critique phase.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model id sent to the inference service.
    pub model: String,
    /// Inference API base URL.
    pub inference_api_base: String,
    /// Optional bearer token for the inference service.
    pub inference_api_key: Option<String>,
    /// Budget for the planning chat call.
    pub planning_budget: Duration,
    /// Budget for the critique chat call.
    pub critic_budget: Duration,
    /// Budget for one variant's full dispatch.
    pub variant_budget: Duration,
    /// Budget for one tool call, nested inside the variant budget.
    pub tool_budget: Duration,
    /// Budget for the whole detached run.
    pub run_budget: Duration,
    /// Variant count requested from the planner.
    pub requested_variants: usize,
    /// Cap on concurrently in-flight variants; `None` sizes the pool by
    /// variant count.
    pub variant_cap: Option<usize>,
    /// Per-observer event queue capacity.
    pub observer_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1-8b".into(),
            inference_api_base: "http://127.0.0.1:9000/v1".into(),
            inference_api_key: None,
            planning_budget: Duration::from_secs(90),
            critic_budget: Duration::from_secs(60),
            variant_budget: Duration::from_secs(180),
            tool_budget: Duration::from_secs(45),
            run_budget: Duration::from_secs(600),
            requested_variants: 3,
            variant_cap: None,
            observer_queue: 256,
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .map_or(default, Duration::from_secs)
}

impl EngineConfig {
    /// Resolves configuration from the environment, falling back to the
    /// defaults above.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model: env::var("SIMSTACK_MODEL").unwrap_or(defaults.model),
            inference_api_base: env::var("INFERENCE_API_BASE")
                .unwrap_or(defaults.inference_api_base),
            inference_api_key: env::var("INFERENCE_API_KEY").ok(),
            planning_budget: env_secs("SIMSTACK_PLANNING_BUDGET_SECS", defaults.planning_budget),
            critic_budget: env_secs("SIMSTACK_CRITIC_BUDGET_SECS", defaults.critic_budget),
            variant_budget: env_secs("SIMSTACK_VARIANT_BUDGET_SECS", defaults.variant_budget),
            tool_budget: env_secs("SIMSTACK_TOOL_BUDGET_SECS", defaults.tool_budget),
            run_budget: env_secs("SIMSTACK_RUN_BUDGET_SECS", defaults.run_budget),
            requested_variants: env::var("SIMSTACK_REQUESTED_VARIANTS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.requested_variants),
            variant_cap: env::var("SIMSTACK_VARIANT_CAP")
                .ok()
                .and_then(|raw| raw.parse().ok()),
            observer_queue: env::var("SIMSTACK_OBSERVER_QUEUE")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.observer_queue),
        }
    }
}
