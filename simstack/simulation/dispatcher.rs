use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use simstack_events::{EventKind, EventSink, StreamEvent};
use simstack_planner::{ToolSpec, Variant};
use simstack_telemetry::{LogLevel, Telemetry};
use tokio::time::timeout;

use crate::{
    extractor::extract_tool_params,
    invoker::{ToolError, ToolInvoker},
};

/// Outcome of dispatching one variant across the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Variant this result belongs to.
    pub variant_id: String,
    /// Merged metrics under `{tool}_{metric}` keys. A failed or skipped tool
    /// contributes no keys.
    pub metrics: IndexMap<String, f64>,
    /// Optional artifact references.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub artifacts: IndexMap<String, String>,
}

impl SimulationResult {
    /// Result with no metrics, used when every tool call failed or the
    /// variant budget expired.
    #[must_use]
    pub fn empty(variant_id: impl Into<String>) -> Self {
        Self {
            variant_id: variant_id.into(),
            metrics: IndexMap::new(),
            artifacts: IndexMap::new(),
        }
    }
}

/// Dispatches one variant against every configured simulation tool in
/// parallel, tolerating per-tool failures.
pub struct SimulationDispatcher {
    tools: Vec<ToolSpec>,
    invoker: Arc<dyn ToolInvoker>,
    events: Arc<dyn EventSink>,
    tool_budget: Duration,
    telemetry: Option<Telemetry>,
}

impl SimulationDispatcher {
    /// Creates a dispatcher over the given fleet.
    #[must_use]
    pub fn new(
        tools: Vec<ToolSpec>,
        invoker: Arc<dyn ToolInvoker>,
        events: Arc<dyn EventSink>,
        tool_budget: Duration,
        telemetry: Option<Telemetry>,
    ) -> Self {
        Self {
            tools,
            invoker,
            events,
            tool_budget,
            telemetry,
        }
    }

    /// Dispatches one variant. Never fails: a variant with zero successful
    /// tool calls still yields a result with an empty metric map.
    pub async fn dispatch(&self, variant: &Variant) -> SimulationResult {
        let _ = self
            .events
            .publish(StreamEvent::now(
                EventKind::SimStart,
                json!({ "variant_id": variant.variant_id }),
            ))
            .await;

        let calls = self.tools.iter().filter_map(|tool| {
            let subset = extract_tool_params(&variant.parameters, &tool.fields);
            if subset.is_empty() {
                return None;
            }
            Some(self.call_tool(tool, subset, &variant.variant_id))
        });

        let mut metrics: IndexMap<String, f64> = IndexMap::new();
        for tool_metrics in join_all(calls).await.into_iter().flatten() {
            metrics.extend(tool_metrics);
        }

        let result = SimulationResult {
            variant_id: variant.variant_id.clone(),
            metrics,
            artifacts: IndexMap::new(),
        };
        let _ = self
            .events
            .publish(StreamEvent::now(
                EventKind::SimComplete,
                serde_json::to_value(&result).unwrap_or_default(),
            ))
            .await;
        result
    }

    async fn call_tool(
        &self,
        tool: &ToolSpec,
        subset: IndexMap<String, serde_json::Value>,
        variant_id: &str,
    ) -> Option<IndexMap<String, f64>> {
        let outcome = timeout(
            self.tool_budget,
            self.invoker.simulate(&tool.base_url, &subset),
        )
        .await
        .map_or(Err(ToolError::Timeout(self.tool_budget)), |call| call);

        match outcome {
            Ok(raw) => Some(
                raw.into_iter()
                    .map(|(key, value)| (format!("{}_{key}", tool.name), value))
                    .collect(),
            ),
            Err(err) => {
                if let Some(telemetry) = &self.telemetry {
                    let _ = telemetry.log(
                        LogLevel::Warn,
                        "dispatch.tool_failed",
                        json!({
                            "tool": tool.name,
                            "variant_id": variant_id,
                            "error": err.to_string(),
                        }),
                    );
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use simstack_events::CollectorSink;
    use simstack_planner::default_catalog;

    struct FixedInvoker;

    #[async_trait]
    impl ToolInvoker for FixedInvoker {
        async fn simulate(
            &self,
            _base_url: &str,
            parameters: &IndexMap<String, Value>,
        ) -> Result<IndexMap<String, f64>, ToolError> {
            assert!(!parameters.is_empty());
            let mut metrics = IndexMap::new();
            metrics.insert("avg_wait_time".into(), 3.5);
            metrics.insert("throughput".into(), 11.0);
            Ok(metrics)
        }
    }

    struct FailingInvoker;

    #[async_trait]
    impl ToolInvoker for FailingInvoker {
        async fn simulate(
            &self,
            _base_url: &str,
            _parameters: &IndexMap<String, Value>,
        ) -> Result<IndexMap<String, f64>, ToolError> {
            Err(ToolError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    fn variant() -> Variant {
        let mut parameters = IndexMap::new();
        parameters.insert("arrival_rate".into(), serde_json::json!(10.0));
        parameters.insert("service_rate".into(), serde_json::json!(16.0));
        parameters.insert("density".into(), serde_json::json!(0.5));
        Variant {
            variant_id: "plan-t-v1".into(),
            parameters,
        }
    }

    fn dispatcher(invoker: Arc<dyn ToolInvoker>, events: Arc<CollectorSink>) -> SimulationDispatcher {
        SimulationDispatcher::new(
            default_catalog(),
            invoker,
            events,
            Duration::from_secs(1),
            None,
        )
    }

    #[tokio::test]
    async fn merges_metrics_under_tool_prefixes() {
        let events = Arc::new(CollectorSink::new());
        let dispatcher = dispatcher(Arc::new(FixedInvoker), Arc::clone(&events));
        let result = dispatcher.dispatch(&variant()).await;
        // queue and traffic have applicable fields; resource does not.
        assert!(result.metrics.contains_key("queue_avg_wait_time"));
        assert!(result.metrics.contains_key("traffic_avg_wait_time"));
        assert!(!result.metrics.keys().any(|key| key.starts_with("resource_")));
    }

    #[tokio::test]
    async fn all_tool_failures_still_complete_the_variant() {
        let events = Arc::new(CollectorSink::new());
        let dispatcher = dispatcher(Arc::new(FailingInvoker), Arc::clone(&events));
        let result = dispatcher.dispatch(&variant()).await;
        assert_eq!(result.variant_id, "plan-t-v1");
        assert!(result.metrics.is_empty());

        let emitted = events.snapshot();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].kind, EventKind::SimStart);
        assert_eq!(emitted[1].kind, EventKind::SimComplete);
    }

    #[tokio::test]
    async fn start_event_precedes_complete_event() {
        let events = Arc::new(CollectorSink::new());
        let dispatcher = dispatcher(Arc::new(FixedInvoker), Arc::clone(&events));
        dispatcher.dispatch(&variant()).await;
        let kinds: Vec<EventKind> = events.snapshot().iter().map(|event| event.kind).collect();
        assert_eq!(kinds, vec![EventKind::SimStart, EventKind::SimComplete]);
    }
}
