use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde_json::{json, Value};
use simstack_critic::CriticAnalyzer;
use simstack_events::{EventKind, EventSink, StreamEvent};
use simstack_planner::PlanGenerator;
use simstack_simulation::ResultAggregator;
use simstack_telemetry::{LogLevel, MetricsHub, MetricsSnapshot, Telemetry};

use crate::intake::RunRequest;

/// Sequences one run: plan, dispatch, critique, with lifecycle events and a
/// metrics snapshot published per phase.
pub struct OrchestrationEngine {
    planner: PlanGenerator,
    aggregator: ResultAggregator,
    critic: CriticAnalyzer,
    events: Arc<dyn EventSink>,
    metrics: MetricsHub,
    telemetry: Option<Telemetry>,
}

impl OrchestrationEngine {
    /// Creates an engine from its phase components.
    #[must_use]
    pub fn new(
        planner: PlanGenerator,
        aggregator: ResultAggregator,
        critic: CriticAnalyzer,
        events: Arc<dyn EventSink>,
        metrics: MetricsHub,
        telemetry: Option<Telemetry>,
    ) -> Self {
        Self {
            planner,
            aggregator,
            critic,
            events,
            metrics,
            telemetry,
        }
    }

    /// Hub the engine publishes snapshots to.
    #[must_use]
    pub const fn metrics(&self) -> &MetricsHub {
        &self.metrics
    }

    /// Executes one run end to end. Inference and simulator failures are
    /// absorbed by the phase fallbacks; an error here is a local failure the
    /// intake layer turns into an `error` event.
    pub async fn run(&self, request: &RunRequest) -> Result<()> {
        let mut snapshot = MetricsSnapshot::clone(&self.metrics.snapshot());

        let planning_started = Instant::now();
        let outcome = self
            .planner
            .plan(&request.goal, &request.constraints)
            .await;
        snapshot.planner_ms = millis_since(planning_started);
        if let Some(tokens_per_second) = outcome.tokens_per_second {
            snapshot.tokens_per_second = tokens_per_second;
        }
        self.metrics.publish(snapshot.clone());

        let plan = outcome.plan;
        self.emit(EventKind::Plan, serde_json::to_value(&plan)?).await;
        self.log(
            "run.planned",
            json!({ "plan_id": plan.plan_id, "variants": plan.variants.len() }),
        );

        let dispatch_started = Instant::now();
        let results = self.aggregator.run_all(&plan).await;
        snapshot.simulation_ms = millis_since(dispatch_started);
        self.metrics.publish(snapshot);

        let analysis = self
            .critic
            .analyze(&request.goal, &request.constraints, &results)
            .await;
        self.emit(EventKind::Analysis, serde_json::to_value(&analysis)?)
            .await;

        self.emit(EventKind::Done, json!({ "plan_id": plan.plan_id }))
            .await;
        self.log(
            "run.done",
            json!({ "plan_id": plan.plan_id, "winner": analysis.winner }),
        );
        Ok(())
    }

    async fn emit(&self, kind: EventKind, payload: Value) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(
                LogLevel::Debug,
                "event.published",
                json!({ "event": kind.label() }),
            );
        }
        let _ = self.events.publish(StreamEvent::now(kind, payload)).await;
    }

    fn log(&self, message: &str, fields: Value) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(LogLevel::Info, message, fields);
        }
    }
}

fn millis_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use simstack_critic::ScoringTable;
    use simstack_events::CollectorSink;
    use simstack_inference::{ChatBackend, ChatError, ChatOutcome, ChatRequest};
    use simstack_planner::default_catalog;
    use simstack_simulation::{SimulationDispatcher, ToolError, ToolInvoker};
    use std::time::Duration;

    struct UnreachableChat;

    #[async_trait]
    impl ChatBackend for UnreachableChat {
        async fn chat(
            &self,
            _request: ChatRequest,
            budget: Duration,
        ) -> Result<ChatOutcome, ChatError> {
            Err(ChatError::Timeout(budget))
        }
    }

    struct DeadFleet;

    #[async_trait]
    impl ToolInvoker for DeadFleet {
        async fn simulate(
            &self,
            _base_url: &str,
            _parameters: &indexmap::IndexMap<String, Value>,
        ) -> Result<indexmap::IndexMap<String, f64>, ToolError> {
            Err(ToolError::Status {
                status: 502,
                body: "down".into(),
            })
        }
    }

    fn engine(events: Arc<CollectorSink>) -> OrchestrationEngine {
        let chat: Arc<dyn ChatBackend> = Arc::new(UnreachableChat);
        let catalog = default_catalog();
        let planner = PlanGenerator::new(
            Arc::clone(&chat),
            "llama3.1-8b".into(),
            Duration::from_millis(50),
            3,
            catalog.clone(),
            None,
        );
        let dispatcher = Arc::new(SimulationDispatcher::new(
            catalog,
            Arc::new(DeadFleet),
            Arc::clone(&events) as Arc<dyn EventSink>,
            Duration::from_millis(200),
            None,
        ));
        let aggregator = ResultAggregator::new(
            dispatcher,
            Arc::clone(&events) as Arc<dyn EventSink>,
            Duration::from_secs(2),
            None,
            None,
        );
        let critic = CriticAnalyzer::new(
            chat,
            "llama3.1-8b".into(),
            Duration::from_millis(50),
            ScoringTable::default(),
            None,
        );
        OrchestrationEngine::new(
            planner,
            aggregator,
            critic,
            events,
            MetricsHub::new(),
            None,
        )
    }

    #[tokio::test]
    async fn offline_run_emits_the_full_lifecycle() {
        let events = Arc::new(CollectorSink::new());
        let engine = engine(Arc::clone(&events));
        let request = RunRequest::new("reduce wait time by 20%", IndexMap::new());
        engine.run(&request).await.unwrap();

        let emitted = events.snapshot();
        // plan + 16 starts + 16 completes + analysis + done
        assert_eq!(emitted.len(), 35);
        assert_eq!(emitted[0].kind, EventKind::Plan);
        assert_eq!(emitted[emitted.len() - 2].kind, EventKind::Analysis);
        assert_eq!(emitted[emitted.len() - 1].kind, EventKind::Done);

        let starts = emitted
            .iter()
            .filter(|event| event.kind == EventKind::SimStart)
            .count();
        let completes = emitted
            .iter()
            .filter(|event| event.kind == EventKind::SimComplete)
            .count();
        assert_eq!(starts, 16);
        assert_eq!(completes, 16);

        // Every sim event sits between plan and analysis.
        let analysis_at = emitted
            .iter()
            .position(|event| event.kind == EventKind::Analysis)
            .unwrap();
        for (idx, event) in emitted.iter().enumerate() {
            if matches!(event.kind, EventKind::SimStart | EventKind::SimComplete) {
                assert!(idx > 0 && idx < analysis_at);
            }
        }

        // Per-variant ordering: start before complete.
        let plan_payload = &emitted[0].payload;
        for variant in plan_payload["variants"].as_array().unwrap() {
            let id = variant["variant_id"].as_str().unwrap();
            let start = emitted
                .iter()
                .position(|event| {
                    event.kind == EventKind::SimStart && event.payload["variant_id"] == id
                })
                .unwrap();
            let complete = emitted
                .iter()
                .position(|event| {
                    event.kind == EventKind::SimComplete && event.payload["variant_id"] == id
                })
                .unwrap();
            assert!(start < complete);
        }
    }

    #[tokio::test]
    async fn run_publishes_phase_latencies() {
        let events = Arc::new(CollectorSink::new());
        let engine = engine(Arc::clone(&events));
        let request = RunRequest::new("goal", IndexMap::new());
        engine.run(&request).await.unwrap();
        let snapshot = engine.metrics().snapshot();
        // Offline run keeps throughput at its prior (zero) value.
        assert!(snapshot.tokens_per_second.abs() < f64::EPSILON);
    }
}
