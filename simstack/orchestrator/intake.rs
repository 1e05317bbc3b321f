use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use simstack_critic::{CriticAnalyzer, ScoringTable};
use simstack_events::{EventHub, EventKind, EventSink, EventTap, StreamEvent};
use simstack_inference::HttpChatBackend;
use simstack_planner::{default_catalog, PlanGenerator};
use simstack_simulation::{HttpToolInvoker, ResultAggregator, SimulationDispatcher};
use simstack_telemetry::{MetricsHub, MetricsSnapshot, Telemetry};
use thiserror::Error;

use crate::{compose, config::EngineConfig, engine::OrchestrationEngine};

/// One orchestration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// High-level goal text.
    pub goal: String,
    /// Opaque constraints passed through to planning and critique.
    #[serde(default)]
    pub constraints: IndexMap<String, Value>,
}

impl RunRequest {
    /// Builds a request.
    #[must_use]
    pub fn new(goal: impl Into<String>, constraints: IndexMap<String, Value>) -> Self {
        Self {
            goal: goal.into(),
            constraints,
        }
    }
}

/// Export request: parameters to embed into the deployment descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Goal the export belongs to (informational).
    #[serde(default)]
    pub goal: String,
    /// Parameters embedded verbatim per service.
    #[serde(default)]
    pub parameters: IndexMap<String, Value>,
}

/// Immediate acknowledgement returned by `submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAck {
    /// Always `"started"`; results stream as events.
    pub status: String,
}

/// Intake-time rejections, the only errors surfaced synchronously.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Goal text was missing or blank.
    #[error("goal must not be empty")]
    EmptyGoal,
}

/// Front door for the transport layer: accepts runs, serves the metrics
/// query and the export, and hands out event subscriptions.
pub struct RunCoordinator {
    engine: Arc<OrchestrationEngine>,
    hub: Arc<EventHub>,
    metrics: MetricsHub,
    config: EngineConfig,
}

impl RunCoordinator {
    /// Wires the HTTP backends and engines from configuration.
    pub fn bootstrap(config: EngineConfig, telemetry: Option<Telemetry>) -> anyhow::Result<Self> {
        let chat = Arc::new(HttpChatBackend::new(
            &config.inference_api_base,
            config.inference_api_key.clone(),
        )?);
        let hub = Arc::new(EventHub::new(config.observer_queue));
        let events: Arc<dyn EventSink> = Arc::clone(&hub) as Arc<dyn EventSink>;
        let metrics = MetricsHub::new();
        let catalog = default_catalog();

        let planner = PlanGenerator::new(
            chat.clone(),
            config.model.clone(),
            config.planning_budget,
            config.requested_variants,
            catalog.clone(),
            telemetry.clone(),
        );
        let dispatcher = Arc::new(SimulationDispatcher::new(
            catalog,
            Arc::new(HttpToolInvoker::new()?),
            Arc::clone(&events),
            config.tool_budget,
            telemetry.clone(),
        ));
        let aggregator = ResultAggregator::new(
            dispatcher,
            Arc::clone(&events),
            config.variant_budget,
            config.variant_cap,
            telemetry.clone(),
        );
        let critic = CriticAnalyzer::new(
            chat,
            config.model.clone(),
            config.critic_budget,
            ScoringTable::default(),
            telemetry.clone(),
        );
        let engine = Arc::new(OrchestrationEngine::new(
            planner,
            aggregator,
            critic,
            events,
            metrics.clone(),
            telemetry,
        ));
        Ok(Self {
            engine,
            hub,
            metrics,
            config,
        })
    }

    /// Builds a coordinator around an already-assembled engine (tests).
    #[must_use]
    pub fn with_engine(
        engine: Arc<OrchestrationEngine>,
        hub: Arc<EventHub>,
        metrics: MetricsHub,
        config: EngineConfig,
    ) -> Self {
        Self {
            engine,
            hub,
            metrics,
            config,
        }
    }

    /// Accepts a run. Validation failures are reported synchronously; an
    /// accepted run is acknowledged immediately and proceeds detached, with
    /// any later failure reported as an `error` event.
    pub fn submit(&self, request: RunRequest) -> Result<RunAck, IntakeError> {
        if request.goal.trim().is_empty() {
            return Err(IntakeError::EmptyGoal);
        }
        let engine = Arc::clone(&self.engine);
        let hub = Arc::clone(&self.hub);
        let budget = self.config.run_budget;
        tokio::spawn(async move {
            let outcome = tokio::time::timeout(budget, engine.run(&request)).await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(_) => Some(format!("run budget of {budget:?} exhausted")),
            };
            if let Some(error) = failure {
                let _ = hub
                    .publish(StreamEvent::now(EventKind::Error, json!({ "error": error })))
                    .await;
            }
        });
        Ok(RunAck {
            status: "started".into(),
        })
    }

    /// Current process-wide metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::clone(&self.metrics.snapshot())
    }

    /// Registers an event observer with its own bounded queue.
    #[must_use]
    pub fn subscribe(&self) -> EventTap {
        self.hub.subscribe()
    }

    /// Renders the deployment descriptor for the given parameters.
    #[must_use]
    pub fn export(&self, request: &ExportRequest) -> compose::ComposeExport {
        compose::render_compose(&default_catalog(), &request.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use simstack_inference::{ChatBackend, ChatError, ChatOutcome, ChatRequest};
    use simstack_simulation::{ToolError, ToolInvoker};
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
            _parameters: &IndexMap<String, Value>,
        ) -> Result<IndexMap<String, f64>, ToolError> {
            Err(ToolError::Status {
                status: 502,
                body: "down".into(),
            })
        }
    }

    fn coordinator() -> RunCoordinator {
        let config = EngineConfig {
            planning_budget: Duration::from_millis(50),
            critic_budget: Duration::from_millis(50),
            variant_budget: Duration::from_secs(2),
            tool_budget: Duration::from_millis(200),
            run_budget: Duration::from_secs(10),
            ..EngineConfig::default()
        };
        let chat: Arc<dyn ChatBackend> = Arc::new(UnreachableChat);
        let hub = Arc::new(EventHub::new(config.observer_queue));
        let events: Arc<dyn EventSink> = Arc::clone(&hub) as Arc<dyn EventSink>;
        let metrics = MetricsHub::new();
        let catalog = default_catalog();
        let planner = PlanGenerator::new(
            Arc::clone(&chat),
            config.model.clone(),
            config.planning_budget,
            config.requested_variants,
            catalog.clone(),
            None,
        );
        let dispatcher = Arc::new(SimulationDispatcher::new(
            catalog,
            Arc::new(DeadFleet),
            Arc::clone(&events),
            config.tool_budget,
            None,
        ));
        let aggregator = ResultAggregator::new(
            dispatcher,
            Arc::clone(&events),
            config.variant_budget,
            config.variant_cap,
            None,
        );
        let critic = CriticAnalyzer::new(
            chat,
            config.model.clone(),
            config.critic_budget,
            ScoringTable::default(),
            None,
        );
        let engine = Arc::new(OrchestrationEngine::new(
            planner,
            aggregator,
            critic,
            events,
            metrics.clone(),
            None,
        ));
        RunCoordinator::with_engine(engine, hub, metrics, config)
    }

    #[tokio::test]
    async fn empty_goal_is_rejected_synchronously() {
        let coordinator = coordinator();
        let err = coordinator
            .submit(RunRequest::new("   ", IndexMap::new()))
            .unwrap_err();
        assert!(matches!(err, IntakeError::EmptyGoal));
    }

    #[tokio::test]
    async fn accepted_run_acks_and_streams_to_done() {
        let coordinator = coordinator();
        let mut tap = coordinator.subscribe();
        let ack = coordinator
            .submit(RunRequest::new("reduce wait time by 20%", IndexMap::new()))
            .unwrap();
        assert_eq!(ack.status, "started");

        let mut kinds = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(5), tap.recv()).await
        {
            let kind = event.kind;
            kinds.push(kind);
            if kind == EventKind::Done {
                break;
            }
        }
        assert_eq!(kinds.first(), Some(&EventKind::Plan));
        assert_eq!(kinds.last(), Some(&EventKind::Done));
        assert_eq!(
            kinds
                .iter()
                .filter(|kind| **kind == EventKind::SimComplete)
                .count(),
            16
        );
    }

    #[tokio::test]
    async fn export_embeds_parameters_for_each_service() {
        let coordinator = coordinator();
        let mut parameters = IndexMap::new();
        parameters.insert("staff".to_string(), json!(24));
        let export = coordinator.export(&ExportRequest {
            goal: "scale".into(),
            parameters,
        });
        assert_eq!(export.filename, "simstack-compose.yml");
        assert_eq!(export.yaml.matches("staff").count(), 3);
    }
}
