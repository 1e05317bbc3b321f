use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use simstack_events::{EventKind, EventSink, StreamEvent};
use simstack_planner::Plan;
use simstack_telemetry::{LogLevel, Telemetry};
use tokio::{sync::Semaphore, task::JoinSet, time::timeout};

use crate::dispatcher::{SimulationDispatcher, SimulationResult};

/// Runs the dispatcher concurrently across all variants of a plan and
/// collects results as they complete.
///
/// Each variant task gets its own timeout scope rooted at spawn time: one
/// variant expiring can never cancel its siblings. The tasks still belong to
/// the calling run; dropping the `run_all` future aborts any still in
/// flight. Parallelism is bounded by a worker cap (default: the variant
/// count).
pub struct ResultAggregator {
    dispatcher: Arc<SimulationDispatcher>,
    events: Arc<dyn EventSink>,
    variant_budget: Duration,
    worker_cap: Option<usize>,
    telemetry: Option<Telemetry>,
}

impl ResultAggregator {
    /// Creates an aggregator over the given dispatcher.
    #[must_use]
    pub fn new(
        dispatcher: Arc<SimulationDispatcher>,
        events: Arc<dyn EventSink>,
        variant_budget: Duration,
        worker_cap: Option<usize>,
        telemetry: Option<Telemetry>,
    ) -> Self {
        Self {
            dispatcher,
            events,
            variant_budget,
            worker_cap,
            telemetry,
        }
    }

    /// Dispatches every variant and returns exactly one result per variant,
    /// in completion order.
    pub async fn run_all(&self, plan: &Plan) -> Vec<SimulationResult> {
        let permits = self.worker_cap.unwrap_or(plan.variants.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let results = Arc::new(Mutex::new(Vec::with_capacity(plan.variants.len())));
        let mut tasks = JoinSet::new();

        for variant in plan.variants.clone() {
            let dispatcher = Arc::clone(&self.dispatcher);
            let events = Arc::clone(&self.events);
            let results = Arc::clone(&results);
            let semaphore = Arc::clone(&semaphore);
            let budget = self.variant_budget;
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                let result = match timeout(budget, dispatcher.dispatch(&variant)).await {
                    Ok(result) => result,
                    Err(_) => {
                        // Budget expiry mid-dispatch: the variant still
                        // completes with an empty metric map, and its
                        // completion event is still emitted.
                        let result = SimulationResult::empty(&variant.variant_id);
                        let _ = events
                            .publish(StreamEvent::now(
                                EventKind::SimComplete,
                                serde_json::to_value(&result).unwrap_or_default(),
                            ))
                            .await;
                        result
                    }
                };
                results.lock().push(result);
            });
        }

        // Fork-join barrier before the critique phase.
        while tasks.join_next().await.is_some() {}

        let collected = Arc::try_unwrap(results)
            .map_or_else(|shared| shared.lock().clone(), Mutex::into_inner);
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(
                LogLevel::Info,
                "aggregate.complete",
                json!({ "plan_id": plan.plan_id, "results": collected.len() }),
            );
        }
        collected
    }
}
