use std::env;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Descriptor for one independently deployed simulation tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Short tool name, also the metric-key prefix.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Human readable description.
    pub description: String,
    /// Service base URL (`POST {base_url}/simulate`).
    pub base_url: String,
    /// Static allowlist of parameter fields this tool consumes.
    pub fields: Vec<String>,
    /// Field name to type-hint map advertised to the planner prompt.
    pub input_schema: IndexMap<String, String>,
}

impl ToolSpec {
    fn new(
        name: &str,
        title: &str,
        description: &str,
        base_url: String,
        schema: &[(&str, &str)],
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            description: description.into(),
            base_url,
            fields: schema.iter().map(|(field, _)| (*field).into()).collect(),
            input_schema: schema
                .iter()
                .map(|(field, kind)| ((*field).into(), (*kind).into()))
                .collect(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

/// Returns the fixed simulator fleet, with endpoints resolved from the
/// environment.
#[must_use]
pub fn default_catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "queue",
            "Queue",
            "Queueing simulation",
            env_or("QUEUE_SIMULATOR_URL", "http://localhost:8101"),
            &[("arrival_rate", "number"), ("service_rate", "number")],
        ),
        ToolSpec::new(
            "traffic",
            "Traffic",
            "Traffic flow simulation",
            env_or("TRAFFIC_SIMULATOR_URL", "http://localhost:8102"),
            &[("density", "number"), ("signal_timing", "number")],
        ),
        ToolSpec::new(
            "resource",
            "Resource",
            "Resource allocation",
            env_or("RESOURCE_SIMULATOR_URL", "http://localhost:8103"),
            &[("staff", "number"), ("shifts", "array")],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_three_tools_with_allowlists() {
        let catalog = default_catalog();
        assert_eq!(catalog.len(), 3);
        let queue = &catalog[0];
        assert_eq!(queue.name, "queue");
        assert_eq!(queue.fields, vec!["arrival_rate", "service_rate"]);
        assert_eq!(queue.input_schema.get("arrival_rate").unwrap(), "number");
    }
}
