use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use simstack_planner::ToolSpec;

/// Rendered deployment descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeExport {
    /// Descriptor body.
    pub yaml: String,
    /// Suggested download filename.
    pub filename: String,
}

/// Renders a static multi-service compose descriptor, one service per
/// catalog tool, with the parameters embedded verbatim. Pure formatting; no
/// orchestration logic.
#[must_use]
pub fn render_compose(tools: &[ToolSpec], parameters: &IndexMap<String, Value>) -> ComposeExport {
    let params = serde_json::to_string(parameters).unwrap_or_else(|_| "{}".into());
    let mut yaml = String::from("version: '3.9'\nservices:\n");
    for tool in tools {
        let _ = writeln!(yaml, "  {}:", tool.name);
        let _ = writeln!(yaml, "    image: simstack/{}:latest", tool.name);
        yaml.push_str("    environment:\n");
        let _ = writeln!(yaml, "      - PARAMS={params}");
    }
    ComposeExport {
        yaml,
        filename: "simstack-compose.yml".into(),
    }
}
