use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::ToolSpec;

/// One concrete parameter assignment to be simulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Identifier, `{plan_id}-v{n}` with `n` 1-indexed.
    pub variant_id: String,
    /// Merged parameter map; keys overlap by field name across tools.
    pub parameters: IndexMap<String, Value>,
}

/// Output of the planning phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique id per run, namespace prefix for variant ids.
    pub plan_id: String,
    /// Ordered tool descriptors.
    pub tools: Vec<ToolSpec>,
    /// Variants to simulate, always at least one.
    pub variants: Vec<Variant>,
}

impl Plan {
    /// Derives the id for the `n`-th variant (1-indexed).
    #[must_use]
    pub fn variant_id(plan_id: &str, n: usize) -> String {
        format!("{plan_id}-v{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_ids_are_plan_scoped_and_one_indexed() {
        assert_eq!(Plan::variant_id("plan-7", 1), "plan-7-v1");
        assert_eq!(Plan::variant_id("plan-7", 16), "plan-7-v16");
    }
}
