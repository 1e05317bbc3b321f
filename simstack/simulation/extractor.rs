use indexmap::IndexMap;
use serde_json::Value;

/// Returns the subset of `parameters` named by `allowlist`, preserving the
/// allowlist order. Fields absent from the input contribute nothing; an
/// entirely absent allowlist yields an empty map, which callers treat as
/// "skip this tool".
#[must_use]
pub fn extract_tool_params(
    parameters: &IndexMap<String, Value>,
    allowlist: &[String],
) -> IndexMap<String, Value> {
    allowlist
        .iter()
        .filter_map(|field| {
            parameters
                .get(field)
                .map(|value| (field.clone(), value.clone()))
        })
        .collect()
}
