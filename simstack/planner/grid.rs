use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::plan::{Plan, Variant};

const ARRIVAL_RATES: [f64; 4] = [8.0, 10.0, 12.0, 14.0];
const SERVICE_RATES: [f64; 4] = [16.0, 18.0, 20.0, 22.0];
const DENSITY_CEILING: f64 = 0.85;

/// Deterministic 4x4 fallback grid used when the inference service is
/// unavailable or returns nothing usable.
///
/// Every cell keeps `service_rate` strictly above `arrival_rate` so the
/// queueing metric stays stable, and derives correlated density and staffing
/// values per cell. Ids follow grid traversal order, 1-indexed.
#[must_use]
pub fn fallback_grid(plan_id: &str) -> Vec<Variant> {
    let mut variants = Vec::with_capacity(ARRIVAL_RATES.len() * SERVICE_RATES.len());
    let mut idx = 1;
    for (i, arrival) in ARRIVAL_RATES.iter().enumerate() {
        for (j, service) in SERVICE_RATES.iter().enumerate() {
            // Spread service rates into the 16-25 range while staying above
            // every arrival candidate.
            #[allow(clippy::cast_precision_loss)]
            let actual_service = service + j as f64;
            #[allow(clippy::cast_precision_loss)]
            let density = (0.1f64.mul_add(i as f64, 0.3) + 0.05 * j as f64).min(DENSITY_CEILING);
            let staff = 20 + i * 2 + j;
            let utilization = (arrival / actual_service * 100.0).round() / 100.0;

            let mut parameters: IndexMap<String, Value> = IndexMap::new();
            parameters.insert("arrival_rate".into(), json!(arrival));
            parameters.insert("service_rate".into(), json!(actual_service));
            parameters.insert("density".into(), json!(density));
            parameters.insert("staff".into(), json!(staff));
            parameters.insert("utilization".into(), json!(utilization));

            variants.push(Variant {
                variant_id: Plan::variant_id(plan_id, idx),
                parameters,
            });
            idx += 1;
        }
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(variant: &Variant, key: &str) -> f64 {
        variant.parameters[key].as_f64().unwrap()
    }

    #[test]
    fn grid_is_deterministic() {
        let first = fallback_grid("plan-a");
        let second = fallback_grid("plan-a");
        assert_eq!(first.len(), 16);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.variant_id, b.variant_id);
            assert_eq!(a.parameters, b.parameters);
        }
    }

    #[test]
    fn service_rate_strictly_exceeds_arrival_rate() {
        for variant in fallback_grid("plan-a") {
            assert!(number(&variant, "service_rate") > number(&variant, "arrival_rate"));
        }
    }

    #[test]
    fn density_never_exceeds_ceiling() {
        for variant in fallback_grid("plan-a") {
            assert!(number(&variant, "density") <= DENSITY_CEILING);
        }
    }

    #[test]
    fn ids_follow_traversal_order() {
        let variants = fallback_grid("plan-a");
        assert_eq!(variants[0].variant_id, "plan-a-v1");
        assert_eq!(variants[15].variant_id, "plan-a-v16");
    }
}
