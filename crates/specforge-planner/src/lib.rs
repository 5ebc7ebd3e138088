//! Decomposes a structured design into ordered generation batches.
//!
//! Every plan has exactly one core batch, one surface batch and one test batch
//! per endpoint group, the health check test batch, and one infra batch last.
//! Planning is a pure function of the design.

mod batch;
mod planner;
mod slice;

pub use batch::{ArtifactTarget, BatchKind, GenerationBatch};
pub use planner::{
    AUTH_MODULE, CONFTEST, ENTRY_POINT, HEALTH_BATCH, HEALTH_TEST, MANIFEST, endpoint_groups,
    group_test_path, plan_batches, router_module, router_path,
};
pub use slice::design_slice;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use specforge_design::StructuredDesign;

    fn arb_endpoint() -> impl Strategy<Value = serde_json::Value> {
        (
            prop::sample::select(vec!["GET", "POST", "PUT", "PATCH", "DELETE"]),
            prop::sample::select(vec![
                "/users",
                "/api/v1/products/{id}",
                "/orders",
                "/{code}",
                "/api",
                "/auth/login",
            ]),
            prop::option::of(prop::sample::select(vec!["Users", "billing", "2fa", "auth"])),
            prop::sample::select(vec!["none", "jwt", "api_key"]),
        )
            .prop_map(|(method, path, tag, auth)| {
                let tags: Vec<&str> = tag.into_iter().collect();
                serde_json::json!({"method": method, "path": path, "tags": tags, "auth": auth})
            })
    }

    fn arb_design() -> impl Strategy<Value = StructuredDesign> {
        prop::collection::vec(arb_endpoint(), 0..12).prop_map(|endpoints| {
            serde_json::from_value(serde_json::json!({
                "project_name": "prop",
                "endpoints": endpoints
            }))
            .unwrap()
        })
    }

    proptest! {
        #[test]
        fn prop_plan_is_deterministic(design in arb_design()) {
            prop_assert_eq!(plan_batches(&design), plan_batches(&design.clone()));
        }

        #[test]
        fn prop_batch_counts_follow_groups(design in arb_design()) {
            let n = endpoint_groups(&design).len();
            let batches = plan_batches(&design);
            let count = |kind| batches.iter().filter(|b| b.kind == kind).count();

            prop_assert_eq!(count(BatchKind::Core), 1);
            prop_assert_eq!(count(BatchKind::Surface), n);
            prop_assert_eq!(count(BatchKind::Tests), n + 1);
            prop_assert_eq!(count(BatchKind::Infra), 1);
            prop_assert_eq!(batches.first().map(|b| b.kind), Some(BatchKind::Core));
            prop_assert_eq!(batches.last().map(|b| b.kind), Some(BatchKind::Infra));

            let has_auth = batches.iter().any(|b| b.contains_path(AUTH_MODULE));
            prop_assert_eq!(has_auth, design.any_endpoint_requires_auth());
        }

        #[test]
        fn prop_paths_are_unique(design in arb_design()) {
            let batches = plan_batches(&design);
            let mut seen = std::collections::HashSet::new();
            for path in batches.iter().flat_map(GenerationBatch::paths) {
                prop_assert!(seen.insert(path.to_string()), "duplicate {}", path);
            }
        }
    }

    #[test]
    fn test_three_named_groups() {
        let design: StructuredDesign = serde_json::from_value(serde_json::json!({
            "project_name": "store",
            "endpoints": [
                {"method": "GET", "path": "/users", "tags": ["users"]},
                {"method": "GET", "path": "/products", "tags": ["products"]},
                {"method": "POST", "path": "/orders", "tags": ["orders"]}
            ]
        }))
        .unwrap();
        let batches = plan_batches(&design);
        let named = |kind| -> Vec<_> {
            batches
                .iter()
                .filter(|b| b.kind == kind && b.group.is_some())
                .map(|b| b.group.clone().unwrap())
                .collect()
        };
        assert_eq!(named(BatchKind::Surface), ["orders", "products", "users"]);
        assert_eq!(named(BatchKind::Tests), ["orders", "products", "users"]);
    }
}
