use serde_json::{Value, json};

use specforge_design::StructuredDesign;

use crate::batch::{BatchKind, GenerationBatch};

/// The part of the full design a batch needs in its prompt.
///
/// Core batches see the whole design. Surface and per-group test batches see
/// only their group's endpoints. Infra sees dependencies, env and deployment.
#[must_use]
pub fn design_slice(design: &StructuredDesign, batch: &GenerationBatch) -> Value {
    match (batch.kind, batch.group.as_deref()) {
        (BatchKind::Core, _) => serde_json::to_value(design).unwrap_or(Value::Null),
        (BatchKind::Surface | BatchKind::Tests, Some(group)) => {
            let endpoints: Vec<_> = design
                .endpoints
                .iter()
                .filter(|e| e.group_or_default() == group)
                .collect();
            json!({
                "project_name": design.project_name,
                "dependencies": dependency_names(design),
                "endpoints": endpoints,
                "database_models": design.database_models,
                "middlewares": design.middlewares,
            })
        }
        (BatchKind::Surface | BatchKind::Tests, None) => json!({
            "project_name": design.project_name,
            "dependencies": dependency_names(design),
            "auth_required": design.any_endpoint_requires_auth(),
            "database_models": design.database_models,
            "endpoints": design
                .endpoints
                .iter()
                .map(|e| format!("{} {}", e.method, e.path))
                .collect::<Vec<_>>(),
        }),
        (BatchKind::Infra, _) => json!({
            "project_name": design.project_name,
            "description": design.description,
            "python_version": design.python_version,
            "dependencies": design.dependencies,
            "env_variables": design.env_variables,
            "deployment": design.deployment,
            "endpoints": design
                .endpoints
                .iter()
                .map(|e| format!("{} {}", e.method, e.path))
                .collect::<Vec<_>>(),
        }),
    }
}

fn dependency_names(design: &StructuredDesign) -> Vec<&str> {
    design.dependencies.iter().map(|d| d.name.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan_batches;

    fn design() -> StructuredDesign {
        serde_json::from_value(json!({
            "project_name": "shop",
            "dependencies": ["fastapi"],
            "endpoints": [
                {"method": "GET", "path": "/users", "tags": ["users"]},
                {"method": "GET", "path": "/orders", "tags": ["orders"]}
            ],
            "env_variables": [{"name": "DATABASE_URL"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_surface_slice_only_has_its_group() {
        let d = design();
        let batches = plan_batches(&d);
        let users = batches.iter().find(|b| b.name == "surface:users").unwrap();
        let slice = design_slice(&d, users);
        let endpoints = slice["endpoints"].as_array().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0]["path"], "/users");
        assert!(slice.get("env_variables").is_none());
    }

    #[test]
    fn test_infra_slice_has_env_and_deployment() {
        let d = design();
        let batches = plan_batches(&d);
        let infra = batches.last().unwrap();
        let slice = design_slice(&d, infra);
        assert_eq!(slice["env_variables"][0]["name"], "DATABASE_URL");
        assert_eq!(slice["deployment"]["port"], 8000);
    }

    #[test]
    fn test_core_slice_is_full_design() {
        let d = design();
        let slice = design_slice(&d, &plan_batches(&d)[0]);
        assert_eq!(slice, serde_json::to_value(&d).unwrap());
    }
}
