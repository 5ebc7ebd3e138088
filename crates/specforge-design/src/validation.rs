use std::collections::HashSet;

use crate::grouping::normalize_group_key;
use crate::model::StructuredDesign;

impl StructuredDesign {
    /// Detect malformation. Every problem is reported, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.project_name.trim().is_empty() {
            problems.push("project_name must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for model in &self.database_models {
            if model.name.trim().is_empty() {
                problems.push("database model with an empty name".to_string());
            } else if !seen.insert(model.name.as_str()) {
                problems.push(format!("duplicate model name '{}'", model.name));
            }
        }

        for (i, endpoint) in self.endpoints.iter().enumerate() {
            let label = format!("endpoint #{} ({} {})", i + 1, endpoint.method, endpoint.path);

            if !endpoint.path.starts_with('/') {
                problems.push(format!("{label}: path must start with '/'"));
            }
            if !endpoint.method.is_known() {
                problems.push(format!(
                    "{label}: method must be one of GET, POST, PUT, PATCH, DELETE"
                ));
            }
            // A tag is an explicit grouping request; it must yield a key.
            if !endpoint.tags.is_empty()
                && endpoint.tags.iter().all(|t| normalize_group_key(t).is_none())
            {
                problems.push(format!("{label}: tags {:?} yield no grouping key", endpoint.tags));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn design(value: serde_json::Value) -> StructuredDesign {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_design() {
        let d = design(json!({
            "project_name": "shop",
            "endpoints": [
                {"method": "GET", "path": "/products", "tags": ["products"]},
                {"method": "GET", "path": "/{code}"}
            ],
            "database_models": [{"name": "Product"}, {"name": "Order"}]
        }));
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_all_problems_reported() {
        let d = design(json!({
            "project_name": " ",
            "endpoints": [
                {"method": "FETCH", "path": "products"},
                {"method": "GET", "path": "/x", "tags": ["???"]}
            ],
            "database_models": [{"name": "Product"}, {"name": "Product"}]
        }));
        let problems = d.validate().unwrap_err();
        assert_eq!(problems.len(), 5, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("duplicate model name 'Product'")));
        assert!(problems.iter().any(|p| p.contains("path must start with '/'")));
        assert!(problems.iter().any(|p| p.contains("no grouping key")));
    }
}
