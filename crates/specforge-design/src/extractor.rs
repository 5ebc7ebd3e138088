//! Spec text in, validated design out.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use specforge_llm::ProviderGateway;

use crate::error::ExtractionFailure;
use crate::model::StructuredDesign;
use crate::prompts::{ARCHITECT_SYSTEM_PROMPT, architect_user_prompt};

const PREVIEW_CHARS: usize = 200;

/// Turns a spec document into a [`StructuredDesign`].
#[async_trait]
pub trait DesignExtractor: Send + Sync {
    async fn extract(&self, spec_text: &str) -> Result<StructuredDesign, ExtractionFailure>;
}

/// Extractor that asks the provider for the design as JSON.
///
/// One provider call, no retry.
pub struct LlmDesignExtractor {
    gateway: Arc<dyn ProviderGateway>,
}

impl LlmDesignExtractor {
    #[must_use]
    pub fn new(gateway: Arc<dyn ProviderGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl DesignExtractor for LlmDesignExtractor {
    async fn extract(&self, spec_text: &str) -> Result<StructuredDesign, ExtractionFailure> {
        if spec_text.trim().is_empty() {
            return Err(ExtractionFailure::EmptySpec);
        }

        debug!(spec_chars = spec_text.len(), "Requesting design");
        let response = self
            .gateway
            .complete(ARCHITECT_SYSTEM_PROMPT, &architect_user_prompt(spec_text))
            .await
            .map_err(ExtractionFailure::Provider)?;

        let design = parse_design_response(&response)?;
        info!(
            project = %design.project_name,
            endpoints = design.endpoints.len(),
            models = design.database_models.len(),
            dependencies = design.dependencies.len(),
            "Design extracted"
        );
        Ok(design)
    }
}

/// Parse and validate a provider reply.
///
/// Code fences are stripped; when the reply is not pure JSON, the span from
/// the first `{` to the last `}` is tried.
pub fn parse_design_response(response: &str) -> Result<StructuredDesign, ExtractionFailure> {
    let text = strip_code_fences(response.trim());

    let parsed = StructuredDesign::from_json_str(text).or_else(|first_err| {
        match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if end > start => {
                StructuredDesign::from_json_str(&text[start..=end])
            }
            _ => Err(first_err),
        }
    });

    let design = parsed.map_err(|e| {
        warn!(error = %e, "Design response did not parse");
        ExtractionFailure::Unparseable {
            reason: e.to_string(),
            preview: text.chars().take(PREVIEW_CHARS).collect(),
        }
    })?;

    design
        .validate()
        .map_err(|problems| ExtractionFailure::Malformed { problems })?;
    Ok(design)
}

fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use specforge_llm::{LlmError, ScriptedGateway};

    const DESIGN_JSON: &str = r#"{
        "project_name": "url-shortener",
        "description": "Shortens URLs",
        "dependencies": ["fastapi", "uvicorn", "sqlmodel"],
        "endpoints": [
            {"method": "GET", "path": "/health", "tags": ["health"]},
            {"method": "POST", "path": "/api/links", "tags": ["links"], "auth": "jwt"}
        ],
        "database_models": [{"name": "Link", "table_name": "links"}]
    }"#;

    fn extractor(responses: Vec<Result<String, LlmError>>) -> (LlmDesignExtractor, Arc<ScriptedGateway>) {
        let gateway = Arc::new(ScriptedGateway::new(responses));
        (LlmDesignExtractor::new(gateway.clone()), gateway)
    }

    #[tokio::test]
    async fn test_extracts_plain_json() {
        let (ex, gateway) = extractor(vec![Ok(DESIGN_JSON.to_string())]);
        let design = ex.extract("# URL shortener").await.unwrap();
        assert_eq!(design.project_name, "url-shortener");
        assert!(design.any_endpoint_requires_auth());

        let prompts = gateway.prompts();
        assert!(prompts[0].1.contains("# URL shortener"));
        assert!(prompts[0].1.contains("\"project_name\""));
    }

    #[tokio::test]
    async fn test_empty_spec_makes_no_provider_call() {
        let (ex, gateway) = extractor(vec![]);
        assert!(matches!(ex.extract("  \n").await, Err(ExtractionFailure::EmptySpec)));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_is_wrapped() {
        let (ex, _) = extractor(vec![Err(LlmError::EmptyResponse)]);
        assert!(matches!(
            ex.extract("spec").await,
            Err(ExtractionFailure::Provider(LlmError::EmptyResponse))
        ));
    }

    #[test]
    fn test_fenced_and_prose_wrapped_responses() {
        let fenced = format!("```json\n{DESIGN_JSON}\n```");
        assert!(parse_design_response(&fenced).is_ok());

        let prose = format!("Here is the design:\n{DESIGN_JSON}\nLet me know!");
        assert!(parse_design_response(&prose).is_ok());
    }

    #[test]
    fn test_garbage_is_unparseable() {
        match parse_design_response("I cannot help with that.") {
            Err(ExtractionFailure::Unparseable { preview, .. }) => {
                assert!(preview.starts_with("I cannot"));
            }
            other => panic!("expected Unparseable, got {other:?}"),
        }
    }

    #[test]
    fn test_non_conforming_record_is_malformed() {
        let bad = r#"{"project_name": "x", "endpoints": [{"method": "GET", "path": "nope"}]}"#;
        assert!(matches!(
            parse_design_response(bad),
            Err(ExtractionFailure::Malformed { .. })
        ));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("{}"), "{}");
    }
}
