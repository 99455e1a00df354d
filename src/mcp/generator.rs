//! Seam to the generation collaborator.
//!
//! Prompting a language model and parsing its reply lives outside this crate.
//! The server only needs the generated artifact, delivered as a
//! `{success, result}` envelope.

use std::future::Future;

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::types::{GenerateBacklogRequest, GenerateFeatureRequest};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("No {what} supplied: pass the generated {what} in the '{argument}' argument")]
    Missing {
        what: &'static str,
        argument: &'static str,
    },

    #[error("Generation failed: {0}")]
    Failed(String),
}

/// Produces backlogs and features for the tools to materialize.
pub trait BacklogGenerator {
    fn generate_backlog(
        &self,
        request: &GenerateBacklogRequest,
    ) -> impl Future<Output = Result<Value, GenerationError>>;

    fn generate_feature(
        &self,
        request: &GenerateFeatureRequest,
    ) -> impl Future<Output = Result<Value, GenerationError>>;
}

/// Uses the artifact the caller already generated and passed in the tool
/// arguments.
#[derive(Debug, Clone, Default)]
pub struct SuppliedBacklog;

impl BacklogGenerator for SuppliedBacklog {
    async fn generate_backlog(
        &self,
        request: &GenerateBacklogRequest,
    ) -> Result<Value, GenerationError> {
        let supplied = request.backlog.clone().ok_or(GenerationError::Missing {
            what: "backlog",
            argument: "backlog",
        })?;
        let mut backlog = unwrap_envelope(supplied)?;

        if let Value::Object(obj) = &mut backlog {
            if !obj.contains_key("project") {
                let mut project = Map::new();
                project.insert("name".into(), json!(request.project_name));
                project.insert("description".into(), json!(request.project_description));
                obj.insert("project".into(), Value::Object(project));
            }
        }
        Ok(envelope(backlog))
    }

    async fn generate_feature(
        &self,
        request: &GenerateFeatureRequest,
    ) -> Result<Value, GenerationError> {
        let supplied = request.feature.clone().ok_or(GenerationError::Missing {
            what: "feature",
            argument: "feature",
        })?;
        let mut feature = unwrap_envelope(supplied)?;

        if let Value::Object(obj) = &mut feature {
            let missing = obj
                .get("description")
                .and_then(Value::as_str)
                .map_or(true, |d| d.trim().is_empty());
            if missing {
                obj.insert("description".into(), json!(request.feature_description));
            }
        }
        Ok(envelope(feature))
    }
}

fn unwrap_envelope(value: Value) -> Result<Value, GenerationError> {
    match value {
        Value::Object(mut obj) if obj.contains_key("success") && obj.contains_key("result") => {
            if obj.get("success") == Some(&Value::Bool(false)) {
                let reason = obj
                    .get("error")
                    .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                    .unwrap_or_else(|| "supplied envelope reports success: false".to_string());
                return Err(GenerationError::Failed(reason));
            }
            Ok(obj.remove("result").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

fn envelope(result: Value) -> Value {
    json!({ "success": true, "result": result })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backlog_request(backlog: Option<Value>) -> GenerateBacklogRequest {
        GenerateBacklogRequest {
            project_name: "Todo".to_string(),
            project_description: "Track things".to_string(),
            output_path: None,
            backlog,
        }
    }

    #[tokio::test]
    async fn wraps_supplied_backlog_and_fills_project() {
        let generated = SuppliedBacklog
            .generate_backlog(&backlog_request(Some(json!({"epics": []}))))
            .await
            .unwrap();

        assert_eq!(generated["success"], json!(true));
        assert_eq!(generated["result"]["project"]["name"], json!("Todo"));
    }

    #[tokio::test]
    async fn keeps_supplied_project() {
        let generated = SuppliedBacklog
            .generate_backlog(&backlog_request(Some(json!({
                "success": true,
                "result": {"project": {"name": "Kept"}, "epics": []}
            }))))
            .await
            .unwrap();

        assert_eq!(generated["result"]["project"]["name"], json!("Kept"));
    }

    #[tokio::test]
    async fn missing_backlog_is_an_error() {
        let err = SuppliedBacklog
            .generate_backlog(&backlog_request(None))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Missing { .. }));
    }

    #[tokio::test]
    async fn failed_envelope_is_an_error() {
        let err = SuppliedBacklog
            .generate_backlog(&backlog_request(Some(json!({
                "success": false,
                "result": null,
                "error": "model timed out"
            }))))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Generation failed: model timed out");
    }
}
