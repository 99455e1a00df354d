//! Request and response types for MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBacklogRequest {
    #[schemars(description = "Name of the project being planned")]
    pub project_name: String,
    #[schemars(description = "What the project is for and who it serves")]
    #[serde(default)]
    pub project_description: String,
    #[schemars(
        description = "Directory under which .agile-planner-backlog is created. Defaults to AGILE_PLANNER_OUTPUT_ROOT, then the server's working directory"
    )]
    #[serde(default)]
    pub output_path: Option<String>,
    #[schemars(
        description = "The generated backlog: {project?, epics: [...], mvp: [...], iterations: [...]}, bare or wrapped as {success, result}"
    )]
    #[serde(default)]
    pub backlog: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFeatureRequest {
    #[schemars(description = "Description of the feature to add")]
    pub feature_description: String,
    #[schemars(
        description = "Id of the epic the feature belongs to. Defaults to the slug of epicTitle, then 'standalone'"
    )]
    #[serde(default)]
    pub epic_id: Option<String>,
    #[schemars(description = "Title used when the epic document has to be created")]
    #[serde(default)]
    pub epic_title: Option<String>,
    #[schemars(
        description = "Directory under which .agile-planner-backlog is created. Defaults to AGILE_PLANNER_OUTPUT_ROOT, then the server's working directory"
    )]
    #[serde(default)]
    pub output_path: Option<String>,
    #[schemars(
        description = "The generated feature: {id, title, description, businessValue?, stories: [...]}, bare or wrapped as {success, result}"
    )]
    #[serde(default)]
    pub feature: Option<Value>,
}

/// `params` of a `tools/call` request.
#[derive(Debug, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

// ============================================================
// Response Types
// ============================================================

/// Summary returned as the text content of a `generateBacklog` call.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBacklogResponse {
    pub success: bool,
    /// Absolute backlog root.
    pub output_path: String,
    pub index_path: String,
    pub files_written: usize,
    pub epic_count: usize,
    pub story_count: usize,
    /// Story ids rendered inline in planning documents.
    pub orphans: Vec<String>,
}

/// Summary returned as the text content of a `generateFeature` call.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFeatureResponse {
    pub success: bool,
    pub output_path: String,
    pub epic_id: String,
    pub feature_id: String,
    /// Root-relative path of the feature document.
    pub feature_path: String,
    pub story_paths: Vec<String>,
    pub epic_created: bool,
    pub files_written: usize,
}
