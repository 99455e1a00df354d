//! MCP server exposing backlog materialization over stdio.

mod generator;
mod protocol;
mod transport;
mod types;

use std::path::Path;
use std::sync::Arc;

pub use generator::*;
pub use protocol::*;
pub use transport::*;
pub use types::*;

pub use rmcp::{model::ErrorCode, ErrorData as McpError};

use rmcp::model::{
    CallToolResult, Content, Implementation, JsonObject, ListToolsResult, ProtocolVersion,
    ServerCapabilities, ServerInfo, Tool,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::backlog::{self, paths, EpicTarget, RunContext};
use crate::config::Config;
use crate::error::BacklogError;

const SERVER_NAME: &str = "agile-planner";
const DEFAULT_EPIC_ID: &str = "standalone";

const INSTRUCTIONS: &str = r#"Agile Planner writes project backlogs to disk as a tree of linked markdown documents.

TOOLS:
- generateBacklog: Materialize a full backlog (epics > features > user stories, plus MVP and iterations)
  under <outputPath>/.agile-planner-backlog. Pass the generated backlog in `backlog`.
- generateFeature: Add one feature with its user stories under an epic of an existing or new tree.
  Pass the generated feature in `feature`.

LAYOUT:
  epics/<epicId>/epic.md
  epics/<epicId>/features/<featureId>/feature.md
  epics/<epicId>/features/<featureId>/user-stories/<storyId>.md
  planning/mvp/mvp.md
  planning/iterations/<slug>/iteration.md
  index.json (written last; lists every document and the orphan stories)

Directory names come from ids, never titles, so re-running with the same backlog rewrites the same files.
Stories referenced by the MVP or an iteration but owned by no feature are rendered inline and flagged as orphans.
Every checklist item starts unchecked; update progress by flipping `- [ ]` to `- [x]` in place."#;

/// Protocol methods the server routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    /// `notifications/initialized`
    Initialized,
    /// `notifications/cancelled`
    Cancelled,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::Initialized => "notifications/initialized",
            Self::Cancelled => "notifications/cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initialize" => Some(Self::Initialize),
            "ping" => Some(Self::Ping),
            "tools/list" => Some(Self::ToolsList),
            "tools/call" => Some(Self::ToolsCall),
            "notifications/initialized" => Some(Self::Initialized),
            "notifications/cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Initialized | Self::Cancelled)
    }
}

/// Tools callable through `tools/call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    GenerateBacklog,
    GenerateFeature,
}

impl ToolName {
    pub const ALL: [ToolName; 2] = [Self::GenerateBacklog, Self::GenerateFeature];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateBacklog => "generateBacklog",
            Self::GenerateFeature => "generateFeature",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == s)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::GenerateBacklog => {
                "Materialize a complete backlog (epics, features, user stories, MVP and iterations) into a cross-linked markdown tree under <outputPath>/.agile-planner-backlog, with an index.json manifest. The tree is validated first; nothing is written when validation fails."
            }
            Self::GenerateFeature => {
                "Materialize one feature and its user stories under epics/<epicId>/features/<featureId>/ of the backlog tree. Creates the epic directory and document if they do not exist yet."
            }
        }
    }

    pub fn input_schema(&self) -> JsonObject {
        match self {
            Self::GenerateBacklog => schema_of::<GenerateBacklogRequest>(),
            Self::GenerateFeature => schema_of::<GenerateFeatureRequest>(),
        }
    }

    pub fn info(&self) -> Tool {
        Tool::new(self.as_str(), self.description(), Arc::new(self.input_schema()))
    }
}

fn schema_of<T: JsonSchema>() -> JsonObject {
    match serde_json::to_value(schemars::schema_for!(T)) {
        Ok(Value::Object(schema)) => schema,
        _ => {
            let mut schema = JsonObject::new();
            schema.insert("type".into(), json!("object"));
            schema
        }
    }
}

/// Routes JSON-RPC messages to the backlog tools.
pub struct McpServer<G = SuppliedBacklog> {
    config: Config,
    generator: G,
}

impl McpServer<SuppliedBacklog> {
    pub fn new(config: Config) -> Self {
        Self::with_generator(config, SuppliedBacklog)
    }
}

impl<G: BacklogGenerator> McpServer<G> {
    pub fn with_generator(config: Config, generator: G) -> Self {
        Self { config, generator }
    }

    /// Handle one raw message. Returns the response to write, if any.
    ///
    /// Undecodable JSON gets no response: without an id there is nothing to
    /// correlate it with.
    pub async fn handle_message(&self, text: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                tracing::warn!(
                    code = ErrorCode::PARSE_ERROR.0,
                    "Dropping malformed message: {}",
                    e
                );
                None
            }
        }
    }

    /// Handle one parsed message. Notifications yield `None`.
    pub async fn dispatch(&self, message: Value) -> Option<JsonRpcResponse> {
        let id = message.get("id").cloned();

        let request: JsonRpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Invalid request: {}", e);
                return id.map(|id| {
                    JsonRpcResponse::failure(
                        id,
                        McpError::invalid_request(format!("Invalid request: {}", e), None),
                    )
                });
            }
        };

        if let Some(version) = request.jsonrpc.as_deref() {
            if version != JSONRPC_VERSION {
                tracing::warn!("Unsupported jsonrpc version '{}'", version);
                return id.map(|id| {
                    JsonRpcResponse::failure(
                        id,
                        McpError::invalid_request(
                            format!("Unsupported jsonrpc version '{}'", version),
                            None,
                        ),
                    )
                });
            }
        }

        let Some(id) = id else {
            self.notify(&request.method);
            return None;
        };

        tracing::debug!(id = %id, method = %request.method, "Received");
        let outcome = match Method::parse(&request.method) {
            Some(method) => {
                tracing::debug!(id = %id, method = method.as_str(), "Routed");
                self.route(method, request.params).await
            }
            None => Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Unknown method '{}'", request.method),
                None,
            )),
        };

        Some(match outcome {
            Ok(result) => {
                tracing::debug!(id = %id, "Completed");
                JsonRpcResponse::success(id, result)
            }
            Err(error) => {
                tracing::warn!(id = %id, method = %request.method, "Failed: {}", error);
                JsonRpcResponse::failure(id, error)
            }
        })
    }

    fn notify(&self, method: &str) {
        match Method::parse(method) {
            Some(m) if m.is_notification() => tracing::debug!("Notification {}", m.as_str()),
            _ => tracing::warn!("Ignoring unknown notification '{}'", method),
        }
    }

    async fn route(&self, method: Method, params: Option<Value>) -> Result<Value, McpError> {
        match method {
            Method::Initialize => to_value(&self.initialize(params.as_ref())),
            Method::Ping => Ok(json!({})),
            Method::ToolsList => to_value(&self.list_tools()),
            Method::ToolsCall => {
                let result = self.call_tool(params).await?;
                to_value(&result)
            }
            Method::Initialized | Method::Cancelled => Err(McpError::invalid_request(
                format!("'{}' is a notification and takes no id", method.as_str()),
                None,
            )),
        }
    }

    fn initialize(&self, params: Option<&Value>) -> ServerInfo {
        let protocol_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(|v| serde_json::from_value::<ProtocolVersion>(v.clone()).ok())
            .unwrap_or(ProtocolVersion::V_2024_11_05);

        ServerInfo {
            protocol_version,
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    fn list_tools(&self) -> ListToolsResult {
        ListToolsResult::with_all_items(ToolName::ALL.iter().map(ToolName::info).collect())
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<CallToolResult, McpError> {
        let params: CallToolParams = parse_params(params, "tools/call")?;
        let tool = ToolName::parse(&params.name).ok_or_else(|| {
            McpError::invalid_params(format!("Unknown tool '{}'", params.name), None)
        })?;
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        match tool {
            ToolName::GenerateBacklog => self.generate_backlog(parse_arguments(arguments)?).await,
            ToolName::GenerateFeature => self.generate_feature(parse_arguments(arguments)?).await,
        }
    }

    async fn generate_backlog(
        &self,
        req: GenerateBacklogRequest,
    ) -> Result<CallToolResult, McpError> {
        let generated = self
            .generator
            .generate_backlog(&req)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let ctx = RunContext::new(
            self.config
                .resolve_output_root(req.output_path.as_deref().map(Path::new)),
        );
        let done = backlog::materialize(&generated, &ctx).map_err(materialize_error)?;

        let story_count = done
            .index
            .epics
            .iter()
            .flat_map(|e| &e.features)
            .map(|f| f.stories.len())
            .sum();
        let response = GenerateBacklogResponse {
            success: true,
            output_path: done.output_path.display().to_string(),
            index_path: paths::INDEX_FILE.to_string(),
            files_written: done.files_written,
            epic_count: done.index.epics.len(),
            story_count,
            orphans: done.index.orphans,
        };
        text_result(&response)
    }

    async fn generate_feature(
        &self,
        req: GenerateFeatureRequest,
    ) -> Result<CallToolResult, McpError> {
        let generated = self
            .generator
            .generate_feature(&req)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let target = EpicTarget {
            id: epic_id_for(&req),
            title: req.epic_title.clone(),
        };
        let ctx = RunContext::new(
            self.config
                .resolve_output_root(req.output_path.as_deref().map(Path::new)),
        );
        let done =
            backlog::materialize_feature(&generated, &target, &ctx).map_err(materialize_error)?;

        let response = GenerateFeatureResponse {
            success: true,
            output_path: done.output_path.display().to_string(),
            epic_id: done.epic_id,
            feature_id: done.feature.id.clone(),
            feature_path: done.feature.path.clone(),
            story_paths: done.feature.stories.into_iter().map(|s| s.path).collect(),
            epic_created: done.epic_created,
            files_written: done.files_written,
        };
        text_result(&response)
    }
}

impl<G: BacklogGenerator> MessageHandler for McpServer<G> {
    async fn on_message(&self, message: &str) -> Option<Value> {
        let response = self.handle_message(message).await?;
        match serde_json::to_value(&response) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                None
            }
        }
    }
}

fn epic_id_for(req: &GenerateFeatureRequest) -> String {
    if let Some(id) = req.epic_id.as_deref().filter(|id| !id.trim().is_empty()) {
        return id.to_string();
    }
    req.epic_title
        .as_deref()
        .map(paths::slugify)
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| DEFAULT_EPIC_ID.to_string())
}

fn materialize_error(e: BacklogError) -> McpError {
    if e.is_validation() {
        McpError::invalid_params(
            e.to_string(),
            Some(json!({ "errors": e.validation_errors() })),
        )
    } else {
        tracing::error!("Materialization failed: {}", e);
        McpError::internal_error(e.to_string(), None)
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>, method: &str) -> Result<T, McpError> {
    let params = params
        .ok_or_else(|| McpError::invalid_params(format!("Missing params for {}", method), None))?;
    serde_json::from_value(params)
        .map_err(|e| McpError::invalid_params(format!("Invalid params for {}: {}", method, e), None))
}

fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T, McpError> {
    serde_json::from_value(arguments)
        .map_err(|e| McpError::invalid_params(format!("Invalid arguments: {}", e), None))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::internal_error(e.to_string(), None))
}

fn text_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Serve MCP over stdin/stdout until `shutdown` is cancelled.
pub async fn run_stdio_server(config: Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    tracing::info!("Starting MCP server via stdio");

    let server = McpServer::new(config);
    let mut transport = StdioTransport::stdio();
    transport.listen(&server, &shutdown).await?;

    tracing::info!("MCP server stopped");
    Ok(())
}
