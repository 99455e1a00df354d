//! MCP protocol integration tests.
//!
//! These tests spawn the actual `agile-planner mcp` process and communicate
//! via line-delimited JSON-RPC over stdio:
//! ```
//! {"jsonrpc":"2.0","id":1,"method":"initialize",...}\n
//! {"jsonrpc":"2.0","id":1,"result":{...}}\n
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct JsonRpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

/// MCP test client that spawns and communicates with the server
struct McpTestClient {
    child: Child,
    request_id: u64,
    reader: BufReader<std::process::ChildStdout>,
    output_root: tempfile::TempDir,
}

impl McpTestClient {
    /// Spawn a new MCP server process writing into an isolated output root
    fn spawn() -> Self {
        let output_root = tempfile::tempdir().expect("Failed to create temp dir");

        let mut child = Command::new(env!("CARGO_BIN_EXE_agile-planner"))
            .arg("mcp")
            .env("AGILE_PLANNER_OUTPUT_ROOT", output_root.path())
            .current_dir(output_root.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to spawn agile-planner mcp");

        let stdout = child.stdout.take().expect("Failed to get stdout");
        let reader = BufReader::new(stdout);

        Self {
            child,
            request_id: 0,
            reader,
            output_root,
        }
    }

    fn backlog_root(&self) -> PathBuf {
        self.output_root.path().join(".agile-planner-backlog")
    }

    /// Send a message as line-delimited JSON
    fn send_message(&mut self, content: &str) {
        let stdin = self.child.stdin.as_mut().expect("Failed to get stdin");
        writeln!(stdin, "{}", content).expect("Failed to write message");
        stdin.flush().expect("Failed to flush stdin");
    }

    /// Read a message as line-delimited JSON
    fn read_message(&mut self) -> String {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .expect("Failed to read line");
        line.trim().to_string()
    }

    /// Send a JSON-RPC request and get the response
    fn request(&mut self, method: &str, params: Option<Value>) -> JsonRpcResponse {
        self.request_id += 1;
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id,
            method: method.to_string(),
            params,
        };

        let request_json = serde_json::to_string(&request).expect("Failed to serialize request");
        self.send_message(&request_json);

        let response_json = self.read_message();
        serde_json::from_str(&response_json).expect("Failed to parse response")
    }

    /// Send initialize request and initialized notification
    fn initialize(&mut self) -> JsonRpcResponse {
        let response = self.request(
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {
                    "name": "test-client",
                    "version": "1.0.0"
                }
            })),
        );

        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        });
        self.send_message(&notification.to_string());

        response
    }

    fn list_tools(&mut self) -> JsonRpcResponse {
        self.request("tools/list", None)
    }

    fn call_tool(&mut self, name: &str, arguments: Value) -> JsonRpcResponse {
        self.request(
            "tools/call",
            Some(json!({
                "name": name,
                "arguments": arguments
            })),
        )
    }
}

impl Drop for McpTestClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn extract_text_content(response: &JsonRpcResponse) -> String {
    response
        .result
        .as_ref()
        .and_then(|r| r.get("content"))
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|c| c.get("text"))
        .and_then(|t| t.as_str())
        .expect("Expected text content")
        .to_string()
}

fn sample_backlog() -> Value {
    json!({
        "epics": [{
            "id": "ep1",
            "title": "Epic",
            "features": [{
                "id": "f1",
                "title": "F",
                "stories": [{
                    "id": "s1",
                    "title": "S",
                    "description": "d",
                    "acceptanceCriteria": ["c1"],
                    "tasks": ["t1"]
                }]
            }]
        }],
        "mvp": [{"id": "s1"}],
        "iterations": []
    })
}

// ============================================================
// Protocol Tests
// ============================================================

mod protocol {
    use super::*;

    #[test]
    fn initialize_returns_server_info() {
        let mut client = McpTestClient::spawn();
        let response = client.initialize();

        assert!(response.error.is_none(), "Expected success, got error");
        let result = response.result.expect("Expected result");

        assert_eq!(result["serverInfo"]["name"], json!("agile-planner"));
        assert_eq!(result["protocolVersion"], json!("2024-11-05"));
        assert!(result.get("capabilities").is_some());
    }

    #[test]
    fn tools_list_returns_all_tools() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let response = client.list_tools();
        assert!(response.error.is_none(), "Expected success, got error");

        let result = response.result.expect("Expected result");
        let tools = result["tools"].as_array().expect("Tools should be array");
        assert_eq!(tools.len(), 2, "Expected 2 tools, got {}", tools.len());

        for tool in tools {
            let name = tool.get("name").and_then(|n| n.as_str()).unwrap_or("?");
            assert!(
                tool.get("description").is_some(),
                "Tool {} missing description",
                name
            );
            assert!(
                tool.get("inputSchema").is_some(),
                "Tool {} missing inputSchema",
                name
            );
        }
    }

    #[test]
    fn unknown_tool_returns_error_for_that_id() {
        let mut client = McpTestClient::spawn();
        client.initialize();
        client.request_id = 6;

        let response = client.call_tool("doesNotExist", json!({}));

        assert_eq!(response.id, Some(7));
        assert!(response.result.is_none());
        assert!(response.error.is_some());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut client = McpTestClient::spawn();
        client.send_message("{this is not json");
        client.send_message("");

        let response = client.initialize();

        assert_eq!(response.id, Some(1));
        assert!(response.result.is_some());
    }

    #[test]
    fn crlf_terminated_requests_are_answered() {
        let mut client = McpTestClient::spawn();
        {
            let stdin = client.child.stdin.as_mut().expect("Failed to get stdin");
            write!(stdin, "{{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"ping\"}}\r\n").unwrap();
            stdin.flush().unwrap();
        }

        let response: JsonRpcResponse = serde_json::from_str(&client.read_message()).unwrap();

        assert_eq!(response.id, Some(9));
        assert_eq!(response.result, Some(json!({})));
    }

    #[test]
    fn stays_running_after_stdin_closes() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        drop(client.child.stdin.take());
        std::thread::sleep(Duration::from_millis(300));

        let status = client.child.try_wait().expect("Failed to poll child");
        assert!(status.is_none(), "Server exited after stdin closed: {:?}", status);
    }
}

// ============================================================
// Tool Call Tests
// ============================================================

mod tool_calls {
    use super::*;

    #[test]
    fn generate_backlog_writes_the_tree() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let response = client.call_tool(
            "generateBacklog",
            json!({
                "projectName": "Todo",
                "backlog": sample_backlog()
            }),
        );

        assert!(response.error.is_none(), "Expected success, got {:?}", response.error);
        let summary: Value = serde_json::from_str(&extract_text_content(&response)).unwrap();
        assert_eq!(summary["success"], json!(true));
        assert_eq!(summary["storyCount"], json!(1));

        let root = client.backlog_root();
        assert!(root.join("epics/ep1/features/f1/user-stories/s1.md").is_file());
        assert!(root.join("planning/mvp/mvp.md").is_file());
        assert!(root.join("index.json").is_file());
    }

    #[test]
    fn invalid_backlog_reports_validation_errors() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let response = client.call_tool(
            "generateBacklog",
            json!({"projectName": "Todo", "backlog": {"mvp": []}}),
        );

        let error = response.error.expect("Expected error");
        assert_eq!(error.code, -32602);
        assert!(error.data.is_some());
        assert!(!client.backlog_root().exists());
    }

    #[test]
    fn generate_feature_after_backlog_extends_the_tree() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        client.call_tool(
            "generateBacklog",
            json!({"projectName": "Todo", "backlog": sample_backlog()}),
        );
        let response = client.call_tool(
            "generateFeature",
            json!({
                "featureDescription": "Sign out",
                "epicId": "ep1",
                "feature": {"id": "f2", "title": "Logout", "stories": [{"id": "s2", "title": "Sign out"}]}
            }),
        );

        assert!(response.error.is_none(), "Expected success, got {:?}", response.error);
        let summary: Value = serde_json::from_str(&extract_text_content(&response)).unwrap();
        assert_eq!(summary["epicCreated"], json!(false));
        assert!(client
            .backlog_root()
            .join("epics/ep1/features/f2/user-stories/s2.md")
            .is_file());
    }
}
