//! MCP (Model Context Protocol) handler
//!
//! Implements a JSON-RPC style MCP server exposing broker inspection and
//! error-queue remediation tools. Uses sealed traits to control which tools
//! can be registered.

use crate::broker::BrokerApi;
use crate::error::{Error, Result};
use crate::format::{format_message, format_peek};
use crate::naming::QueueKind;
use crate::report;
use crate::republish::{RepublishRequest, Republisher, validate_count};
use crate::types::AckMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Sealed Trait Pattern - Prevents external implementations
// ============================================================================

mod sealed {
    pub trait Sealed {}
}

/// Trait for MCP tools - sealed to prevent external implementations
#[async_trait]
pub trait Tool: sealed::Sealed + Send + Sync {
    /// Tool name
    fn name(&self) -> &'static str;

    /// Tool description for the AI model
    fn description(&self) -> &'static str;

    /// JSON schema for input parameters
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given parameters, returning a text report
    async fn execute(&self, params: serde_json::Value) -> Result<String>;
}

// ============================================================================
// MCP Protocol Types
// ============================================================================

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const TOOL_ERROR: i32 = -32000;

/// MCP request structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// MCP response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// MCP error structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl McpResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

// ============================================================================
// Parameter helpers
// ============================================================================

fn required_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::invalid(format!("Missing '{key}' parameter")))
}

fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn count_param(params: &serde_json::Value, default: u32) -> Result<u32> {
    let count = match params.get("count") {
        None | Some(serde_json::Value::Null) => default,
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| Error::invalid("'count' must be a positive integer"))?,
    };
    validate_count(count)?;
    Ok(count)
}

/// Anything other than an explicit `true` means "preview"
fn confirm_param(params: &serde_json::Value) -> bool {
    match params.get("confirm") {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Shared by all tools
struct ToolContext {
    broker: Arc<dyn BrokerApi>,
    default_vhost: String,
}

impl ToolContext {
    fn vhost(&self, params: &serde_json::Value) -> String {
        optional_str(params, "vhost").unwrap_or_else(|| self.default_vhost.clone())
    }
}

fn vhost_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "description": "Virtual host (default: the configured vhost)"
    })
}

fn count_schema(default: u32) -> serde_json::Value {
    serde_json::json!({
        "type": "integer",
        "description": format!("Number of messages (1-50, default: {default})"),
        "minimum": 1,
        "maximum": 50,
        "default": default
    })
}

// ============================================================================
// Read-only Tools
// ============================================================================

/// Tool to show the cluster overview
pub struct GetOverviewTool {
    ctx: Arc<ToolContext>,
}

impl sealed::Sealed for GetOverviewTool {}

#[async_trait]
impl Tool for GetOverviewTool {
    fn name(&self) -> &'static str {
        "get_overview"
    }

    fn description(&self) -> &'static str {
        "Shows the RabbitMQ version, cluster name, and message and object totals."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<String> {
        let overview = self.ctx.broker.overview().await?;
        Ok(report::render_overview(&overview))
    }
}

/// Tool to list queues with message counts
pub struct ListQueuesTool {
    ctx: Arc<ToolContext>,
}

impl sealed::Sealed for ListQueuesTool {}

#[async_trait]
impl Tool for ListQueuesTool {
    fn name(&self) -> &'static str {
        "list_queues"
    }

    fn description(&self) -> &'static str {
        "Lists queues with message, ready, unacknowledged and consumer counts."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"vhost": vhost_schema()}
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let queues = self.ctx.broker.list_queues(optional_str(&params, "vhost")).await?;
        Ok(report::render_queues(&queues))
    }
}

/// Tool to list `_error` and `_skipped` queues
pub struct ListErrorQueuesTool {
    ctx: Arc<ToolContext>,
}

impl sealed::Sealed for ListErrorQueuesTool {}

#[async_trait]
impl Tool for ListErrorQueuesTool {
    fn name(&self) -> &'static str {
        "list_error_queues"
    }

    fn description(&self) -> &'static str {
        "Lists error (_error) and skipped (_skipped) queues with their source queue and message count, most messages first."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"vhost": vhost_schema()}
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let queues = self.ctx.broker.list_queues(optional_str(&params, "vhost")).await?;
        Ok(report::render_failure_queues(&queues))
    }
}

/// Tool to list client connections
pub struct ListConnectionsTool {
    ctx: Arc<ToolContext>,
}

impl sealed::Sealed for ListConnectionsTool {}

#[async_trait]
impl Tool for ListConnectionsTool {
    fn name(&self) -> &'static str {
        "list_connections"
    }

    fn description(&self) -> &'static str {
        "Lists client connections with user, vhost, state and channel count."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<String> {
        let connections = self.ctx.broker.list_connections().await?;
        Ok(report::render_connections(&connections))
    }
}

/// Tool to look at messages in any queue without removing them
pub struct PeekMessagesTool {
    ctx: Arc<ToolContext>,
}

impl sealed::Sealed for PeekMessagesTool {}

#[async_trait]
impl Tool for PeekMessagesTool {
    fn name(&self) -> &'static str {
        "peek_messages"
    }

    fn description(&self) -> &'static str {
        "Shows messages from a queue without removing them. Fault messages get a full fault report."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "queue": {"type": "string", "description": "Queue name"},
                "count": count_schema(5),
                "vhost": vhost_schema()
            },
            "required": ["queue"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let queue = required_str(&params, "queue")?;
        let count = count_param(&params, 5)?;
        let messages = self
            .ctx
            .broker
            .get_messages(self.ctx.vhost(&params), queue.to_string(), count, AckMode::Requeue)
            .await?;

        if messages.is_empty() {
            return Ok(format!("No messages in {queue}.\n"));
        }
        Ok(join_reports(messages.iter().enumerate().map(|(i, m)| format_peek(m, i + 1))))
    }
}

/// Tool to inspect failed messages in an error or skipped queue
pub struct GetErrorMessagesTool {
    ctx: Arc<ToolContext>,
}

impl sealed::Sealed for GetErrorMessagesTool {}

#[async_trait]
impl Tool for GetErrorMessagesTool {
    fn name(&self) -> &'static str {
        "get_error_messages"
    }

    fn description(&self) -> &'static str {
        "Shows failed messages from an error or skipped queue with exception details, stack trace, original payload and source host. Messages stay in the queue."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "queue": {"type": "string", "description": "Error or skipped queue name, e.g. orders_error"},
                "count": count_schema(5),
                "vhost": vhost_schema()
            },
            "required": ["queue"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let queue = required_str(&params, "queue")?;
        let count = count_param(&params, 5)?;
        let messages = self
            .ctx
            .broker
            .get_messages(self.ctx.vhost(&params), queue.to_string(), count, AckMode::Requeue)
            .await?;

        let mut out = String::new();
        if !QueueKind::of(queue).is_failure() {
            let _ = writeln!(
                out,
                "Note: {queue} does not follow the _error/_skipped naming convention.\n"
            );
        }
        if messages.is_empty() {
            let _ = writeln!(out, "No messages in {queue}.");
            return Ok(out);
        }
        out.push_str(&join_reports(
            messages.iter().enumerate().map(|(i, m)| format_message(m, i + 1)),
        ));
        Ok(out)
    }
}

// ============================================================================
// Remediation Tools
// ============================================================================

/// Tool to move failed messages back to their destination
pub struct RepublishFromErrorTool {
    ctx: Arc<ToolContext>,
}

impl sealed::Sealed for RepublishFromErrorTool {}

#[async_trait]
impl Tool for RepublishFromErrorTool {
    fn name(&self) -> &'static str {
        "republish_from_error"
    }

    fn description(&self) -> &'static str {
        "Republishes messages from an error queue to their original destination. Without confirm=true it only previews the messages; with confirm=true it removes them from the error queue and publishes the original payloads."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "error_queue": {"type": "string", "description": "Error queue name, e.g. orders_error"},
                "count": count_schema(10),
                "confirm": {
                    "type": "boolean",
                    "description": "Set to true to actually republish (default: false, preview only)",
                    "default": false
                },
                "vhost": vhost_schema()
            },
            "required": ["error_queue"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let mut request =
            RepublishRequest::new(required_str(&params, "error_queue")?, count_param(&params, 10)?)
                .with_confirm(confirm_param(&params));
        request.vhost = optional_str(&params, "vhost");

        let republisher = Republisher::new(Arc::clone(&self.ctx.broker), self.ctx.default_vhost.clone());
        let response = republisher.run(&request).await?;
        Ok(response.render())
    }
}

/// Tool to empty a queue
pub struct PurgeQueueTool {
    ctx: Arc<ToolContext>,
}

impl sealed::Sealed for PurgeQueueTool {}

#[async_trait]
impl Tool for PurgeQueueTool {
    fn name(&self) -> &'static str {
        "purge_queue"
    }

    fn description(&self) -> &'static str {
        "Deletes all ready messages from a queue. Without confirm=true it only reports how many messages would be removed."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "queue": {"type": "string", "description": "Queue name"},
                "confirm": {
                    "type": "boolean",
                    "description": "Set to true to actually purge (default: false)",
                    "default": false
                },
                "vhost": vhost_schema()
            },
            "required": ["queue"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let queue = required_str(&params, "queue")?;
        let vhost = self.ctx.vhost(&params);

        let queues = self.ctx.broker.list_queues(Some(vhost.clone())).await?;
        let info = queues
            .iter()
            .find(|q| q.name == queue)
            .ok_or_else(|| Error::NotFound {
                context: format!("queue '{queue}' in vhost '{vhost}'"),
            })?;
        let messages = info.messages_ready.or(info.messages).unwrap_or(0);

        if !confirm_param(&params) {
            if messages == 0 {
                return Ok(format!("No messages in {queue}; nothing to purge.\n"));
            }
            return Ok(format!(
                "{queue} has {messages} ready message(s). They will be deleted permanently.\nTo purge, call purge_queue again with confirm=true.\n"
            ));
        }

        // queue stats can lag, so a confirmed purge always goes to the broker
        self.ctx.broker.purge_queue(vhost, queue.to_string()).await?;
        info!(queue = %queue, messages, "Purged queue");
        if messages == 0 {
            return Ok(format!("Purged {queue}; its stats reported no ready messages.\n"));
        }
        Ok(format!("Purged {messages} message(s) from {queue}.\n"))
    }
}

fn join_reports(reports: impl Iterator<Item = String>) -> String {
    reports.collect::<Vec<_>>().join("\n")
}

// ============================================================================
// MCP Handler
// ============================================================================

/// MCP request handler
pub struct McpHandler {
    tools: BTreeMap<String, Box<dyn Tool>>,
    server_info: ServerInfo,
}

#[derive(Clone, Serialize)]
struct ServerInfo {
    name: String,
    version: String,
}

impl McpHandler {
    /// Create a new MCP handler over a broker, defaulting to `default_vhost`
    pub fn new(broker: Arc<dyn BrokerApi>, default_vhost: impl Into<String>) -> Self {
        let ctx = Arc::new(ToolContext {
            broker,
            default_vhost: default_vhost.into(),
        });

        let registered: Vec<Box<dyn Tool>> = vec![
            Box::new(GetOverviewTool { ctx: Arc::clone(&ctx) }),
            Box::new(ListQueuesTool { ctx: Arc::clone(&ctx) }),
            Box::new(ListErrorQueuesTool { ctx: Arc::clone(&ctx) }),
            Box::new(ListConnectionsTool { ctx: Arc::clone(&ctx) }),
            Box::new(PeekMessagesTool { ctx: Arc::clone(&ctx) }),
            Box::new(GetErrorMessagesTool { ctx: Arc::clone(&ctx) }),
            Box::new(RepublishFromErrorTool { ctx: Arc::clone(&ctx) }),
            Box::new(PurgeQueueTool { ctx }),
        ];
        let tools = registered
            .into_iter()
            .map(|tool| (tool.name().to_string(), tool))
            .collect();

        Self {
            tools,
            server_info: ServerInfo {
                name: "rabbitmq-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Names of the registered tools, sorted
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Run one tool directly, outside JSON-RPC
    pub async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<String> {
        let tool = self.tools.get(name).ok_or_else(|| Error::UnknownTool {
            name: name.to_string(),
        })?;
        tool.execute(arguments).await
    }

    /// Handle an MCP request. Notifications get no response.
    pub async fn handle(&self, request: McpRequest) -> Option<McpResponse> {
        if request.id.is_none() && request.method.starts_with("notifications/") {
            debug!(method = %request.method, "Notification received");
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "ping" => McpResponse::success(request.id, serde_json::json!({})),
            "tools/list" => self.handle_list_tools(request.id),
            "tools/call" => self.handle_call_tool(request.id, request.params).await,
            _ => McpResponse::error(request.id, METHOD_NOT_FOUND, "Method not found"),
        };
        Some(response)
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<serde_json::Value>) -> McpResponse {
        McpResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": self.server_info,
                "capabilities": {
                    "tools": {}
                }
            }),
        )
    }

    /// Handle tools/list request
    fn handle_list_tools(&self, id: Option<serde_json::Value>) -> McpResponse {
        let tools: Vec<serde_json::Value> = self
            .tools
            .values()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema()
                })
            })
            .collect();

        McpResponse::success(id, serde_json::json!({ "tools": tools }))
    }

    /// Handle tools/call request
    async fn handle_call_tool(
        &self,
        id: Option<serde_json::Value>,
        params: serde_json::Value,
    ) -> McpResponse {
        let tool_name = match params.get("name").and_then(|v| v.as_str()) {
            Some(name) => name,
            None => return McpResponse::error(id, INVALID_PARAMS, "Missing tool name"),
        };

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or(serde_json::json!({}));

        info!(tool = %tool_name, "Calling tool");
        match self.call_tool(tool_name, arguments).await {
            Ok(text) => McpResponse::success(
                id,
                serde_json::json!({
                    "content": [{
                        "type": "text",
                        "text": text
                    }]
                }),
            ),
            Err(e @ (Error::UnknownTool { .. } | Error::InvalidRequest { .. })) => {
                McpResponse::error(id, INVALID_PARAMS, e.to_string())
            }
            Err(e) => McpResponse::error(id, TOOL_ERROR, e.to_string()),
        }
    }

    /// Parse and handle a JSON request string
    pub async fn handle_json(&self, json: &str) -> Option<String> {
        let request: McpRequest = match serde_json::from_str(json) {
            Ok(req) => req,
            Err(e) => {
                let response = McpResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e));
                return serde_json::to_string(&response).ok();
            }
        };

        let response = self.handle(request).await?;
        serde_json::to_string(&response).ok()
    }
}
