//! Purpose: Transport-agnostic MCP JSON-RPC core for the gateway.
//! Key exports: `McpDispatcher`, `McpHandler`, request/response envelopes, prompt types, `GatewayMcpHandler`.
//! Role: Protocol adapter shared by the stdio transport and tests.
//! Invariants: Notifications (no id) never produce a response.
//! Invariants: Unknown methods and malformed request shapes map to protocol errors.
//! Invariants: Engine failures are tool results with `isError`, not protocol errors.

mod tools;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub use tools::GatewayMcpHandler;

const JSON_RPC_VERSION: &str = "2.0";
const MCP_PROTOCOL_VERSION: &str = "2025-06-18";
pub const PARSE_ERROR_CODE: i32 = -32700;
pub const INVALID_REQUEST_CODE: i32 = -32600;
pub const METHOD_NOT_FOUND_CODE: i32 = -32601;
pub const INVALID_PARAMS_CODE: i32 = -32602;
pub const INTERNAL_ERROR_CODE: i32 = -32603;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    String(String),
    Number(i64),
    Null,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: JsonRpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn ok(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR_CODE, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST_CODE, message)
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND_CODE, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS_CODE, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR_CODE, message)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    Response(JsonRpcResponse),
    NoResponse,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerMetadata {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

impl Default for ServerMetadata {
    fn default() -> Self {
        Self {
            name: "zengate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<Value>,
    #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![text_content(text)],
            is_error: false,
            structured_content: None,
        }
    }

    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![text_content(text)],
            is_error: true,
            structured_content: None,
        }
    }

    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McpResource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McpPrompt {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// A rendered prompt: one or more user messages carrying text content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptResult {
    pub description: String,
    pub messages: Vec<Value>,
}

impl PromptResult {
    pub fn user_text(description: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            messages: vec![json!({ "role": "user", "content": text_content(text) })],
        }
    }
}

pub trait McpHandler {
    fn list_tools(&mut self) -> Vec<McpTool>;
    fn call_tool(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, JsonRpcError>;
    fn list_resources(&mut self) -> Vec<McpResource>;
    fn read_resource(&mut self, uri: &str) -> Result<Vec<ResourceContent>, JsonRpcError>;
    fn list_prompts(&mut self) -> Vec<McpPrompt>;
    fn get_prompt(
        &mut self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<PromptResult, JsonRpcError>;
}

pub struct McpDispatcher<H> {
    metadata: ServerMetadata,
    handler: H,
}

impl<H: McpHandler> McpDispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self {
            metadata: ServerMetadata::default(),
            handler,
        }
    }

    pub fn metadata(&self) -> &ServerMetadata {
        &self.metadata
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn dispatch_value(&mut self, value: Value) -> DispatchOutcome {
        let request = match parse_jsonrpc_request(value) {
            Ok(request) => request,
            Err(response) => return DispatchOutcome::Response(response),
        };
        let id = request.id.clone();
        let routed = self.route(request);
        match id {
            None => DispatchOutcome::NoResponse,
            Some(id) => DispatchOutcome::Response(match routed {
                Ok(result) => JsonRpcResponse::ok(id, result),
                Err(error) => JsonRpcResponse::err(id, error),
            }),
        }
    }

    fn route(&mut self, request: JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let params = request.params.as_ref();
        match request.method.as_str() {
            "initialize" => {
                ensure_object_or_absent(params)?;
                Ok(json!({
                    "protocolVersion": self.metadata.protocol_version,
                    "capabilities": {
                        "tools": { "listChanged": false },
                        "resources": { "subscribe": false, "listChanged": false },
                        "prompts": { "listChanged": false },
                    },
                    "serverInfo": {
                        "name": self.metadata.name,
                        "version": self.metadata.version,
                    },
                }))
            }
            "notifications/initialized" | "ping" => {
                ensure_object_or_absent(params)?;
                Ok(json!({}))
            }
            "tools/list" => {
                ensure_object_or_absent(params)?;
                Ok(json!({ "tools": self.handler.list_tools() }))
            }
            "tools/call" => {
                let params = require_object(params, "tools/call requires object params")?;
                let call = parse_tool_call(params)?;
                let result = self.handler.call_tool(call)?;
                serde_json::to_value(result)
                    .map_err(|_| JsonRpcError::internal_error("failed to encode result"))
            }
            "resources/list" => {
                ensure_object_or_absent(params)?;
                Ok(json!({ "resources": self.handler.list_resources() }))
            }
            "resources/read" => {
                let params = require_object(params, "resources/read requires object params")?;
                let uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| {
                    JsonRpcError::invalid_params("resources/read requires string param `uri`")
                })?;
                let contents = self.handler.read_resource(uri)?;
                Ok(json!({ "contents": contents }))
            }
            "prompts/list" => {
                ensure_object_or_absent(params)?;
                Ok(json!({ "prompts": self.handler.list_prompts() }))
            }
            "prompts/get" => {
                let params = require_object(params, "prompts/get requires object params")?;
                let (name, arguments) = parse_prompt_get(params)?;
                let prompt = self.handler.get_prompt(name, &arguments)?;
                serde_json::to_value(prompt)
                    .map_err(|_| JsonRpcError::internal_error("failed to encode prompt"))
            }
            other => Err(JsonRpcError::method_not_found(format!(
                "method not found: {other}"
            ))),
        }
    }
}

pub fn parse_jsonrpc_line(line: &str) -> Result<Value, JsonRpcError> {
    serde_json::from_str::<Value>(line).map_err(|_| JsonRpcError::parse_error("invalid JSON"))
}

fn parse_jsonrpc_request(value: Value) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let Value::Object(mut object) = value else {
        return Err(JsonRpcResponse::err(
            JsonRpcId::Null,
            JsonRpcError::invalid_request("request must be a JSON object"),
        ));
    };

    let id = match object.remove("id") {
        Some(raw) => Some(
            parse_jsonrpc_id(raw).map_err(|error| JsonRpcResponse::err(JsonRpcId::Null, error))?,
        ),
        None => None,
    };
    let reply_id = id.clone().unwrap_or(JsonRpcId::Null);

    match object.remove("jsonrpc").as_ref().and_then(Value::as_str) {
        Some(JSON_RPC_VERSION) => {}
        Some(_) => {
            return Err(JsonRpcResponse::err(
                reply_id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }
        None => {
            return Err(JsonRpcResponse::err(
                reply_id,
                JsonRpcError::invalid_request("missing jsonrpc field"),
            ));
        }
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) => method,
        _ => {
            return Err(JsonRpcResponse::err(
                reply_id,
                JsonRpcError::invalid_request("missing method field"),
            ));
        }
    };

    Ok(JsonRpcRequest {
        jsonrpc: JSON_RPC_VERSION.to_string(),
        id,
        method,
        params: object.remove("params"),
    })
}

fn parse_jsonrpc_id(value: Value) -> Result<JsonRpcId, JsonRpcError> {
    match value {
        Value::String(value) => Ok(JsonRpcId::String(value)),
        Value::Number(value) => value
            .as_i64()
            .map(JsonRpcId::Number)
            .ok_or_else(|| JsonRpcError::invalid_request("id must be an integer number")),
        Value::Null => Ok(JsonRpcId::Null),
        _ => Err(JsonRpcError::invalid_request(
            "id must be a string, integer number, or null",
        )),
    }
}

fn require_object<'a>(
    params: Option<&'a Value>,
    message: &'static str,
) -> Result<&'a Map<String, Value>, JsonRpcError> {
    match params {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(JsonRpcError::invalid_params(message)),
    }
}

fn ensure_object_or_absent(params: Option<&Value>) -> Result<(), JsonRpcError> {
    match params {
        None | Some(Value::Null) | Some(Value::Object(_)) => Ok(()),
        _ => Err(JsonRpcError::invalid_params(
            "params must be an object when provided",
        )),
    }
}

fn parse_tool_call(params: &Map<String, Value>) -> Result<ToolCallRequest, JsonRpcError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::invalid_params("tools/call requires string param `name`"))?
        .to_string();
    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(arguments)) => arguments.clone(),
        Some(_) => {
            return Err(JsonRpcError::invalid_params(
                "tools/call `arguments` must be an object",
            ));
        }
    };
    Ok(ToolCallRequest { name, arguments })
}

fn parse_prompt_get(
    params: &Map<String, Value>,
) -> Result<(&str, Map<String, Value>), JsonRpcError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::invalid_params("prompts/get requires string param `name`"))?;
    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(arguments)) => arguments.clone(),
        Some(_) => {
            return Err(JsonRpcError::invalid_params(
                "prompts/get `arguments` must be an object",
            ));
        }
    };
    Ok((name, arguments))
}

fn text_content(text: impl Into<String>) -> Value {
    json!({ "type": "text", "text": text.into() })
}

fn is_false(value: &bool) -> bool {
    !*value
}
