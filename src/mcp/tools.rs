//! Purpose: MCP tools, resources and prompts backed by a `Gateway`.
//! Exports: `GatewayMcpHandler`.
//! Invariants: Tool arguments are forwarded to the gateway as given; absent optionals are empty strings.
//! Invariants: `extra`/`context` presence selects the six-input call.
use serde_json::{Map, Value, json};

use super::{
    JsonRpcError, McpHandler, McpPrompt, McpResource, McpTool, PromptArgument, PromptResult,
    ResourceContent, ToolCallRequest, ToolCallResult,
};
use crate::core::engine::ScriptEngine;
use crate::core::error::{Error, ErrorKind};
use crate::core::gateway::Gateway;
use crate::core::request::ExecRequest;

const DOCUMENTATION_URI: &str = "zenroom://documentation";
const KEYGEN_URI: &str = "zenroom://examples/keygen";
const SIGNATURE_URI: &str = "zenroom://examples/signature";

const DOCUMENTATION: &str = "\
# Zenroom

Zencode is the contract language executed by the Zenroom engine.

A script is made of phases:
- Scenario: selects the cryptographic context ('ecdh', 'eddsa', 'bbs', 'credential', ...)
- Given: declares the data and keys the script expects
- When: performs operations
- Then: selects what is printed as output

Inputs: `keys` and `data` are JSON strings; `conf` holds engine directives such as `debug=1`.
Full documentation: https://dev.zenroom.org";

const KEYGEN_EXAMPLE: &str = "\
Scenario 'ecdh': Create the keypair
Given that I am 'Alice'
When I create the ecdh key
Then print my data";

const SIGNATURE_EXAMPLE: &str = "\
Scenario 'ecdh': Create the signature
Given that I am 'Alice'
Given that I have my 'keyring'
Given that I have a 'string' named 'message'
When I create the ecdh signature of 'message'
Then print the 'ecdh signature'";

const DEFAULT_MESSAGE: &str = "Hello, World!";

pub struct GatewayMcpHandler<E> {
    gateway: Gateway<E>,
}

impl<E: ScriptEngine> GatewayMcpHandler<E> {
    pub fn new(gateway: Gateway<E>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway<E> {
        &self.gateway
    }

    fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolCallResult, JsonRpcError> {
        let request = request_from_arguments(arguments)?;
        let result = match self.gateway.run(&request) {
            Ok(output) => {
                let parsed = serde_json::from_str::<Value>(&output.output).ok();
                let text = match &parsed {
                    Some(value) => serde_json::to_string_pretty(value)
                        .unwrap_or_else(|_| output.output.clone()),
                    None if output.output.trim().is_empty() => {
                        "Script executed successfully".to_string()
                    }
                    None => output.output.clone(),
                };
                ToolCallResult::text(text).with_structured(json!({
                    "output": parsed.unwrap_or(Value::String(output.output)),
                    "logs": output.logs,
                }))
            }
            Err(err) => ToolCallResult::error_text(format!(
                "Error executing Zencode: {}",
                describe(&err)
            ))
            .with_structured(failure_json(&err)),
        };
        Ok(result)
    }

    fn validate(&self, arguments: &Map<String, Value>) -> Result<ToolCallResult, JsonRpcError> {
        let script = required_string(arguments, "script")?;
        let result = match self.gateway.run(&ExecRequest::new(script)) {
            Ok(_) => ToolCallResult::text("Script is valid"),
            Err(err) if matches!(err.kind(), ErrorKind::Invocation | ErrorKind::Config) => {
                ToolCallResult::text(format!("Script validation failed: {}", describe(&err)))
                    .with_structured(failure_json(&err))
            }
            Err(err) => ToolCallResult::error_text(format!(
                "Could not validate script: {}",
                describe(&err)
            ))
            .with_structured(failure_json(&err)),
        };
        Ok(result)
    }
}

impl<E: ScriptEngine> McpHandler for GatewayMcpHandler<E> {
    fn list_tools(&mut self) -> Vec<McpTool> {
        let optional = |description: &str| json!({ "type": "string", "description": description });
        vec![
            McpTool {
                name: "execute_zencode".to_string(),
                description: "Execute a Zencode script with optional data, keys, conf, extra and context"
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "script": { "type": "string", "description": "The Zencode script to execute" },
                        "data": optional("JSON data passed to the script"),
                        "keys": optional("JSON keys passed to the script"),
                        "conf": optional("Engine configuration, e.g. debug=1"),
                        "extra": optional("Additional payload (six-input call)"),
                        "context": optional("Execution context (six-input call)"),
                    },
                    "required": ["script"],
                }),
            },
            McpTool {
                name: "validate_zencode".to_string(),
                description: "Check that a Zencode script runs with empty inputs".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "script": { "type": "string", "description": "The Zencode script to validate" },
                    },
                    "required": ["script"],
                }),
            },
        ]
    }

    fn call_tool(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, JsonRpcError> {
        match request.name.as_str() {
            "execute_zencode" => self.execute(&request.arguments),
            "validate_zencode" => self.validate(&request.arguments),
            other => Err(JsonRpcError::method_not_found(format!(
                "tool not found: {other}"
            ))),
        }
    }

    fn list_resources(&mut self) -> Vec<McpResource> {
        let resource = |uri: &str, name: &str, description: &str| McpResource {
            uri: uri.to_string(),
            name: name.to_string(),
            description: Some(description.to_string()),
            mime_type: Some("text/plain".to_string()),
        };
        vec![
            resource(DOCUMENTATION_URI, "Zenroom Documentation", "Zencode overview"),
            resource(KEYGEN_URI, "Key Generation Example", "Create an ECDH keypair"),
            resource(SIGNATURE_URI, "Signature Example", "Sign a message with ECDH"),
        ]
    }

    fn read_resource(&mut self, uri: &str) -> Result<Vec<ResourceContent>, JsonRpcError> {
        let text = match uri {
            DOCUMENTATION_URI => DOCUMENTATION,
            KEYGEN_URI => KEYGEN_EXAMPLE,
            SIGNATURE_URI => SIGNATURE_EXAMPLE,
            _ => {
                return Err(JsonRpcError::invalid_params(format!(
                    "resource not found: {uri}"
                )));
            }
        };
        Ok(vec![ResourceContent {
            uri: uri.to_string(),
            mime_type: Some("text/plain".to_string()),
            text: text.to_string(),
        }])
    }

    fn list_prompts(&mut self) -> Vec<McpPrompt> {
        let argument = |name: &str, description: &str| PromptArgument {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        };
        vec![
            McpPrompt {
                name: "keygen".to_string(),
                description: "Generate a new ECDH keypair".to_string(),
                arguments: Vec::new(),
            },
            McpPrompt {
                name: "sign".to_string(),
                description: "Create a signature using ECDH".to_string(),
                arguments: vec![argument("message", "Message to sign")],
            },
            McpPrompt {
                name: "verify".to_string(),
                description: "Verify a signature using ECDH".to_string(),
                arguments: vec![
                    argument("message", "Message that was signed"),
                    argument("signature", "Signature to verify"),
                ],
            },
        ]
    }

    fn get_prompt(
        &mut self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<PromptResult, JsonRpcError> {
        let message = prompt_argument(arguments, "message").unwrap_or(DEFAULT_MESSAGE);
        match name {
            "keygen" => Ok(PromptResult::user_text(
                "Generate a new ECDH keypair",
                format!(
                    "Please execute this Zencode script to generate a new ECDH keypair:\n\n{KEYGEN_EXAMPLE}"
                ),
            )),
            "sign" => Ok(PromptResult::user_text(
                "Create a signature using ECDH",
                format!(
                    "Please sign the message \"{message}\" using ECDH. You'll need:\n\
                     1. An ECDH keypair (use the keygen prompt first if needed)\n\
                     2. Execute a signing script with the message as data"
                ),
            )),
            "verify" => {
                let signature = prompt_argument(arguments, "signature").unwrap_or("");
                Ok(PromptResult::user_text(
                    "Verify a signature using ECDH",
                    format!(
                        "Please verify the signature for message \"{message}\".\n\
                         Signature: {signature}\n\
                         You'll need the public key of the signer to verify."
                    ),
                ))
            }
            other => Err(JsonRpcError::method_not_found(format!(
                "prompt not found: {other}"
            ))),
        }
    }
}

/// Prompt arguments are strings; an empty one counts as absent.
fn prompt_argument<'a>(arguments: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn request_from_arguments(arguments: &Map<String, Value>) -> Result<ExecRequest, JsonRpcError> {
    let script = required_string(arguments, "script")?;
    let mut request = ExecRequest::classic(
        script,
        optional_string(arguments, "conf")?.unwrap_or_default(),
        optional_string(arguments, "keys")?.unwrap_or_default(),
        optional_string(arguments, "data")?.unwrap_or_default(),
    );
    let extra = optional_string(arguments, "extra")?;
    let context = optional_string(arguments, "context")?;
    if extra.is_some() || context.is_some() {
        request = request.with_extended(extra.unwrap_or_default(), context.unwrap_or_default());
    }
    Ok(request)
}

fn required_string(arguments: &Map<String, Value>, name: &str) -> Result<String, JsonRpcError> {
    optional_string(arguments, name)?
        .ok_or_else(|| JsonRpcError::invalid_params(format!("`{name}` is required")))
}

fn optional_string(
    arguments: &Map<String, Value>,
    name: &str,
) -> Result<Option<String>, JsonRpcError> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        // Callers often hand over parsed JSON for keys/data.
        Some(value @ (Value::Object(_) | Value::Array(_))) if name == "keys" || name == "data" => {
            Ok(Some(value.to_string()))
        }
        Some(_) => Err(JsonRpcError::invalid_params(format!(
            "`{name}` must be a string"
        ))),
    }
}

fn describe(err: &Error) -> String {
    err.message()
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("{:?}", err.kind()))
}

fn failure_json(err: &Error) -> Value {
    json!({
        "kind": format!("{:?}", err.kind()),
        "message": describe(err),
        "status": err.status(),
        "logs": err.logs().unwrap_or(""),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recording::RecordingEngine;
    use crate::core::request::ExecOutput;

    fn handler(engine: RecordingEngine) -> GatewayMcpHandler<RecordingEngine> {
        GatewayMcpHandler::new(Gateway::new(engine))
    }

    fn call(name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            name: name.to_string(),
            arguments: arguments.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn execute_forwards_arguments_and_pretty_prints_json() {
        let mut handler = handler(RecordingEngine::returning("{\"a\":1}"));
        let result = handler
            .call_tool(call(
                "execute_zencode",
                json!({"script": "s", "data": {"x": 1}, "keys": "", "conf": "debug=1"}),
            ))
            .expect("call");
        assert!(!result.is_error);
        assert_eq!(result.content[0]["text"], "{\n  \"a\": 1\n}");
        assert_eq!(result.structured_content.expect("structured")["output"]["a"], 1);

        let calls = handler.gateway().engine().calls();
        assert_eq!(calls[0], ExecRequest::classic("s", "debug=1", "", "{\"x\":1}"));
    }

    #[test]
    fn extra_or_context_selects_six_input_call() {
        let mut handler = handler(RecordingEngine::new());
        handler
            .call_tool(call("execute_zencode", json!({"script": "s", "context": "ctx"})))
            .expect("call");
        let calls = handler.gateway().engine().calls();
        assert_eq!(calls[0].arity(), 6);
        assert_eq!(calls[0].extra(), Some(""));
        assert_eq!(calls[0].context(), Some("ctx"));
    }

    #[test]
    fn engine_failure_is_tool_error() {
        let engine = RecordingEngine::new().with_responder(|_| {
            Err(Error::new(ErrorKind::Invocation)
                .with_message("[!] parser error")
                .with_logs("[!] parser error"))
        });
        let mut handler = handler(engine);
        let result = handler
            .call_tool(call("execute_zencode", json!({"script": "bad"})))
            .expect("call");
        assert!(result.is_error);
        assert_eq!(
            result.content[0]["text"],
            "Error executing Zencode: [!] parser error"
        );
    }

    #[test]
    fn validate_reports_invalid_scripts_without_is_error() {
        let engine = RecordingEngine::new().with_responder(|request: &ExecRequest| {
            if request.script.contains("When") {
                Ok(ExecOutput::new("{}"))
            } else {
                Err(Error::new(ErrorKind::Invocation).with_message("[!] no statements"))
            }
        });
        let mut handler = handler(engine);
        let ok = handler
            .call_tool(call("validate_zencode", json!({"script": "When I do"})))
            .expect("call");
        assert_eq!(ok.content[0]["text"], "Script is valid");

        let bad = handler
            .call_tool(call("validate_zencode", json!({"script": "nothing"})))
            .expect("call");
        assert!(!bad.is_error);
        assert_eq!(
            bad.content[0]["text"],
            "Script validation failed: [!] no statements"
        );
    }

    #[test]
    fn load_failure_is_tool_error_and_server_keeps_going() {
        let mut handler = handler(RecordingEngine::new().failing_initialize("libzenroom.so missing"));
        let result = handler
            .call_tool(call("validate_zencode", json!({"script": "s"})))
            .expect("call");
        assert!(result.is_error);
        let result = handler
            .call_tool(call("execute_zencode", json!({"script": "s"})))
            .expect("second call still answered");
        assert!(result.is_error);
    }

    #[test]
    fn argument_errors_are_protocol_errors() {
        let mut handler = handler(RecordingEngine::new());
        assert!(handler.call_tool(call("execute_zencode", json!({}))).is_err());
        assert!(
            handler
                .call_tool(call("execute_zencode", json!({"script": "s", "conf": 1})))
                .is_err()
        );
        assert!(handler.call_tool(call("missing_tool", json!({}))).is_err());
    }

    #[test]
    fn resources_are_listed_and_readable() {
        let mut handler = handler(RecordingEngine::new());
        let uris = handler
            .list_resources()
            .into_iter()
            .map(|resource| resource.uri)
            .collect::<Vec<_>>();
        assert_eq!(uris, vec![DOCUMENTATION_URI, KEYGEN_URI, SIGNATURE_URI]);
        let contents = handler.read_resource(KEYGEN_URI).expect("read");
        assert!(contents[0].text.contains("create the ecdh key"));
        assert!(contents[0].text.ends_with("Then print my data"));
        assert!(handler.read_resource("zenroom://nope").is_err());
    }

    #[test]
    fn prompts_match_the_listed_arguments() {
        let mut handler = handler(RecordingEngine::new());
        let prompts = handler.list_prompts();
        let names = prompts.iter().map(|prompt| prompt.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["keygen", "sign", "verify"]);
        assert_eq!(prompts[2].arguments.len(), 2);
        assert!(prompts[2].arguments.iter().all(|argument| argument.required));
    }

    #[test]
    fn prompts_render_their_arguments() {
        let mut handler = handler(RecordingEngine::new());
        let text = |result: PromptResult| {
            result.messages[0]["content"]["text"]
                .as_str()
                .unwrap_or_default()
                .to_string()
        };

        let keygen = handler.get_prompt("keygen", &Map::new()).expect("keygen");
        assert!(text(keygen).ends_with(KEYGEN_EXAMPLE));

        let sign = handler.get_prompt("sign", &Map::new()).expect("sign");
        assert!(text(sign).starts_with("Please sign the message \"Hello, World!\""));

        let arguments = json!({"message": "pay 5", "signature": "abc"});
        let verify = handler
            .get_prompt("verify", arguments.as_object().expect("object"))
            .expect("verify");
        let body = text(verify);
        assert!(body.contains("message \"pay 5\""));
        assert!(body.contains("Signature: abc"));

        let err = handler.get_prompt("encrypt", &Map::new()).expect_err("unknown");
        assert_eq!(err.code, crate::mcp::METHOD_NOT_FOUND_CODE);
        // No prompt runs the engine.
        assert!(handler.gateway().engine().calls().is_empty());
    }
}
