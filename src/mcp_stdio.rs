//! Purpose: Serve the gateway's MCP tools over stdin/stdout.
//! Exports: `serve`.
//! Role: Line transport for `McpDispatcher`; the engine is initialised once up front.
//! Invariants: stdout carries JSON-RPC replies only, one per line, in request order.
//! Invariants: A load failure is reported through the callback and the server keeps answering.
//! Invariants: Unparseable lines get a JSON-RPC parse error with a null id; blank lines are ignored.

use std::io::{self, BufRead, BufWriter, Write};

use serde_json::{Value, json};
use tracing::{debug, info};
use zengate::api::{Error, ErrorKind, Gateway, ScriptEngine};
use zengate::mcp::{
    DispatchOutcome, GatewayMcpHandler, JsonRpcError, McpDispatcher, McpHandler,
    parse_jsonrpc_line,
};

pub(super) fn serve<E: ScriptEngine>(
    gateway: Gateway<E>,
    on_load_failure: impl FnOnce(&Error),
) -> Result<(), Error> {
    if let Err(err) = gateway.initialize() {
        on_load_failure(&err);
    }
    let engine = gateway.engine().name();
    let mut dispatcher = McpDispatcher::new(GatewayMcpHandler::new(gateway));
    info!(server = %dispatcher.metadata().name, engine, "mcp server listening on stdio");

    let stdin = io::stdin();
    let stdout = io::stdout();
    answer_lines(&mut dispatcher, stdin.lock(), BufWriter::new(stdout.lock()))
}

/// Answers request lines until the reader is exhausted.
fn answer_lines<H: McpHandler>(
    dispatcher: &mut McpDispatcher<H>,
    reader: impl BufRead,
    mut writer: impl Write,
) -> Result<(), Error> {
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read MCP request")
                .with_source(err)
        })?;
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        let reply = match parse_jsonrpc_line(message) {
            Ok(request) => match dispatcher.dispatch_value(request) {
                DispatchOutcome::NoResponse => continue,
                DispatchOutcome::Response(response) => {
                    serde_json::to_value(response).map_err(|err| {
                        Error::new(ErrorKind::Internal)
                            .with_message("failed to encode MCP response")
                            .with_source(err)
                    })?
                }
            },
            Err(error) => parse_error_reply(error),
        };
        debug!(line = index + 1, "mcp reply");
        write_json_line(&mut writer, &reply)?;
    }
    writer.flush().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to flush MCP output")
            .with_source(err)
    })
}

fn parse_error_reply(error: JsonRpcError) -> Value {
    json!({ "jsonrpc": "2.0", "id": Value::Null, "error": error })
}

fn write_json_line(writer: &mut impl Write, payload: &Value) -> Result<(), Error> {
    serde_json::to_writer(&mut *writer, payload).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode MCP message")
            .with_source(err)
    })?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write MCP message")
                .with_source(err)
        })
}
