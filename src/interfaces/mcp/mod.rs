//! MCP server over stdio: newline-delimited JSON-RPC 2.0, one message per line.

pub mod tools;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::commands::{Caller, CommandContext, Surface, dispatch};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Deserialize, Debug, Clone)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Serialize, Debug, Clone)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(json!({ "code": code, "message": message.into() })),
        }
    }
}

#[derive(Clone)]
pub struct McpServer {
    ctx: CommandContext,
    caller: Caller,
}

impl McpServer {
    pub fn new(ctx: CommandContext, user_id: &str) -> Self {
        Self {
            ctx,
            caller: Caller::new(user_id, Surface::Mcp),
        }
    }

    /// Handles one line of input. Notifications produce no reply.
    pub async fn handle_message(&self, line: &str) -> Option<String> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Unparseable MCP message: {}", e);
                return encode(JsonRpcResponse::err(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };
        let Some(id) = request.id.clone() else {
            debug!("MCP notification: {}", request.method);
            return None;
        };
        if request.jsonrpc != "2.0" || request.method.is_empty() {
            return encode(JsonRpcResponse::err(id, INVALID_REQUEST, "Invalid request"));
        }
        encode(self.handle_request(id, request).await)
    }

    async fn handle_request(&self, id: Value, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => JsonRpcResponse::ok(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "noisett", "version": env!("CARGO_PKG_VERSION") }
                }),
            ),
            "ping" => JsonRpcResponse::ok(id, json!({})),
            "tools/list" => JsonRpcResponse::ok(id, json!({ "tools": tools::list_tools() })),
            "tools/call" => self.call_tool(id, request.params.unwrap_or(Value::Null)).await,
            other => JsonRpcResponse::err(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        }
    }

    async fn call_tool(&self, id: Value, params: Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::err(id, INVALID_PARAMS, "Missing tool name");
        };
        let Some(command) = tools::command_for_tool(name) else {
            return JsonRpcResponse::err(id, INVALID_PARAMS, format!("Unknown tool: {}", name));
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let result = dispatch(&self.ctx, command, arguments, &self.caller).await;
        let is_error = !result.success;
        let text = match serde_json::to_string_pretty(&result) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode result of {}: {}", command, e);
                return JsonRpcResponse::err(id, INVALID_PARAMS, "Unencodable result");
            }
        };
        JsonRpcResponse::ok(
            id,
            json!({
                "content": [{ "type": "text", "text": text }],
                "isError": is_error
            }),
        )
    }

    /// Serves until stdin closes.
    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }

    /// Each request runs in its own task so a long `job_wait` does not stall
    /// the others; replies are written in completion order.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!("MCP server listening on stdio");
        let (tx, mut rx) = mpsc::channel::<String>(64);

        let mut out = tokio::io::BufWriter::new(writer);
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = out.write_all(format!("{}\n", msg).as_bytes()).await {
                    error!("Failed to write MCP response: {}", e);
                    break;
                }
                let _ = out.flush().await;
            }
        });

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let server = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(reply) = server.handle_message(&line).await {
                    let _ = tx.send(reply).await;
                }
            });
        }
        drop(tx);
        let _ = writer_task.await;
        info!("MCP stdin closed");
        Ok(())
    }
}

fn encode(response: JsonRpcResponse) -> Option<String> {
    match serde_json::to_string(&response) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to encode MCP response: {}", e);
            None
        }
    }
}
