use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::error::{R2rError, Result};
use crate::model::SearchChunksRequest;
use crate::search::SearchPipeline;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const TOOL_NAME: &str = "search_chunks";

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// `None` when the member is absent (a notification); `Some(Null)` for an explicit null.
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub async fn run_stdio(pipeline: Arc<SearchPipeline>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    serve_lines(pipeline, BufReader::new(tokio::io::stdin()), &mut stdout).await
}

/// Newline-delimited JSON-RPC loop. Requests are answered in arrival order, one at a time.
pub async fn serve_lines<R, W>(pipeline: Arc<SearchPipeline>, input: R, output: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: RpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                write_response(output, error_response(Value::Null, -32700, format!("parse error: {e}"))).await?;
                continue;
            }
        };

        // one request at a time keeps session refreshes strictly ordered
        if let Some(resp) = process_request(pipeline.clone(), req).await {
            write_response(output, resp).await?;
        }
    }

    Ok(())
}

/// Dispatches one JSON-RPC request. Returns `None` for notifications.
pub async fn process_request(pipeline: Arc<SearchPipeline>, req: RpcRequest) -> Option<RpcResponse> {
    debug!("rpc method {}", req.method);
    if req.id.is_none() {
        // notifications are never answered
        return None;
    }
    let resp = match req.method.as_str() {
        "initialize" => handle_initialize(&req),
        m if m.starts_with("notifications/") => success(&req, Value::Bool(true)),
        "ping" => success(&req, json!({})),
        "tools/list" | "list_tools" => handle_list_tools(&req),
        "tools/call" => handle_tool_call(&pipeline, &req).await,
        TOOL_NAME => match parse_search_args(req.params.clone()) {
            Ok(args) => {
                let res = pipeline.search(args).await;
                success(&req, serde_json::to_value(res).unwrap_or(Value::Null))
            }
            Err(e) => rpc_error(&req, -32602, e.to_string()),
        },
        _ => rpc_error(&req, -32601, format!("method not found: {}", req.method)),
    };
    Some(resp)
}

fn handle_initialize(req: &RpcRequest) -> RpcResponse {
    success(
        req,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "r2r-search-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        }),
    )
}

async fn handle_tool_call(pipeline: &SearchPipeline, req: &RpcRequest) -> RpcResponse {
    let params: ToolCallParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => return rpc_error(req, -32602, format!("invalid params: {e}")),
    };
    if params.name != TOOL_NAME {
        warn!("unknown tool requested: {}", params.name);
        return rpc_error(req, -32602, format!("unknown tool: {}", params.name));
    }
    let args = match parse_search_args(params.arguments) {
        Ok(a) => a,
        Err(e) => return rpc_error(req, -32602, e.to_string()),
    };

    let res = pipeline.search(args).await;
    let text = serde_json::to_string(&res).unwrap_or_else(|_| "{}".to_string());
    success(
        req,
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": res,
            "isError": false
        }),
    )
}

fn parse_search_args(args: Value) -> Result<SearchChunksRequest> {
    serde_json::from_value(args).map_err(|e| R2rError::InvalidRequest(format!("invalid params: {e}")))
}

fn handle_list_tools(req: &RpcRequest) -> RpcResponse {
    let tools = vec![json!({
        "name": TOOL_NAME,
        "description": "Search document chunks in the R2R system and return each hit with its full text.",
        "inputSchema": {
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "file_ids": {
                    "type": ["array", "null"],
                    "items": { "type": "string" },
                    "description": "Document IDs to restrict the search to"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 5,
                    "description": "Maximum number of results to return"
                }
            }
        }
    })];

    success(req, json!({ "tools": tools }))
}

async fn write_response<W: AsyncWrite + Unpin>(output: &mut W, resp: RpcResponse) -> Result<()> {
    let line = serde_json::to_string(&resp).unwrap_or_else(|_| "{}".to_string());
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

fn present_id<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn success(req: &RpcRequest, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        id: req.id.clone().unwrap_or(Value::Null),
        result: Some(result),
        error: None,
    }
}

fn rpc_error(req: &RpcRequest, code: i32, message: String) -> RpcResponse {
    error_response(req.id.clone().unwrap_or(Value::Null), code, message)
}

fn error_response(id: Value, code: i32, message: String) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(RpcError { code, message }),
    }
}
