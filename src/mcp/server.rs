use crate::app::App;
use crate::config::Config;
use crate::errors::{ErrorCode, McpError, ToolError, ToolErrorKind};
use crate::mcp::catalog::{tool_catalog, validate_tool_args};
use crate::mcp::protocol::{
    request_key, CancelledParams, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION,
};
use crate::services::logger::Logger;
use crate::utils::redact::redact_text;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "piwik-pro-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const MAX_DETAILS_IN_MESSAGE: usize = 2048;

fn map_tool_error(tool: &str, error: &ToolError) -> McpError {
    let mut lines = vec![
        "PiwikProError".to_string(),
        format!("tool: {}", tool),
        format!("kind: {:?}", error.kind).to_lowercase(),
        format!("code: {}", error.code),
        format!("retryable: {}", error.retryable),
        format!("message: {}", error.message),
    ];
    if let Some(hint) = &error.hint {
        lines.push(format!("hint: {}", hint));
    }
    if let Some(details) = &error.details {
        lines.push(format!(
            "details: {}",
            redact_text(&details.to_string(), MAX_DETAILS_IN_MESSAGE)
        ));
    }
    let message = lines.join("\n");

    match error.kind {
        ToolErrorKind::InvalidParams => McpError::new(ErrorCode::InvalidParams, message),
        ToolErrorKind::Timeout => McpError::new(ErrorCode::RequestTimeout, message),
        ToolErrorKind::Denied | ToolErrorKind::Conflict | ToolErrorKind::NotFound => {
            McpError::new(ErrorCode::InvalidRequest, message)
        }
        ToolErrorKind::Retryable | ToolErrorKind::Configuration | ToolErrorKind::Internal => {
            McpError::new(ErrorCode::InternalError, message)
        }
    }
}

struct InFlight {
    call: u64,
    handle: AbortHandle,
}

/// Owned by a running `tools/call` task. Dropping it releases the request id,
/// and a drop during unwinding still answers the caller.
struct CallGuard {
    server: Arc<McpServer>,
    key: String,
    call: u64,
    pending: Option<(Value, mpsc::UnboundedSender<JsonRpcResponse>)>,
}

impl CallGuard {
    fn respond(mut self, response: impl FnOnce(Value) -> JsonRpcResponse) {
        if let Some((id, tx)) = self.pending.take() {
            self.release();
            let _ = tx.send(response(id));
        }
    }

    fn release(&self) {
        self.server
            .in_flight
            .remove_if(&self.key, |_, entry| entry.call == self.call);
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.release();
        if !std::thread::panicking() {
            return;
        }
        if let Some((id, tx)) = self.pending.take() {
            self.server.logger.error(
                "tool call panicked",
                Some(&serde_json::json!({ "request": self.key })),
            );
            let _ = tx.send(JsonRpcResponse::failure(
                id,
                ErrorCode::InternalError.as_i32(),
                "Internal error: tool call aborted unexpectedly".to_string(),
            ));
        }
    }
}

/// JSON-RPC front end. Every `tools/call` runs in its own task; responses
/// are funnelled through one writer so lines never interleave.
pub struct McpServer {
    app: Arc<App>,
    logger: Logger,
    in_flight: DashMap<String, InFlight>,
    next_call: AtomicU64,
}

impl McpServer {
    pub fn new(app: Arc<App>) -> Self {
        let logger = app.logger.child("mcp");
        Self {
            app,
            logger,
            in_flight: DashMap::new(),
            next_call: AtomicU64::new(0),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn handle_initialize(&self, params: &Value) -> Value {
        let version = params
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or(PROTOCOL_VERSION);
        serde_json::json!({
            "protocolVersion": version,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        serde_json::json!({ "tools": tool_catalog() })
    }

    pub async fn handle_tools_call(&self, name: &str, args: Value) -> Result<Value, McpError> {
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        validate_tool_args(name, &args)?;
        let payload = self
            .app
            .tool_executor
            .execute(name, args)
            .await
            .map_err(|err| map_tool_error(name, &err))?;
        let text = serde_json::to_string(&payload)
            .map_err(|err| McpError::new(ErrorCode::InternalError, err.to_string()))?;
        Ok(serde_json::json!({
            "content": [ { "type": "text", "text": text } ]
        }))
    }

    fn handle_cancelled(&self, params: &Value) {
        let Ok(cancelled) = serde_json::from_value::<CancelledParams>(params.clone()) else {
            return;
        };
        let key = request_key(&cancelled.request_id);
        if let Some((_, entry)) = self.in_flight.remove(&key) {
            entry.handle.abort();
            self.logger.info(
                "tool call cancelled",
                Some(&serde_json::json!({
                    "request_id": cancelled.request_id,
                    "reason": cancelled.reason,
                })),
            );
        }
    }

    fn spawn_tools_call(
        self: &Arc<Self>,
        id: Value,
        params: Value,
        tx: &mpsc::UnboundedSender<JsonRpcResponse>,
    ) {
        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if name.is_empty() {
            let _ = tx.send(JsonRpcResponse::failure(
                id,
                ErrorCode::InvalidParams.as_i32(),
                "Missing tool name".to_string(),
            ));
            return;
        }
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);
        let key = request_key(&id);

        if self.in_flight.contains_key(&key) {
            let _ = tx.send(JsonRpcResponse::failure(
                id,
                ErrorCode::InvalidRequest.as_i32(),
                format!("Invalid request: request id {} is already in flight", key),
            ));
            return;
        }

        let call = self.next_call.fetch_add(1, Ordering::Relaxed);
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let guard = CallGuard {
            server: Arc::clone(self),
            key: key.clone(),
            call,
            pending: Some((id, tx.clone())),
        };
        let task = tokio::spawn(async move {
            let _ = registered_rx.await;
            let outcome = guard.server.handle_tools_call(&name, args).await;
            guard.respond(|id| match outcome {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(err) => JsonRpcResponse::from_error(id, err),
            });
        });
        self.in_flight.insert(
            key,
            InFlight {
                call,
                handle: task.abort_handle(),
            },
        );
        let _ = registered_tx.send(());
    }

    fn dispatch(self: &Arc<Self>, request: JsonRpcRequest, tx: &mpsc::UnboundedSender<JsonRpcResponse>) {
        if request.jsonrpc != JSONRPC_VERSION {
            if let Some(id) = request.id {
                let _ = tx.send(JsonRpcResponse::failure(
                    id,
                    ErrorCode::InvalidRequest.as_i32(),
                    "Invalid request: jsonrpc must be \"2.0\"".to_string(),
                ));
            }
            return;
        }

        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        match (method.as_str(), id) {
            ("notifications/cancelled", _) => self.handle_cancelled(&params),
            ("notifications/initialized", None) => {}
            (other, None) if other.starts_with("notifications/") => {}
            ("notifications/initialized", Some(id)) => {
                let _ = tx.send(JsonRpcResponse::success(id, serde_json::json!({})));
            }
            ("initialize", Some(id)) => {
                let _ = tx.send(JsonRpcResponse::success(id, self.handle_initialize(&params)));
            }
            ("ping", Some(id)) => {
                let _ = tx.send(JsonRpcResponse::success(id, serde_json::json!({})));
            }
            ("tools/list", Some(id)) => {
                let _ = tx.send(JsonRpcResponse::success(id, self.handle_tools_list()));
            }
            ("tools/call", Some(id)) => self.spawn_tools_call(id, params, tx),
            (_, Some(id)) => {
                let _ = tx.send(JsonRpcResponse::failure(
                    id,
                    ErrorCode::MethodNotFound.as_i32(),
                    format!("Method not found: {}", method),
                ));
            }
            (_, None) => {}
        }
    }

    /// Serve newline-delimited JSON-RPC until the reader hits EOF, then wait
    /// for in-flight calls to answer.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<(), ToolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(async move {
            let mut writer = BufWriter::new(writer);
            while let Some(response) = rx.recv().await {
                let payload = serde_json::to_string(&response).unwrap_or_default();
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let parsed: Value = match serde_json::from_str(trimmed) {
                Ok(value) => value,
                Err(_) => {
                    let _ = tx.send(JsonRpcResponse::failure(
                        Value::Null,
                        ErrorCode::ParseError.as_i32(),
                        "Parse error".to_string(),
                    ));
                    continue;
                }
            };
            let id = parsed.get("id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<JsonRpcRequest>(parsed) {
                Ok(request) => self.dispatch(request, &tx),
                Err(_) => {
                    let _ = tx.send(JsonRpcResponse::failure(
                        id,
                        ErrorCode::InvalidRequest.as_i32(),
                        "Invalid request".to_string(),
                    ));
                }
            }
        }

        drop(tx);
        writer_task
            .await
            .map_err(|err| ToolError::internal(format!("Writer task failed: {}", err)))??;
        Ok(())
    }
}

pub async fn run_stdio(config: Config) -> Result<(), ToolError> {
    let app = Arc::new(App::initialize(&config)?);
    app.logger.info(
        "piwik-pro-mcp ready on stdio",
        Some(&serde_json::json!({ "config": config.summary() })),
    );
    let server = Arc::new(McpServer::new(app));
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    server.serve(stdin, tokio::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    fn server() -> Arc<McpServer> {
        let credentials = Credentials::new("http://localhost:9", "id", "secret").expect("credentials");
        let app = App::initialize(&Config::new(credentials)).expect("app initializes");
        Arc::new(McpServer::new(Arc::new(app)))
    }

    fn track(server: &Arc<McpServer>, key: &str, call: u64) {
        let handle = tokio::spawn(async {}).abort_handle();
        server.in_flight.insert(key.to_string(), InFlight { call, handle });
    }

    #[tokio::test]
    async fn panicking_call_is_answered_and_released() {
        let server = server();
        let (tx, mut rx) = mpsc::unbounded_channel();
        track(&server, "1", 7);
        let guard = CallGuard {
            server: Arc::clone(&server),
            key: "1".to_string(),
            call: 7,
            pending: Some((serde_json::json!(1), tx)),
        };

        let joined = tokio::spawn(async move {
            let _guard = guard;
            panic!("handler blew up");
        })
        .await;
        assert!(joined.unwrap_err().is_panic());

        let response = serde_json::to_value(rx.recv().await.expect("response")).expect("json");
        assert_eq!(response["id"], 1);
        assert_eq!(response["error"]["code"], -32603);
        assert_eq!(server.in_flight(), 0);
    }

    #[tokio::test]
    async fn finished_call_keeps_a_newer_entry_for_the_same_id() {
        let server = server();
        let (tx, mut rx) = mpsc::unbounded_channel();
        track(&server, "1", 2);
        let stale = CallGuard {
            server: Arc::clone(&server),
            key: "1".to_string(),
            call: 1,
            pending: Some((serde_json::json!(1), tx)),
        };

        drop(stale);
        assert_eq!(server.in_flight(), 1);
        assert!(rx.try_recv().is_err());
    }
}
