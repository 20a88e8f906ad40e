use std::sync::Arc;
use std::time::Instant;

use kbeauty_core::jsonrpc::{RequestEnvelope, ResponseEnvelope, RpcError};
use serde_json::{Map, Value, json};

use crate::executor::{ToolExecutionError, ToolExecutor};
use crate::registry::{RegistryError, ToolRegistry};
use crate::session::{Session, SessionStore};
use crate::{MCP_PROTOCOL_VERSION, MCP_SERVER_NAME};

/// Capabilities advertised by `initialize` and the SSE greeting.
pub fn server_capabilities() -> Value {
    json!({
        "tools": {},
        "logging": {},
        "prompts": {}
    })
}

pub fn server_info() -> Value {
    json!({
        "name": MCP_SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION")
    })
}

pub fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": server_capabilities(),
        "serverInfo": server_info()
    })
}

/// Transport-agnostic JSON-RPC method router.
///
/// Cloning is cheap; every clone shares the registry, executor and session store.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    executor: Arc<dyn ToolExecutor>,
    sessions: SessionStore,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.registry.len())
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl Dispatcher {
    /// Builds the registry from the executor's catalog. Fails on duplicate tool names.
    pub fn new(
        executor: Arc<dyn ToolExecutor>,
        sessions: SessionStore,
    ) -> Result<Self, RegistryError> {
        let registry = ToolRegistry::from_descriptors(executor.list_tools())?;
        Ok(Self {
            registry: Arc::new(registry),
            executor,
            sessions,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handles a single message or a batch. Notifications produce no response,
    /// so an empty result means nothing should be written back.
    pub async fn handle_incoming_message(
        &self,
        incoming: Value,
        session: &Session,
    ) -> Vec<ResponseEnvelope> {
        let mut responses = Vec::new();

        if let Value::Array(batch) = incoming {
            if batch.is_empty() {
                responses.push(ResponseEnvelope::failure(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item, session).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming, session).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(
        &self,
        incoming: Value,
        session: &Session,
    ) -> Option<ResponseEnvelope> {
        let envelope = match RequestEnvelope::from_value(incoming) {
            Ok(envelope) => envelope,
            Err(rejected) => {
                tracing::debug!(
                    event = "mcp_envelope_rejected",
                    session_id = %session.id,
                    code = rejected.error.code,
                    reason = %rejected.error.message,
                    "Rejected malformed JSON-RPC envelope"
                );
                return Some(rejected.into_response());
            }
        };

        if envelope.is_notification() {
            self.handle_notification(&envelope, session);
            return None;
        }
        Some(self.dispatch(envelope, session).await)
    }

    fn handle_notification(&self, envelope: &RequestEnvelope, session: &Session) {
        if matches!(
            envelope.method.as_str(),
            "notifications/initialized" | "notifications/cancelled"
        ) {
            self.sessions.touch(&session.id);
            return;
        }
        tracing::debug!(
            event = "mcp_notification_ignored",
            session_id = %session.id,
            method = %envelope.method,
            "Ignoring unknown notification"
        );
    }

    /// Routes one request. Never panics and never fails outside the envelope.
    pub async fn dispatch(&self, envelope: RequestEnvelope, session: &Session) -> ResponseEnvelope {
        let started = Instant::now();
        let id = envelope.id.clone().unwrap_or(Value::Null);
        let method = envelope.method.clone();

        let outcome = self.handle_request(envelope, session).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => {
                tracing::debug!(
                    event = "mcp_request_handled",
                    session_id = %session.id,
                    method = %method,
                    elapsed_ms,
                    "MCP request handled"
                );
                ResponseEnvelope::success(id, result)
            }
            Err(error) => {
                tracing::info!(
                    event = "mcp_request_failed",
                    session_id = %session.id,
                    method = %method,
                    code = error.code,
                    message = %error.message,
                    elapsed_ms,
                    "MCP request failed"
                );
                ResponseEnvelope::failure(id, error)
            }
        }
    }

    async fn handle_request(
        &self,
        envelope: RequestEnvelope,
        session: &Session,
    ) -> Result<Value, RpcError> {
        match envelope.method.as_str() {
            "initialize" => Ok(self.handle_initialize(&envelope.params, session)),
            "ping" => Ok(json!({ "status": "pong" })),
            "tools/list" => Ok(self.registry.list_payload()),
            "tools/call" => self.handle_tools_call(envelope.params, session).await,
            other => Err(RpcError::method_not_found(other)),
        }
    }

    fn handle_initialize(&self, params: &Map<String, Value>, session: &Session) -> Value {
        let capabilities = params
            .get("capabilities")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let client_info = params.get("clientInfo").cloned();
        if !self
            .sessions
            .record_initialize(&session.id, capabilities, client_info.clone())
        {
            tracing::warn!(
                event = "mcp_initialize_session_missing",
                session_id = %session.id,
                "Session vanished before initialize could be recorded"
            );
        }
        let client_name = client_info
            .as_ref()
            .and_then(|info| info.get("name"))
            .and_then(|name| name.as_str())
            .unwrap_or("unknown");
        tracing::info!(
            event = "mcp_session_initialized",
            session_id = %session.id,
            client = %client_name,
            "MCP client initialized"
        );
        initialize_payload()
    }

    async fn handle_tools_call(
        &self,
        params: Map<String, Value>,
        session: &Session,
    ) -> Result<Value, RpcError> {
        let name = match params.get("name") {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => {
                return Err(RpcError::invalid_params(
                    "tools/call requires string field 'name'",
                )
                .with_data(json!({ "field": "name" })));
            }
        };

        let arguments = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                )
                .with_data(json!({ "field": "arguments" })));
            }
        };

        let Some(descriptor) = self.registry.get(&name) else {
            return Err(RpcError::invalid_params(format!("Unknown tool: {name}"))
                .with_data(json!({ "field": "name", "received": name })));
        };

        if let Err(err) = descriptor.validate_arguments(&arguments) {
            return Err(RpcError::invalid_params(format!(
                "Invalid arguments for tool '{name}': {err}"
            ))
            .with_data(err.to_value()));
        }

        tracing::debug!(
            event = "mcp_tool_call_started",
            session_id = %session.id,
            tool = %name,
            "Invoking tool"
        );

        // The executor runs on its own task so a panic surfaces as a JoinError.
        let executor = Arc::clone(&self.executor);
        let tool = name.clone();
        let joined =
            tokio::spawn(async move { executor.call_tool(&tool, arguments).await }).await;

        match joined {
            Ok(Ok(content)) => Ok(json!({ "content": content })),
            Ok(Err(ToolExecutionError::UnknownTool(tool))) => {
                Err(RpcError::invalid_params(format!("Unknown tool: {tool}"))
                    .with_data(json!({ "field": "name", "received": tool })))
            }
            Ok(Err(err)) => {
                tracing::error!(
                    event = "mcp_tool_call_failed",
                    session_id = %session.id,
                    tool = %name,
                    error = %err,
                    "Tool execution failed"
                );
                Err(RpcError::internal(err.to_string()))
            }
            Err(join_err) => {
                let detail = if join_err.is_panic() {
                    format!("tool '{name}' panicked")
                } else {
                    format!("tool '{name}' was cancelled")
                };
                tracing::error!(
                    event = "mcp_tool_call_panicked",
                    session_id = %session.id,
                    tool = %name,
                    detail = %detail,
                    "Tool task did not complete"
                );
                Err(RpcError::internal(detail))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use kbeauty_core::jsonrpc::codes;
    use kbeauty_core::tool::{ToolContent, ToolDescriptor};

    use super::*;
    use crate::kbeauty::KBeautyExecutor;
    use crate::session::SessionPolicy;

    struct FaultyExecutor;

    #[async_trait]
    impl ToolExecutor for FaultyExecutor {
        fn list_tools(&self) -> Vec<ToolDescriptor> {
            vec![
                ToolDescriptor::new("explode", "panics", json!({ "type": "object" })),
                ToolDescriptor::new("fail", "errors", json!({ "type": "object" })),
            ]
        }

        async fn call_tool(
            &self,
            name: &str,
            _arguments: Map<String, Value>,
        ) -> Result<Vec<ToolContent>, ToolExecutionError> {
            match name {
                "explode" => panic!("boom"),
                "fail" => Err(ToolExecutionError::failed(name, "upstream unavailable")),
                other => Err(ToolExecutionError::UnknownTool(other.to_string())),
            }
        }
    }

    struct DuplicateExecutor;

    #[async_trait]
    impl ToolExecutor for DuplicateExecutor {
        fn list_tools(&self) -> Vec<ToolDescriptor> {
            let tool = ToolDescriptor::new("twin", "dup", json!({ "type": "object" }));
            vec![tool.clone(), tool]
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: Map<String, Value>,
        ) -> Result<Vec<ToolContent>, ToolExecutionError> {
            Ok(Vec::new())
        }
    }

    fn kbeauty() -> (Dispatcher, Session) {
        let sessions = SessionStore::new(SessionPolicy::unbounded());
        let session = sessions.create();
        let dispatcher =
            Dispatcher::new(Arc::new(KBeautyExecutor::new()), sessions).expect("valid catalog");
        (dispatcher, session)
    }

    fn request(id: i64, method: &str, params: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
    }

    async fn call_one(dispatcher: &Dispatcher, session: &Session, message: Value) -> Value {
        let mut responses = dispatcher.handle_incoming_message(message, session).await;
        assert_eq!(responses.len(), 1);
        responses.remove(0).to_value()
    }

    fn minimal_arguments(descriptor: &ToolDescriptor) -> Value {
        let properties = descriptor.input_schema["properties"].clone();
        let mut args = Map::new();
        for field in descriptor.required_arguments() {
            let schema = &properties[field];
            let value = if let Some(first) = schema["enum"].as_array().and_then(|v| v.first()) {
                first.clone()
            } else {
                match schema["type"].as_str() {
                    Some("array") => json!(["acne"]),
                    Some("number") | Some("integer") => json!(1),
                    Some("boolean") => json!(true),
                    _ => json!("sample"),
                }
            };
            args.insert(field.to_string(), value);
        }
        Value::Object(args)
    }

    #[tokio::test]
    async fn initialize_returns_stable_identity_and_records_client() {
        let (dispatcher, session) = kbeauty();
        let response = call_one(
            &dispatcher,
            &session,
            request(
                1,
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "roots": {} },
                    "clientInfo": { "name": "test-host", "version": "0.1" }
                }),
            ),
        )
        .await;

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "k-beauty-complete");
        assert_eq!(response["result"]["serverInfo"]["version"], "3.0.0");
        assert!(response["result"]["capabilities"]["tools"].is_object());

        let stored = dispatcher.sessions().get(&session.id).unwrap();
        assert!(stored.is_initialized());
        assert_eq!(stored.client_info.unwrap()["name"], "test-host");
    }

    #[tokio::test]
    async fn ping_works_before_initialize() {
        let (dispatcher, session) = kbeauty();
        let response = call_one(&dispatcher, &session, request(2, "ping", json!({}))).await;
        assert_eq!(response["result"], json!({ "status": "pong" }));
    }

    #[tokio::test]
    async fn every_listed_tool_accepts_its_required_arguments() {
        let (dispatcher, session) = kbeauty();
        let listed = call_one(&dispatcher, &session, request(1, "tools/list", json!({}))).await;
        let tools: Vec<ToolDescriptor> =
            serde_json::from_value(listed["result"]["tools"].clone()).unwrap();
        assert_eq!(tools.len(), 9);

        for (i, tool) in tools.iter().enumerate() {
            let response = call_one(
                &dispatcher,
                &session,
                request(
                    i as i64 + 10,
                    "tools/call",
                    json!({ "name": tool.name, "arguments": minimal_arguments(tool) }),
                ),
            )
            .await;
            assert!(
                response.get("error").is_none(),
                "{} failed: {response}",
                tool.name
            );
            let content = response["result"]["content"].as_array().unwrap();
            assert!(!content.is_empty());
            assert_eq!(content[0]["type"], "text");
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let (dispatcher, session) = kbeauty();
        let response = call_one(
            &dispatcher,
            &session,
            request(3, "tools/call", json!({ "name": "nope", "arguments": {} })),
        )
        .await;
        assert_eq!(response["id"], 3);
        assert_eq!(response["error"]["code"], codes::INVALID_PARAMS);
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let (dispatcher, session) = kbeauty();
        let response =
            call_one(&dispatcher, &session, request(4, "resources/list", json!({}))).await;
        assert_eq!(response["error"]["code"], codes::METHOD_NOT_FOUND);
        assert!(
            response["error"]["message"]
                .as_str()
                .unwrap()
                .contains("resources/list")
        );
    }

    #[tokio::test]
    async fn schema_violations_name_the_field() {
        let (dispatcher, session) = kbeauty();
        let missing = call_one(
            &dispatcher,
            &session,
            request(5, "tools/call", json!({ "name": "recommend_routine", "arguments": {} })),
        )
        .await;
        assert_eq!(missing["error"]["code"], codes::INVALID_PARAMS);
        assert_eq!(missing["error"]["data"]["field"], "skin_type");

        let outside_enum = call_one(
            &dispatcher,
            &session,
            request(
                6,
                "tools/call",
                json!({ "name": "recommend_routine", "arguments": { "skin_type": "scaly" } }),
            ),
        )
        .await;
        assert_eq!(outside_enum["error"]["code"], codes::INVALID_PARAMS);
        assert_eq!(outside_enum["error"]["data"]["received"], "scaly");

        let wrong_arguments = call_one(
            &dispatcher,
            &session,
            request(7, "tools/call", json!({ "name": "ping", "arguments": [] })),
        )
        .await;
        assert_eq!(wrong_arguments["error"]["data"]["field"], "arguments");
    }

    #[tokio::test]
    async fn executor_failure_and_panic_are_internal_errors() {
        let sessions = SessionStore::new(SessionPolicy::unbounded());
        let session = sessions.create();
        let dispatcher = Dispatcher::new(Arc::new(FaultyExecutor), sessions).unwrap();

        let failed = call_one(
            &dispatcher,
            &session,
            request(8, "tools/call", json!({ "name": "fail" })),
        )
        .await;
        assert_eq!(failed["error"]["code"], codes::INTERNAL_ERROR);
        assert_eq!(failed["error"]["message"], "Internal error");
        assert!(
            failed["error"]["data"]
                .as_str()
                .unwrap()
                .contains("upstream unavailable")
        );

        let panicked = call_one(
            &dispatcher,
            &session,
            request(9, "tools/call", json!({ "name": "explode" })),
        )
        .await;
        assert_eq!(panicked["id"], 9);
        assert_eq!(panicked["error"]["code"], codes::INTERNAL_ERROR);
        assert!(panicked["error"]["data"].as_str().unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let (dispatcher, session) = kbeauty();
        let responses = dispatcher
            .handle_incoming_message(
                json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
                &session,
            )
            .await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn batches_answer_requests_only() {
        let (dispatcher, session) = kbeauty();
        let responses = dispatcher
            .handle_incoming_message(
                json!([
                    request(1, "ping", json!({})),
                    { "jsonrpc": "2.0", "method": "notifications/cancelled" },
                    request(2, "tools/list", json!({})),
                    "garbage"
                ]),
                &session,
            )
            .await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].id(), &json!(1));
        assert_eq!(responses[1].id(), &json!(2));
        assert_eq!(responses[2].error().unwrap().code, codes::INVALID_REQUEST);

        let empty = dispatcher
            .handle_incoming_message(json!([]), &session)
            .await;
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].error().unwrap().code, codes::INVALID_REQUEST);
    }

    #[test]
    fn duplicate_catalog_is_rejected() {
        let err = Dispatcher::new(Arc::new(DuplicateExecutor), SessionStore::default())
            .expect_err("duplicate names");
        assert_eq!(err, RegistryError::DuplicateName("twin".to_string()));
    }
}
