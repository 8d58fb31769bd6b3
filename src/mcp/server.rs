/// MCP server loop
///
/// Reads one JSON-RPC request per line from stdin, dispatches `tools/call` to
/// the tool functions and writes one response per line to stdout. Logs go to
/// stderr so they never corrupt the protocol stream.

use std::future::Future;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::mcp::protocol::*;
use crate::tools::{self, ToolError};
use crate::{HabitTrackerServer, ServerError};

/// MCP server wrapping the habit-sync context
pub struct McpServer {
    habit_tracker: HabitTrackerServer,
    initialized: bool,
}

impl McpServer {
    pub fn new(habit_tracker: HabitTrackerServer) -> Self {
        Self {
            habit_tracker,
            initialized: false,
        }
    }

    /// Serve JSON-RPC over stdin/stdout until stdin closes
    pub async fn run(&mut self) -> Result<(), ServerError> {
        info!("Starting MCP server, waiting for JSON-RPC requests...");

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut line = String::new();

        loop {
            line.clear();

            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("MCP server shutting down (stdin closed)");
                    break;
                }
                Ok(_) => {
                    if let Some(response) = self.handle_line(&line).await {
                        let response_str = serde_json::to_string(&response)?;

                        stdout.write_all(response_str.as_bytes()).await?;
                        stdout.write_all(b"\n").await?;
                        stdout.flush().await?;

                        debug!("Sent response: {}", response_str);
                    }
                }
                Err(e) => {
                    error!("Failed to read from stdin: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle one line of input; notifications and blank lines yield no response
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        debug!("Processing request: {}", line);

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse JSON-RPC request: {}", e);
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("Invalid JSON: {}", e),
                    None,
                ));
            }
        };

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request.method);
            return None;
        };

        Some(self.handle_request(id, request).await)
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "notifications/initialized" | "initialized" => self.initialized = true,
            other => debug!("Ignoring notification {}", other),
        }
    }

    async fn handle_request(&mut self, id: Value, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => Self::handle_initialize(id),
            "initialized" => {
                self.initialized = true;
                JsonRpcResponse::success(id, Value::Null)
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tool_definitions() })),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            _ => JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method '{}' not found", request.method),
                None,
            ),
        }
    }

    fn handle_initialize(id: Value) -> JsonRpcResponse {
        info!("MCP client connected");

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ServerInfo {
                name: "habit-sync".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        to_response(id, &result)
    }

    async fn handle_tools_call(&mut self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, "Missing parameters".to_string(), None);
        };
        let call: ToolCallParams = match serde_json::from_value(params) {
            Ok(call) => call,
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid parameters: {}", e),
                    None,
                );
            }
        };

        if !self.initialized {
            warn!("Tool {} called before the client finished initializing", call.name);
        }

        let result = self.call_tool(&call.name, call.arguments).await;
        to_response(id, &result)
    }

    async fn call_tool(&self, name: &str, args: Map<String, Value>) -> ToolCallResult {
        let server = &self.habit_tracker;
        match name {
            "habit_create" => invoke(args, |p| tools::create_habit(server, p)).await,
            "habit_list" => invoke(args, |p| tools::list_habits(server, p)).await,
            "habit_log" => invoke(args, |p| tools::log_habit(server, p)).await,
            "habit_unlog" => invoke(args, |p| tools::unlog_habit(server, p)).await,
            "habit_delete" => invoke(args, |p| tools::delete_habit(server, p)).await,
            "habit_logs" => invoke(args, |p| tools::habit_logs(server, p)).await,
            "todo_create" => invoke(args, |p| tools::create_todo(server, p)).await,
            "todo_list" => invoke(args, |p| tools::list_todos(server, p)).await,
            "todo_complete" => invoke(args, |p| tools::complete_todo(server, p)).await,
            "todo_delete" => invoke(args, |p| tools::delete_todo(server, p)).await,
            "timer_record" => invoke(args, |p| tools::record_timer(server, p)).await,
            "account_limits" => invoke(args, |p| tools::account_limits(server, p)).await,
            "account_sign_in" => invoke(args, |p| tools::account_sign_in(server, p)).await,
            "account_validate_migration" => invoke(args, |p| tools::account_validate_migration(server, p)).await,
            _ => ToolCallResult::error("unknown_tool", format!("Unknown tool: {}", name)),
        }
    }
}

/// Deserialize the arguments, run the tool and render its response as JSON text
async fn invoke<P, R, F, Fut>(args: Map<String, Value>, tool: F) -> ToolCallResult
where
    P: DeserializeOwned,
    R: Serialize,
    F: FnOnce(P) -> Fut,
    Fut: Future<Output = Result<R, ToolError>>,
{
    let params: P = match serde_json::from_value(Value::Object(args)) {
        Ok(params) => params,
        Err(e) => return ToolCallResult::error("invalid_params", format!("Invalid arguments: {}", e)),
    };

    match tool(params).await {
        Ok(response) => match serde_json::to_string_pretty(&response) {
            Ok(text) => ToolCallResult::success(text),
            Err(e) => ToolCallResult::error("internal", e.to_string()),
        },
        Err(e) => {
            debug!("Tool failed ({}): {}", e.kind(), e);
            ToolCallResult::error(e.kind(), e.to_string())
        }
    }
}

fn to_response<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string(), None),
    }
}

fn definition<P: JsonSchema>(name: &str, description: &str) -> ToolDefinition {
    let schema = schemars::schema_for!(P);
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: serde_json::to_value(schema).unwrap_or_else(|_| json!({ "type": "object" })),
    }
}

/// Tools advertised by `tools/list`
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        definition::<tools::CreateHabitParams>("habit_create", "Create a habit to track daily"),
        definition::<tools::ListHabitsParams>(
            "habit_list",
            "List habits with their streaks and whether a streak is at risk",
        ),
        definition::<tools::LogHabitParams>(
            "habit_log",
            "Log a habit for today or a given date; logging the same day again removes it",
        ),
        definition::<tools::UnlogHabitParams>("habit_unlog", "Remove the log of a habit on a given date"),
        definition::<tools::DeleteHabitParams>("habit_delete", "Delete a habit and its whole history"),
        definition::<tools::HabitLogsParams>("habit_logs", "List the logs of a habit, optionally within a date range"),
        definition::<tools::CreateTodoParams>("todo_create", "Add a todo"),
        definition::<tools::ListTodosParams>("todo_list", "List todos"),
        definition::<tools::CompleteTodoParams>("todo_complete", "Complete or reopen a todo"),
        definition::<tools::DeleteTodoParams>("todo_delete", "Delete a todo"),
        definition::<tools::RecordTimerParams>("timer_record", "Record a focus timer session"),
        definition::<tools::AccountLimitsParams>("account_limits", "Show plan limits and current usage"),
        definition::<tools::SignInParams>(
            "account_sign_in",
            "Sign in to an account; the first sign-in moves this device's data to it",
        ),
        definition::<tools::ValidateMigrationParams>(
            "account_validate_migration",
            "Check this device's data for records a migration would repair or skip",
        ),
    ]
}
