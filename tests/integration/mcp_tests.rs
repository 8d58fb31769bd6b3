/// MCP surface: JSON-RPC handling and tool calls end to end
use std::sync::Arc;

use habit_sync::mcp::McpServer;
use habit_sync::*;
use serde_json::{json, Value};

use crate::support::local_store;

#[cfg(test)]
mod mcp_integration_tests {
    use super::*;

    async fn server() -> McpServer {
        let (_, local) = local_store();
        let remote = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let tracker = HabitTrackerServer::new(local, remote, None, false).await.unwrap();
        McpServer::new(tracker)
    }

    async fn request(server: &mut McpServer, method: &str, params: Value) -> Value {
        let line = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}).to_string();
        let response = server.handle_line(&line).await.expect("requests get a response");
        serde_json::to_value(response).unwrap()
    }

    /// Call a tool; returns the parsed response body or the error text
    async fn call(server: &mut McpServer, name: &str, arguments: Value) -> Result<Value, String> {
        let response = request(server, "tools/call", json!({"name": name, "arguments": arguments})).await;
        let result = &response["result"];
        let text = result["content"][0]["text"].as_str().unwrap().to_string();
        if result["isError"] == json!(true) {
            Err(text)
        } else {
            Ok(serde_json::from_str(&text).unwrap())
        }
    }

    #[tokio::test]
    async fn test_initialize_and_tool_list() {
        let mut server = server().await;

        let response = request(&mut server, "initialize", json!({})).await;
        assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(response["result"]["serverInfo"]["name"], "habit-sync");

        let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
        assert!(server.handle_line(&notification).await.is_none());

        let response = request(&mut server, "tools/list", json!({})).await;
        let tools = response["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        for expected in [
            "habit_create",
            "habit_list",
            "habit_log",
            "habit_unlog",
            "habit_delete",
            "habit_logs",
            "todo_create",
            "todo_list",
            "todo_complete",
            "todo_delete",
            "timer_record",
            "account_limits",
            "account_sign_in",
            "account_validate_migration",
        ] {
            assert!(names.contains(&expected), "missing tool {}", expected);
        }

        let create = tools.iter().find(|t| t["name"] == "habit_create").unwrap();
        assert!(create["inputSchema"]["properties"]["emoji"].is_object());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let mut server = server().await;

        let response = server.handle_line("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, -32700);

        let response = request(&mut server, "resources/list", json!({})).await;
        assert_eq!(response["error"]["code"], -32601);

        let err = call(&mut server, "habit_teleport", json!({})).await.unwrap_err();
        assert!(err.contains("unknown_tool"));

        let err = call(&mut server, "habit_log", json!({"date": "2024-01-01"})).await.unwrap_err();
        assert!(err.contains("invalid_params"));
    }

    #[tokio::test]
    async fn test_habit_log_toggle_through_tools() {
        let mut server = server().await;

        let created = call(&mut server, "habit_create", json!({"emoji": "📚", "start_date": "2024-01-01"}))
            .await
            .unwrap();
        let habit_id = created["habit_id"].as_str().unwrap().to_string();

        for day in ["2024-01-01", "2024-01-02"] {
            let logged = call(&mut server, "habit_log", json!({"habit_id": habit_id, "date": day}))
                .await
                .unwrap();
            assert_eq!(logged["logged"], true);
        }

        let toggled = call(&mut server, "habit_log", json!({"habit_id": habit_id, "date": "2024-01-02"}))
            .await
            .unwrap();
        assert_eq!(toggled["logged"], false);
        assert_eq!(toggled["current_streak"], 1);
        assert_eq!(toggled["longest_streak"], 2);

        let listed = call(&mut server, "habit_list", json!({"as_of": "2024-01-03"})).await.unwrap();
        assert_eq!(listed["habits"][0]["status"], "at_risk");
        assert_eq!(listed["habits"][0]["current_streak"], 1);

        let err = call(&mut server, "habit_unlog", json!({"habit_id": habit_id, "date": "2024-01-05"}))
            .await
            .unwrap_err();
        assert!(err.contains("not_found"));

        let logs = call(
            &mut server,
            "habit_logs",
            json!({"habit_id": habit_id, "start_date": "2024-01-01"}),
        )
        .await
        .unwrap();
        assert_eq!(logs["logs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fourth_todo_rejected_by_precheck() {
        let mut server = server().await;

        let signed_in = call(&mut server, "account_sign_in", json!({"user_id": "user_free"}))
            .await
            .unwrap();
        assert_eq!(signed_in["identity"]["kind"], "authenticated");

        for content in ["One", "Two", "Three"] {
            call(&mut server, "todo_create", json!({"content": content})).await.unwrap();
        }
        let err = call(&mut server, "todo_create", json!({"content": "Four"})).await.unwrap_err();
        assert!(err.contains("quota_exceeded"));

        let limits = call(&mut server, "account_limits", json!({})).await.unwrap();
        assert_eq!(limits["tier"], "free");
        assert_eq!(limits["usage"]["todos"], 3);
        assert_eq!(limits["limits"]["maxTodos"], 3);
    }

    #[tokio::test]
    async fn test_repository_itself_does_not_enforce_limits() {
        let repo = crate::support::repository();
        let user = Identity::Authenticated("user_free".to_string());

        for content in ["One", "Two", "Three", "Four"] {
            repo.create_todo(&user, NewTodo::open(content)).await.unwrap();
        }
        assert_eq!(repo.list_todos(&user).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_sign_in_migrates_device_data() {
        let mut server = server().await;

        call(&mut server, "habit_create", json!({"emoji": "🧘"})).await.unwrap();
        call(&mut server, "todo_create", json!({"content": "Stretch"})).await.unwrap();
        call(&mut server, "timer_record", json!({"duration_seconds": 600})).await.unwrap();

        let validation = call(&mut server, "account_validate_migration", json!({})).await.unwrap();
        assert_eq!(validation["isValid"], true);

        let signed_in = call(&mut server, "account_sign_in", json!({"user_id": "user_new"}))
            .await
            .unwrap();
        let migration = &signed_in["migration"];
        assert_eq!(migration["success"], true);
        assert_eq!(migration["migratedCounts"]["habits"], 1);
        assert_eq!(migration["migratedCounts"]["todos"], 1);

        let listed = call(&mut server, "habit_list", json!({})).await.unwrap();
        assert_eq!(listed["habits"].as_array().unwrap().len(), 1);
        assert_eq!(listed["habits"][0]["current_streak"], 0);

        let todos = call(&mut server, "todo_list", json!({})).await.unwrap();
        let todo_id = todos["todos"][0]["id"].as_str().unwrap().to_string();
        let done = call(&mut server, "todo_complete", json!({"todo_id": todo_id})).await.unwrap();
        assert_eq!(done["todo"]["is_completed"], true);
        call(&mut server, "todo_delete", json!({"todo_id": todo_id})).await.unwrap();

        // Signing in again does not migrate a second time
        let again = call(&mut server, "account_sign_in", json!({"user_id": "user_new"}))
            .await
            .unwrap();
        assert!(again["migration"].is_null());
    }
}
