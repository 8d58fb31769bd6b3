/// Todo tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::{NewTodo, Todo, TodoId};
use crate::limits::{FeatureLimitPolicy, Resource};
use crate::tools::{DeleteResponse, ToolError};
use crate::HabitTrackerServer;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTodoParams {
    /// What needs doing, at most 500 characters
    pub content: String,
    /// Create the todo already completed (defaults to false)
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct TodoResponse {
    pub success: bool,
    pub todo: Todo,
    pub message: String,
}

/// Create a todo after checking the plan's todo limit
pub async fn create_todo(server: &HabitTrackerServer, params: CreateTodoParams) -> Result<TodoResponse, ToolError> {
    let identity = server.identity();
    let usage = server.repository().usage(&identity).await?;
    FeatureLimitPolicy::check(&server.limits(), Resource::Todos, usage.todos)?;

    let todo = server
        .repository()
        .create_todo(
            &identity,
            NewTodo {
                content: params.content,
                is_completed: params.is_completed,
            },
        )
        .await?;

    Ok(TodoResponse {
        success: true,
        message: format!("Added todo: {}", todo.content),
        todo,
    })
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListTodosParams {
    /// Leave out completed todos (defaults to false)
    #[serde(default)]
    pub open_only: bool,
}

#[derive(Debug, Serialize)]
pub struct ListTodosResponse {
    pub todos: Vec<Todo>,
    pub open: usize,
    pub message: String,
}

pub async fn list_todos(server: &HabitTrackerServer, params: ListTodosParams) -> Result<ListTodosResponse, ToolError> {
    let mut todos = server.repository().list_todos(&server.identity()).await?;
    let total = todos.len();
    let open = todos.iter().filter(|t| !t.is_completed).count();
    if params.open_only {
        todos.retain(|t| !t.is_completed);
    }

    Ok(ListTodosResponse {
        message: format!("{} open of {} todos", open, total),
        todos,
        open,
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompleteTodoParams {
    pub todo_id: String,
    /// Pass false to reopen the todo (defaults to true)
    pub completed: Option<bool>,
}

pub async fn complete_todo(server: &HabitTrackerServer, params: CompleteTodoParams) -> Result<TodoResponse, ToolError> {
    let todo_id = TodoId::from_string(&params.todo_id)?;
    let completed = params.completed.unwrap_or(true);

    let todo = server
        .repository()
        .set_todo_completed(&server.identity(), &todo_id, completed)
        .await?;

    Ok(TodoResponse {
        success: true,
        message: if todo.is_completed {
            format!("Completed: {}", todo.content)
        } else {
            format!("Reopened: {}", todo.content)
        },
        todo,
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteTodoParams {
    pub todo_id: String,
}

pub async fn delete_todo(server: &HabitTrackerServer, params: DeleteTodoParams) -> Result<DeleteResponse, ToolError> {
    let todo_id = TodoId::from_string(&params.todo_id)?;
    server.repository().delete_todo(&server.identity(), &todo_id).await?;

    Ok(DeleteResponse {
        success: true,
        message: format!("Deleted todo {}", todo_id),
    })
}
