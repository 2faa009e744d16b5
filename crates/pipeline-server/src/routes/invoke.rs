use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct InvokeBody {
    #[serde(default)]
    pub args: Vec<String>,
}

/// POST /api/invoke/{function}: Run a ledger function with ordered args.
///
/// Responds with the function's raw result: the stored record for
/// transitions and `get`, a JSON array for `list_all` and `history_of`.
pub async fn invoke_function(
    State(app): State<AppState>,
    Path(function): Path<String>,
    Json(body): Json<InvokeBody>,
) -> Result<impl IntoResponse, AppError> {
    let ledger = app.ledger.clone();
    let workflow = app.config.workflow.clone();
    let bytes = tokio::task::spawn_blocking(move || {
        pipeline_core::dispatch::invoke(&ledger, &workflow, &function, &body.args)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}

/// GET /api/functions: Callable functions and their argument names.
pub async fn list_functions() -> Json<serde_json::Value> {
    let functions: Vec<serde_json::Value> = pipeline_core::dispatch::FUNCTIONS
        .iter()
        .map(|(name, args)| serde_json::json!({ "name": name, "args": args }))
        .collect();
    Json(serde_json::json!(functions))
}
