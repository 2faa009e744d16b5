use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use pipeline_core::audit::{write_json_array, AuditQuery, Selector};
use pipeline_core::item::ChangeItem;
use pipeline_core::workflow::Pipeline;
use pipeline_core::PipelineError;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/items: Every change item, decoded where possible.
pub async fn list_items(State(app): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let ledger = app.ledger.clone();
    let bytes = tokio::task::spawn_blocking(move || {
        let audit = AuditQuery::new(&ledger);
        let mut out = Vec::new();
        write_json_array(&mut out, audit.list_all(&Selector::default())?)?;
        Ok::<_, PipelineError>(out)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}

/// GET /api/items/{item_type}/{item_number}: One change item.
pub async fn get_item(
    State(app): State<AppState>,
    Path((item_type, item_number)): Path<(String, String)>,
) -> Result<Json<ChangeItem>, AppError> {
    let ledger = app.ledger.clone();
    let workflow = app.config.workflow.clone();
    let item = tokio::task::spawn_blocking(move || {
        Pipeline::new(&ledger, workflow).get(&item_type, &item_number)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(item))
}

/// GET /api/items/{item_type}/{item_number}/history: Committed versions,
/// oldest first.
pub async fn item_history(
    State(app): State<AppState>,
    Path((item_type, item_number)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let ledger = app.ledger.clone();
    let bytes = tokio::task::spawn_blocking(move || {
        let audit = AuditQuery::new(&ledger);
        let mut out = Vec::new();
        write_json_array(&mut out, audit.history_of(&item_type, &item_number)?)?;
        Ok::<_, PipelineError>(out)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}
