//! The Edit RPC of §6, realized as an `axum` router over JSON bodies.
//! Handlers stay thin: deserialize, call into the coordinator (C6) or
//! store (C5), and let [`CoreError`]'s `IntoResponse` impl do the §6
//! error-code mapping.

use crate::address::Address;
use crate::coordinator::{Coordinator, UpdateRequest};
use crate::error::CoreError;
use crate::model::CellView;
use crate::store::CellStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CellStore>,
    pub coordinator: Arc<Coordinator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workbooks", post(create_workbook))
        .route("/workbooks/:workbook_id/sheets", post(create_sheet))
        .route("/sheets/:sheet_id/cells", get(list_cells))
        .route("/sheets/:sheet_id/cells/batch", post(batch_update))
        .route(
            "/sheets/:sheet_id/cells/:addr",
            put(update_cell).get(get_cell),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct CreateWorkbookRequest {
    name: String,
}

#[derive(Serialize)]
struct CreateWorkbookResponse {
    id: Uuid,
}

async fn create_workbook(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkbookRequest>,
) -> Json<CreateWorkbookResponse> {
    let id = state.store.create_workbook(req.name);
    Json(CreateWorkbookResponse { id })
}

#[derive(Deserialize)]
struct CreateSheetRequest {
    name: String,
    row_count: Option<u32>,
    column_count: Option<u32>,
}

#[derive(Serialize)]
struct CreateSheetResponse {
    id: Uuid,
}

async fn create_sheet(
    State(state): State<AppState>,
    Path(workbook_id): Path<Uuid>,
    Json(req): Json<CreateSheetRequest>,
) -> Result<Json<CreateSheetResponse>, CoreError> {
    let id = state.store.create_sheet(
        workbook_id,
        req.name,
        req.row_count.unwrap_or(crate::model::DEFAULT_ROW_COUNT),
        req.column_count.unwrap_or(crate::model::DEFAULT_COLUMN_COUNT),
    )?;
    Ok(Json(CreateSheetResponse { id }))
}

#[derive(Deserialize)]
struct CellBody {
    value: String,
}

/// `UPDATE_CELL`. Returns the updated `CellView`, or 204 when the edit
/// cleared the cell (or cleared nothing).
async fn update_cell(
    State(state): State<AppState>,
    Path((sheet_id, addr)): Path<(Uuid, String)>,
    Json(body): Json<CellBody>,
) -> Result<(StatusCode, Json<Option<CellView>>), CoreError> {
    let addr = Address::decode(&addr)?;
    let result = state
        .coordinator
        .update(
            sheet_id,
            UpdateRequest {
                row: addr.row,
                col: addr.col,
                value: body.value,
            },
        )
        .await?;
    match result {
        Some(view) => Ok((StatusCode::OK, Json(Some(view)))),
        None => Ok((StatusCode::NO_CONTENT, Json(None))),
    }
}

/// `GET_CELL`.
async fn get_cell(
    State(state): State<AppState>,
    Path((sheet_id, addr)): Path<(Uuid, String)>,
) -> Result<Json<CellView>, CoreError> {
    let addr = Address::decode(&addr)?;
    let cell = state
        .store
        .get(sheet_id, addr)?
        .ok_or_else(|| CoreError::NotFound(format!("cell {addr}")))?;
    Ok(Json(CellView::from(&cell)))
}

/// `LIST_CELLS`.
async fn list_cells(
    State(state): State<AppState>,
    Path(sheet_id): Path<Uuid>,
) -> Result<Json<Vec<CellView>>, CoreError> {
    let mut cells = state.store.list(sheet_id)?;
    cells.sort_by_key(|c| (c.addr.row, c.addr.col));
    Ok(Json(cells.iter().map(CellView::from).collect()))
}

#[derive(Deserialize)]
struct BatchEntry {
    addr: String,
    value: String,
}

/// `BATCH_UPDATE`. Applies each edit sequentially; per-cell failures are
/// logged (inside the coordinator) and do not abort the batch.
async fn batch_update(
    State(state): State<AppState>,
    Path(sheet_id): Path<Uuid>,
    Json(entries): Json<Vec<BatchEntry>>,
) -> Result<Json<Vec<CellView>>, CoreError> {
    let mut requests = Vec::with_capacity(entries.len());
    for entry in entries {
        let addr = Address::decode(&entry.addr)?;
        requests.push(UpdateRequest {
            row: addr.row,
            col: addr.col,
            value: entry.value,
        });
    }
    let results = state.coordinator.batch_update(sheet_id, requests).await;
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeNotifier;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn build_state() -> AppState {
        let store = Arc::new(CellStore::new());
        let coordinator = Arc::new(Coordinator::new(store.clone(), ChangeNotifier::new(64)));
        AppState { store, coordinator }
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn full_workbook_sheet_cell_flow() {
        let app = router(build_state());

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/workbooks")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"My Workbook"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let workbook_id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/workbooks/{workbook_id}/sheets"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Sheet1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let sheet_id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/sheets/{sheet_id}/cells/A1"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"value":"10"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/sheets/{sheet_id}/cells/A1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["computed"], "10");
    }

    #[tokio::test]
    async fn get_unknown_cell_is_not_found() {
        let state = build_state();
        let wb = state.store.create_workbook("wb".to_string());
        let sheet = state
            .store
            .create_sheet(wb, "Sheet1".to_string(), 1000, 26)
            .unwrap();
        let app = router(state);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/sheets/{sheet}/cells/A1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
