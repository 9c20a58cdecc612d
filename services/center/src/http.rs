//! Center admin/observability HTTP surface, served over TCP (unlike the
//! edge's same-host Unix-domain IPC, since the center is a single logical
//! service other hosts reach over the network).
//!
//! Routes:
//! - `GET  /healthz` / `GET /readyz`
//! - `GET  /edges/{edge_id}/key/{key}` — read a key from that edge's
//!   namespaced view
//! - `PUT  /edges/{edge_id}/key/{key}` — write it, which republishes a
//!   changelog back to the originating edge (§4.8's `EdgeView::set`)
//! - `GET  /edges/{edge_id}/bind/{key}` — trigger a Bind read-through
//!   (§4.9) against that edge's standing Bind stream, if configured

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use edgekv::store::Store;
use edgekv::CenterNode;
use edgekv_proto::Value;

use crate::bind_client::BindClients;

#[derive(Clone)]
pub struct HttpState {
    pub center: Arc<CenterNode>,
    pub bind_clients: Arc<BindClients>,
}

pub fn router(center: Arc<CenterNode>, bind_clients: Arc<BindClients>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/edges/{edge_id}/key/{key}", get(get_key).put(put_key))
        .route("/edges/{edge_id}/bind/{key}", get(get_bind))
        .with_state(HttpState { center, bind_clients })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<HttpState>) -> impl IntoResponse {
    match state.center.store().keys().await {
        Ok(_) => (axum::http::StatusCode::OK, "ready"),
        Err(_) => (axum::http::StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

async fn get_key(
    State(state): State<HttpState>,
    Path((edge_id, key)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, axum::http::StatusCode> {
    let view = state.center.open_edge(edge_id);
    let (value, present) = view
        .get(&key)
        .await
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "value": value, "present": present })))
}

async fn put_key(
    State(state): State<HttpState>,
    Path((edge_id, key)): Path<(String, String)>,
    body: Bytes,
) -> Result<&'static str, axum::http::StatusCode> {
    let value: Value = serde_json::from_slice(&body).map_err(|_| axum::http::StatusCode::BAD_REQUEST)?;
    let view = state.center.open_edge(edge_id);
    view.set(&key, value)
        .await
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok("ok")
}

async fn get_bind(
    State(state): State<HttpState>,
    Path((edge_id, key)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, axum::http::StatusCode> {
    let client = state
        .bind_clients
        .get(&edge_id)
        .ok_or(axum::http::StatusCode::NOT_FOUND)?;
    let (value, found) = client
        .get_bind(&key)
        .await
        .map_err(|_| axum::http::StatusCode::GATEWAY_TIMEOUT)?;
    Ok(Json(json!({ "value": value, "found": found })))
}
