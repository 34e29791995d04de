//! Cache namespace listing

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use shellcache_db::utils::format_bytes;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct NamespaceResponse {
    pub name: String,
    pub created_at: String,
    pub entry_count: i64,
    pub total_size: i64,
    pub total_size_human: String,
    /// Survives the next activation
    pub retained: bool,
}

/// GET /_shellcache/namespaces
async fn list_namespaces(
    State(state): State<AppState>,
) -> Result<Json<Vec<NamespaceResponse>>, ApiError> {
    let retained = state.config.retained_namespaces();
    let namespaces = state.store.list_namespaces().await?;

    Ok(Json(
        namespaces
            .into_iter()
            .map(|ns| NamespaceResponse {
                retained: retained.contains(&ns.name.as_str()),
                created_at: ns.created_at.to_rfc3339(),
                total_size_human: format_bytes(ns.total_size),
                name: ns.name,
                entry_count: ns.entry_count,
                total_size: ns.total_size,
            })
            .collect(),
    ))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/_shellcache/namespaces", get(list_namespaces))
}
