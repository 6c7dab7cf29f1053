//! 健康检查和系统状态 API
//!
//! 包含 /health, /status, /pipelines 端点

use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::error::ApiResult;
use crate::middleware::RequireApiKey;
use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    hostname: String,
    timestamp: String,
    started_at: String,
    uptime_secs: i64,
    pipelines: Vec<String>,
    active_releases: usize,
    active_pipelines: Vec<String>,
    callback_configured: bool,
}

/// 创建健康检查路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(health_check))
        .route("/pipelines", get(list_pipelines))
}

/// 健康检查 - 返回状态、版本、运行时间等信息
///
/// GET /health, GET /status
/// 无需认证
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (active_count, active_pipelines) = {
        let running = state.running_releases.read().await;
        let count = running.len();
        let pipelines: Vec<String> = running.keys().cloned().collect();
        (count, pipelines)
    };

    let pipelines: Vec<String> = state.pipelines.keys().cloned().collect();

    let now = chrono::Utc::now();
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    Json(HealthResponse {
        status: "ok",
        service: "shipway-agent",
        version: VERSION,
        hostname,
        timestamp: now.to_rfc3339(),
        started_at: state.started_at.to_rfc3339(),
        uptime_secs: (now - state.started_at).num_seconds(),
        pipelines,
        active_releases: active_count,
        active_pipelines,
        callback_configured: state.notifier.has_callback(),
    })
}

/// 列出配置的流水线
///
/// GET /pipelines
/// 需要 API Key 认证
async fn list_pipelines(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let pipelines: Vec<&String> = state.pipelines.keys().collect();
    Ok(Json(serde_json::json!({ "pipelines": pipelines })))
}
