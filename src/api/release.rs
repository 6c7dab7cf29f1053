//! 发布管理 API
//!
//! 包含 /trigger/:pipeline, /tasks/*, /logs/*, /pipelines/* 端点

use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::release::{PortBinding, ReleaseTask};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequireApiKey;
use crate::services;
use crate::state::AppState;

/// 触发发布请求
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TriggerRequest {
    /// 发布日志 ID（来自回调端，存在时作为 task_id）
    pub release_log_id: Option<String>,
    /// 覆盖流水线配置的镜像 tag
    pub tag: Option<String>,
}

/// 触发发布响应
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub task_id: String,
    pub pipeline: String,
    pub status: String,
    pub stream_url: String,
}

/// 任务历史查询参数
#[derive(Debug, Deserialize)]
pub struct TaskHistoryQuery {
    /// 返回数量限制，默认 20
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// 流水线名称过滤
    pub pipeline: Option<String>,
    /// 状态过滤 (success, failed, running)
    pub status: Option<String>,
}

fn default_limit() -> usize {
    20
}

/// 任务历史响应
#[derive(Debug, Serialize)]
pub struct TaskHistoryResponse {
    pub tasks: Vec<ReleaseTask>,
    pub total: usize,
}

/// 取消发布响应
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub pipeline: String,
    pub task_id: String,
    pub cancelled: bool,
}

/// 创建发布管理路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trigger/:pipeline", post(trigger_release))
        .route("/tasks/:task_id", get(get_task_status))
        .route("/tasks/recent", get(get_recent_tasks))
        .route("/logs/:task_id/stream", get(stream_logs))
        .route("/pipelines/:name/config", get(get_pipeline_config))
        .route("/pipelines/:name/cancel", post(cancel_release))
}

/// 触发发布
///
/// POST /trigger/:pipeline
/// 需要 API Key
///
/// 注意：实际的发布逻辑在 services/release 模块中
/// 此 handler 仅负责请求验证和任务创建
async fn trigger_release(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(pipeline): Path<String>,
    Json(request): Json<TriggerRequest>,
) -> ApiResult<impl IntoResponse> {
    // 检查流水线是否存在
    let pipeline_config = state
        .get_pipeline(&pipeline)
        .ok_or_else(|| ApiError::not_found(format!("Pipeline '{}'", pipeline)))?
        .clone();

    // 同一条流水线一次只允许一个发布
    if state.has_running_release(&pipeline).await {
        let running = state.get_running_release_task_id(&pipeline).await;
        return Err(ApiError::conflict(format!(
            "Pipeline '{}' already has a running release{}",
            pipeline,
            running
                .map(|id| format!(" (task {})", id))
                .unwrap_or_default()
        )));
    }

    // 活跃任务上限保护
    if state.task_store.is_at_capacity().await {
        return Err(ApiError::conflict("Too many active release tasks"));
    }

    // 使用传入的 release_log_id 作为 task_id（如果有的话），否则生成新的
    let task_id = request
        .release_log_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // 创建任务
    let task = ReleaseTask::new(task_id.clone(), pipeline.clone());
    state.task_store.create(task).await;

    // 创建日志通道
    let _log_tx = state.log_hub.create(&task_id).await;

    // 注册运行中的发布
    let _cancel_token = state.register_running_release(&pipeline, &task_id).await;

    // 构建响应数据
    let response = TriggerResponse {
        task_id: task_id.clone(),
        pipeline: pipeline.clone(),
        status: "running".to_string(),
        stream_url: format!("/logs/{}/stream", task_id),
    };

    // 在后台执行发布（非阻塞）
    let state_clone = state.clone();
    let task_id_clone = task_id.clone();
    let pipeline_clone = pipeline.clone();
    tokio::spawn(async move {
        services::release::execute(
            state_clone,
            task_id_clone,
            pipeline_clone,
            pipeline_config,
            request,
        )
        .await;
    });

    // 返回响应
    Ok(Json(response))
}

/// 取消运行中的发布
///
/// POST /pipelines/:name/cancel
/// 需要 API Key
async fn cancel_release(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task_id = state
        .get_running_release_task_id(&name)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Running release for '{}'", name)))?;

    let cancelled = state.cancel_release(&name).await;

    Ok(Json(CancelResponse {
        pipeline: name,
        task_id,
        cancelled,
    }))
}

/// 获取任务状态
///
/// GET /tasks/:task_id
/// 无需认证
///
/// 注意：查询活跃任务和历史记录，已完成的任务也可以查到
async fn get_task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    // 使用 get_any 同时查询活跃任务和历史记录
    let task = state
        .task_store
        .get_any(&task_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Task '{}'", task_id)))?;

    Ok(Json(task))
}

/// 获取最近的任务历史
///
/// GET /tasks/recent
/// 无需认证
async fn get_recent_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskHistoryQuery>,
) -> impl IntoResponse {
    let history = state
        .task_store
        .get_history(query.limit, query.pipeline.as_deref(), query.status.as_deref())
        .await;

    // 获取运行中的任务
    let running_tasks = state.task_store.get_all().await;

    // 合并运行中的任务和历史任务
    let mut all_tasks: Vec<ReleaseTask> = running_tasks
        .into_iter()
        .filter(|task| !task.status.is_terminal())
        .collect();

    // 添加历史任务
    all_tasks.extend(history);

    // 应用过滤器
    let filtered: Vec<ReleaseTask> = all_tasks
        .into_iter()
        .filter(|task| {
            let pipeline_match = query
                .pipeline
                .as_ref()
                .map_or(true, |p| task.pipeline == *p);
            let status_match = query
                .status
                .as_ref()
                .map_or(true, |s| task.status.as_str() == s);
            pipeline_match && status_match
        })
        .take(query.limit)
        .collect();

    let total = filtered.len();

    Json(TaskHistoryResponse {
        tasks: filtered,
        total,
    })
}

/// 流式日志
///
/// GET /logs/:task_id/stream
/// 无需认证
async fn stream_logs(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // 获取日志通道
    let mut rx = state.log_hub.subscribe(&task_id).await.ok_or_else(|| {
        ApiError::not_found(format!("Task '{}' not found or already completed", task_id))
    })?;

    let state_clone = state.clone();
    let task_id_clone = task_id.clone();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(log_line) => {
                    let json = serde_json::to_string(&log_line).unwrap_or_default();
                    yield Ok(Event::default().data(json));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(task_id = %task_id_clone, lagged = n, "Log subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    // 发送结束事件
                    if let Some(task) = state_clone.task_store.get_any(&task_id_clone).await {
                        let status = task.status.as_str();
                        yield Ok(Event::default().event("complete").data(
                            serde_json::json!({
                                "status": status,
                                "exit_code": task.exit_code
                            }).to_string()
                        ));
                    }
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    ))
}

/// 流水线配置响应
#[derive(Debug, Serialize)]
pub struct PipelineConfigResponse {
    pub name: String,
    pub image: String,
    pub tag: String,
    pub build_group: String,
    pub run_group: String,
    pub context_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub ports: Vec<PortBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
}

/// 获取流水线配置
///
/// GET /pipelines/:name/config
/// 无需认证
async fn get_pipeline_config(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let config = state
        .get_pipeline(&name)
        .ok_or_else(|| ApiError::not_found(format!("Pipeline '{}'", name)))?;

    Ok(Json(PipelineConfigResponse {
        name: name.clone(),
        image: config.image.clone(),
        tag: config.tag.clone(),
        build_group: config.build_group.clone(),
        run_group: config.run_group.clone(),
        context_dir: config.build.context_dir.clone(),
        dockerfile: config.build.dockerfile.clone(),
        container: config.run.as_ref().map(|r| r.container_name.clone()),
        ports: config
            .run
            .as_ref()
            .map(|r| r.ports.clone())
            .unwrap_or_default(),
        restart: config.run.as_ref().map(|r| r.restart.as_arg().to_string()),
    }))
}
