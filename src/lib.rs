//! Shipway Agent - 镜像发布代理
//!
//! 一条流水线 = 两段 play：构建组上 build/tag/push，运行组上 pull/run。

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod middleware;
pub mod services;
pub mod state;

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// 命令行运行时配置
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// 监听端口覆盖（优先于 PORT 环境变量）
    pub port_override: Option<u16>,
}

/// 初始化 tracing 订阅器
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("shipway_agent=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// 初始化并运行 HTTP agent
pub async fn init_and_run_agent_with_config(config: RuntimeConfig) {
    init_tracing();

    let state = Arc::new(AppState::new());
    let port = config.port_override.unwrap_or(state.config.port);

    let app = api::router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind listen address");
            return;
        }
    };

    tracing::info!(
        addr = %addr,
        version = config::env::constants::VERSION,
        "shipway-agent listening"
    );

    let shutdown = state::app_state::get_shutdown_token();

    // 周期性清理过期任务和日志通道
    let maintenance_state = state.clone();
    let maintenance_token = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = maintenance_token.cancelled() => break,
                _ = interval.tick() => {
                    maintenance_state.task_store.cleanup_stale().await;
                    maintenance_state.log_hub.cleanup_expired(24).await;
                    maintenance_state.log_hub.cleanup().await;
                }
            }
        }
    });

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
    {
        tracing::error!(error = %e, "Server error");
    }
}

/// 等待 Ctrl-C 或全局 shutdown
async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down");
            state::app_state::trigger_shutdown();
        }
        _ = token.cancelled() => {}
    }
}

/// 前台执行一条流水线并返回退出码
///
/// 日志直接落到终端，行为等价于通过 HTTP 触发一次发布后等待完成。
pub async fn run_pipeline_once(pipeline: &str) -> i32 {
    init_tracing();

    let state = Arc::new(AppState::new());

    let Some(config) = state.get_pipeline(pipeline).cloned() else {
        eprintln!(
            "Pipeline '{}' is not configured (set PIPELINE_{}_IMAGE)",
            pipeline,
            pipeline.to_uppercase().replace('-', "_")
        );
        return 2;
    };

    let task_id = uuid::Uuid::new_v4().to_string();
    let task = domain::release::ReleaseTask::new(task_id.clone(), pipeline.to_string());
    state.task_store.create(task).await;
    state.log_hub.create(&task_id).await;

    let Some(mut rx) = state.log_hub.subscribe(&task_id).await else {
        return 1;
    };
    state.register_running_release(pipeline, &task_id).await;

    // 日志打印到终端，stderr 流回到 stderr
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(line) => match line.stream.as_str() {
                    "stderr" => eprintln!("{}", line.content),
                    _ => println!("{}", line.content),
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    services::release::execute(
        state.clone(),
        task_id.clone(),
        pipeline.to_string(),
        config,
        api::release::TriggerRequest::default(),
    )
    .await;

    // 销毁日志通道让打印任务收尾
    state.log_hub.remove(&task_id).await;
    let _ = printer.await;

    state
        .task_store
        .get_any(&task_id)
        .await
        .and_then(|t| t.exit_code)
        .unwrap_or(1)
}
