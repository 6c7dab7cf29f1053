//! 应用状态

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// 全局 shutdown token，用于优雅关闭所有后台任务
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// 获取全局 shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN.get_or_init(CancellationToken::new).clone()
}

/// 触发全局 shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

use crate::config::{env::EnvConfig, load_pipelines_from_env, PipelineConfig};
use crate::infra::{DockerCli, WebhookNotifier};

use super::log_hub::LogHub;
use super::task_store::TaskStore;

/// 运行中的发布信息
pub struct RunningRelease {
    pub task_id: String,
    pub cancel_token: CancellationToken,
}

/// 应用状态
pub struct AppState {
    // ========== 核心配置 ==========
    /// API 密钥（用于验证请求）
    pub api_key: String,
    /// 环境配置
    pub config: EnvConfig,
    /// 流水线配置
    pub pipelines: HashMap<String, PipelineConfig>,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,

    // ========== 任务管理 ==========
    /// 任务存储
    pub task_store: TaskStore,
    /// 日志中心
    pub log_hub: LogHub,
    /// 每条流水线当前运行中的发布 (pipeline -> RunningRelease)
    pub running_releases: RwLock<HashMap<String, RunningRelease>>,

    // ========== 外部服务 ==========
    /// 状态回调客户端
    pub notifier: WebhookNotifier,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new() -> Self {
        let config = EnvConfig::from_env();
        let pipelines = load_pipelines_from_env();

        tracing::info!(
            api_key_len = config.api_key.len(),
            callback_url = ?config.callback_url,
            port = config.port,
            group_count = config.group_hosts.len(),
            pipeline_count = pipelines.len(),
            "Loaded configuration"
        );

        for (name, pipeline) in &pipelines {
            tracing::info!(
                pipeline = %name,
                image = %pipeline.image_ref(),
                build_group = %pipeline.build_group,
                run_group = %pipeline.run_group,
                container = ?pipeline.run.as_ref().map(|r| r.container_name.as_str()),
                "Registered pipeline"
            );
        }

        Self {
            api_key: config.api_key.clone(),
            pipelines,
            started_at: Utc::now(),

            task_store: TaskStore::new(),
            log_hub: LogHub::new(),
            running_releases: RwLock::new(HashMap::new()),

            notifier: WebhookNotifier::new(config.callback_url.clone()),

            config,
        }
    }

    /// 获取流水线配置
    pub fn get_pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.get(name)
    }

    /// 创建指向宿主机组 daemon 的 docker CLI 句柄
    pub fn docker_cli(&self, group: &str) -> DockerCli {
        self.config.docker_cli(group)
    }

    /// 检查流水线是否有正在运行的发布
    pub async fn has_running_release(&self, pipeline: &str) -> bool {
        let running = self.running_releases.read().await;
        running.contains_key(pipeline)
    }

    /// 注册运行中的发布
    pub async fn register_running_release(
        &self,
        pipeline: &str,
        task_id: &str,
    ) -> CancellationToken {
        let cancel_token = CancellationToken::new();
        let mut running = self.running_releases.write().await;
        running.insert(
            pipeline.to_string(),
            RunningRelease {
                task_id: task_id.to_string(),
                cancel_token: cancel_token.clone(),
            },
        );
        cancel_token
    }

    /// 取消注册运行中的发布
    pub async fn unregister_running_release(&self, pipeline: &str) {
        let mut running = self.running_releases.write().await;
        running.remove(pipeline);
    }

    /// 获取运行中的发布任务 ID
    pub async fn get_running_release_task_id(&self, pipeline: &str) -> Option<String> {
        let running = self.running_releases.read().await;
        running.get(pipeline).map(|r| r.task_id.clone())
    }

    /// 取消流水线的发布
    pub async fn cancel_release(&self, pipeline: &str) -> bool {
        let running = self.running_releases.read().await;
        if let Some(release) = running.get(pipeline) {
            release.cancel_token.cancel();
            true
        } else {
            false
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_running_release_registry() {
        let state = AppState::new();

        assert!(!state.has_running_release("webtest").await);

        let token = state.register_running_release("webtest", "task-1").await;
        assert!(state.has_running_release("webtest").await);
        assert_eq!(
            state.get_running_release_task_id("webtest").await,
            Some("task-1".to_string())
        );

        assert!(state.cancel_release("webtest").await);
        assert!(token.is_cancelled());

        state.unregister_running_release("webtest").await;
        assert!(!state.has_running_release("webtest").await);
        assert!(!state.cancel_release("webtest").await);
    }
}
