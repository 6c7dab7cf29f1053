//! 发布上下文
//!
//! 统一的发布执行上下文，包含任务信息、日志通道等

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::domain::release::{LogLine, ReleaseStage, ReleaseStatus};
use crate::state::AppState;

/// 发布执行上下文
///
/// 封装发布过程中需要的所有状态和工具
#[derive(Clone)]
pub struct ReleaseContext {
    /// 任务 ID
    pub task_id: String,
    /// 流水线名称
    pub pipeline: String,
    /// 应用状态
    pub state: Arc<AppState>,
    /// 日志发送通道
    pub log_tx: Option<broadcast::Sender<LogLine>>,
    /// 取消令牌
    pub cancel_token: CancellationToken,
}

impl ReleaseContext {
    /// 发送日志
    pub async fn log(&self, stream: &str, content: &str) {
        let line = LogLine::new(stream, content);

        // 发送到本地广播
        if let Some(ref tx) = self.log_tx {
            let _ = tx.send(line.clone());
        }

        // 转发到回调端
        self.state.notifier.append_log(&self.task_id, &line).await;
    }

    /// 发送 stdout 日志
    pub async fn log_stdout(&self, content: &str) {
        self.log("stdout", content).await;
    }

    /// 发送 stderr 日志
    pub async fn log_stderr(&self, content: &str) {
        self.log("stderr", content).await;
    }

    /// 转发一条已生成的日志行（命令流式输出用）
    pub async fn forward(&self, line: LogLine) {
        if let Some(ref tx) = self.log_tx {
            let _ = tx.send(line.clone());
        }
        self.state.notifier.append_log(&self.task_id, &line).await;
    }

    /// 更新任务状态
    pub async fn update_status(&self, status: ReleaseStatus, exit_code: Option<i32>) {
        self.state
            .task_store
            .update_status(&self.task_id, status.clone(), exit_code)
            .await;

        // 通知回调端
        let _ = self
            .state
            .notifier
            .notify_status(&self.task_id, &self.pipeline, &status, exit_code.unwrap_or(-1))
            .await;
    }

    /// 更新任务阶段
    pub async fn update_stages(&self, stages: Vec<ReleaseStage>) {
        self.state
            .task_store
            .update_stages(&self.task_id, stages)
            .await;
    }

    /// 完成任务
    pub async fn finish(
        &self,
        status: ReleaseStatus,
        exit_code: Option<i32>,
        stages: Vec<ReleaseStage>,
    ) {
        // 更新阶段
        self.update_stages(stages.clone()).await;

        // 完成任务
        self.state
            .task_store
            .finish(&self.task_id, status.clone(), exit_code)
            .await;

        // 标记日志通道完成
        self.state.log_hub.finish(&self.task_id).await;

        // 取消注册运行中的发布
        self.state.unregister_running_release(&self.pipeline).await;

        // 通知回调端
        let _ = self
            .state
            .notifier
            .notify_status_with_stages(
                &self.task_id,
                &self.pipeline,
                &status,
                exit_code.unwrap_or(-1),
                &stages,
            )
            .await;
    }

    /// 检查是否被取消
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
