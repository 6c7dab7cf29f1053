//! 发布服务模块
//!
//! 一次发布依次执行两段 play：构建组上 build/tag/push，
//! 成功后在运行组上 pull/replace/verify。任一步失败即终止，
//! 剩余阶段标记为 skipped。

pub mod build;
pub mod context;
pub mod rollout;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::release::TriggerRequest;
use crate::config::env::constants::{HEARTBEAT_INTERVAL_SECS, RELEASE_TIMEOUT_SECS};
use crate::config::PipelineConfig;
use crate::domain::release::{ReleaseStatus, StageStatus};
use crate::state::AppState;

pub use context::ReleaseContext;

/// 执行发布任务
///
/// 这是发布的主入口点，按流水线配置依次执行两段 play
pub async fn execute(
    state: Arc<AppState>,
    task_id: String,
    pipeline: String,
    config: PipelineConfig,
    request: TriggerRequest,
) {
    // tag 可在触发时覆盖（如发布某个具体版本）
    let mut config = config;
    if let Some(tag) = request.tag {
        config.tag = tag;
    }

    // 获取日志通道
    let log_tx = state.log_hub.get_sender(&task_id).await;
    let cancel_token = state
        .running_releases
        .read()
        .await
        .get(&pipeline)
        .map(|r| r.cancel_token.clone())
        .unwrap_or_else(CancellationToken::new);

    // 创建发布上下文
    let ctx = ReleaseContext {
        task_id: task_id.clone(),
        pipeline: pipeline.clone(),
        state: state.clone(),
        log_tx,
        cancel_token: cancel_token.clone(),
    };

    // 启动心跳任务
    let heartbeat_task = spawn_heartbeat(state.clone(), task_id.clone(), cancel_token.clone());

    // 启动超时保护
    let timeout_task = spawn_timeout(task_id.clone(), cancel_token.clone());

    ctx.log_stdout(&format!("=== Release for {} ===", pipeline)).await;
    ctx.log_stdout(&format!("Image: {}", config.image_ref())).await;
    ctx.log_stdout(&format!(
        "Groups: build={} run={}",
        config.build_group, config.run_group
    ))
    .await;
    ctx.log_stdout(&format!("Timestamp: {}", chrono::Utc::now().to_rfc3339()))
        .await;

    // 组装全部阶段
    let mut stages = build::stages();
    let rollout_offset = stages.len();
    if config.run.is_some() {
        stages.extend(rollout::stages());
    }
    ctx.update_stages(stages.clone()).await;

    // Play 1: 构建组
    let mut exit_code = build::run(&ctx, &config, &mut stages, 0).await;

    if exit_code == 0 && ctx.is_cancelled() {
        ctx.log_stderr("=== Release cancelled ===").await;
        exit_code = -2;
    }

    // Play 2: 运行组（仅在构建段全部成功后）
    if exit_code == 0 {
        if let Some(spec) = config.run.clone() {
            exit_code = rollout::run(&ctx, &config, &spec, &mut stages, rollout_offset).await;
        } else {
            ctx.log_stdout("No container configured, release play only").await;
        }
    }

    // 失败后剩余阶段标记为 skipped
    if exit_code != 0 {
        mark_remaining_skipped(&mut stages);
    }

    // 完成
    let status = if exit_code == 0 {
        ReleaseStatus::Success
    } else {
        ReleaseStatus::Failed
    };
    ctx.log_stdout("=== Release finished ===").await;
    ctx.log_stdout(&format!("Status: {:?}", status)).await;
    ctx.log_stdout(&format!("Exit code: {}", exit_code)).await;

    // 阶段摘要
    ctx.log_stdout("\n=== Stage Summary ===").await;
    for stage in &stages {
        let duration = stage
            .duration_ms
            .map(|d| format!("{}ms", d))
            .unwrap_or_else(|| "-".to_string());
        let status_icon = match stage.status {
            StageStatus::Success => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "⊘",
            StageStatus::Running => "⟳",
            StageStatus::Pending => "○",
        };
        ctx.log_stdout(&format!(
            "{} {} ({})",
            status_icon, stage.display_name, duration
        ))
        .await;
    }

    ctx.finish(status, Some(exit_code), stages).await;

    // 取消辅助任务
    heartbeat_task.abort();
    timeout_task.abort();

    tracing::info!(
        task_id = %task_id,
        pipeline = %pipeline,
        exit_code = exit_code,
        "Release finished"
    );
}

/// 启动心跳任务
fn spawn_heartbeat(
    state: Arc<AppState>,
    task_id: String,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = interval.tick() => {
                    state.notifier.heartbeat(&task_id).await;
                }
            }
        }
    })
}

/// 启动超时保护任务
fn spawn_timeout(task_id: String, cancel_token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(RELEASE_TIMEOUT_SECS)).await;
        tracing::error!(task_id = %task_id, "Release timed out after {} minutes", RELEASE_TIMEOUT_SECS / 60);
        cancel_token.cancel();
    })
}

/// 将未执行的阶段标记为 skipped
///
/// 某个阶段失败后调用：已失败/已完成的阶段保持原状
fn mark_remaining_skipped(stages: &mut [crate::domain::release::ReleaseStage]) {
    for stage in stages.iter_mut() {
        if matches!(stage.status, StageStatus::Pending | StageStatus::Running) {
            stage.status = StageStatus::Skipped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::release::ReleaseStage;

    #[test]
    fn test_failed_build_skips_tag_and_push() {
        let mut stages = build::stages();
        stages.extend(rollout::stages());

        // 构建阶段失败
        stages[0].start();
        stages[0].finish(false, Some("docker build failed".to_string()));
        mark_remaining_skipped(&mut stages);

        assert_eq!(stages[0].status, StageStatus::Failed);
        // tag/push 以及整个 rollout play 都不应执行
        for stage in &stages[1..] {
            assert_eq!(stage.status, StageStatus::Skipped, "{}", stage.name);
        }
    }

    #[test]
    fn test_mark_remaining_skipped_preserves_finished() {
        let mut stages = vec![
            ReleaseStage::new("docker_build", "Docker Build"),
            ReleaseStage::new("docker_tag", "Docker Tag"),
            ReleaseStage::new("docker_push", "Docker Push"),
        ];
        stages[0].start();
        stages[0].finish(true, None);
        stages[1].start();
        stages[1].finish(false, Some("docker tag failed".to_string()));
        mark_remaining_skipped(&mut stages);

        assert_eq!(stages[0].status, StageStatus::Success);
        assert_eq!(stages[1].status, StageStatus::Failed);
        assert_eq!(stages[2].status, StageStatus::Skipped);
    }

    #[test]
    fn test_play_stage_names() {
        let names: Vec<String> = build::stages().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["docker_build", "docker_tag", "docker_push"]);

        let names: Vec<String> = rollout::stages().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["docker_pull", "replace_container", "verify"]);
    }
}
