//! Release play execution
//!
//! Builds the image on the build host group, tags it for the registry,
//! and pushes it. Any failing step stops the play.

use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::PipelineConfig;
use crate::domain::release::ReleaseStage;
use crate::infra::command::{CommandError, CommandRunner};

use super::context::ReleaseContext;

/// Timeout for the streamed docker build
const BUILD_TIMEOUT: Duration = Duration::from_secs(1500);
/// Timeout for docker tag
const TAG_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for docker push
const PUSH_TIMEOUT: Duration = Duration::from_secs(900);

/// Stage identifiers of the release play
pub fn stages() -> Vec<ReleaseStage> {
    vec![
        ReleaseStage::new("docker_build", "Docker Build"),
        ReleaseStage::new("docker_tag", "Docker Tag"),
        ReleaseStage::new("docker_push", "Docker Push"),
    ]
}

/// Execute the release play against `stages[offset..offset + 3]`
///
/// Returns the play exit code (0 on success, -2 on cancellation).
pub async fn run(
    ctx: &ReleaseContext,
    config: &PipelineConfig,
    stages: &mut Vec<ReleaseStage>,
    offset: usize,
) -> i32 {
    let docker = ctx.state.docker_cli(&config.build_group);
    let build_ref = config.build_ref();
    let image_ref = config.image_ref();

    ctx.log_stdout(&format!("=== Release play on group '{}' ===", config.build_group))
        .await;
    ctx.log_stdout(&format!("Build context: {}", config.build.context_dir))
        .await;
    if let Some(ref dockerfile) = config.build.dockerfile {
        ctx.log_stdout(&format!("Dockerfile: {}", dockerfile)).await;
    }
    ctx.log_stdout(&format!("Target image: {}", image_ref)).await;

    let mut exit_code = 0;

    // Stage 1: Docker Build
    stages[offset].start();
    ctx.update_stages(stages.clone()).await;
    ctx.log_stdout("[1/3] Building image...").await;

    let mut build_args: Vec<&str> = vec!["build", "--progress=plain", "-t", &build_ref];
    if let Some(ref dockerfile) = config.build.dockerfile {
        build_args.push("-f");
        build_args.push(dockerfile);
    }
    build_args.push(&config.build.context_dir);

    ctx.log_stdout(&format!(">>> {}", docker.render(&build_args)))
        .await;

    // Build output is streamed line by line through the task's log channel
    let (stream_tx, mut stream_rx) = broadcast::channel(256);
    let forward_ctx = ctx.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            match stream_rx.recv().await {
                Ok(line) => forward_ctx.forward(line).await,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let build_result = CommandRunner::run_with_streaming(
        docker.command(&build_args),
        stream_tx,
        ctx.cancel_token.clone(),
        BUILD_TIMEOUT,
    )
    .await;
    let _ = forward_task.await;

    match build_result {
        Ok(result) if result.status.success() && !result.timed_out => {
            stages[offset].finish(true, None);
            ctx.log_stdout(&format!("✓ Image built: {}", build_ref)).await;
        }
        Ok(result) => {
            let message = if result.timed_out {
                "docker build timed out".to_string()
            } else {
                "docker build failed".to_string()
            };
            ctx.log_stderr(&format!("Error: {}", message)).await;
            stages[offset].finish(false, Some(message));
            exit_code = result.status.code().unwrap_or(-1);
            if exit_code == 0 {
                exit_code = -1;
            }
        }
        Err(CommandError::Cancelled) => {
            ctx.log_stderr("=== Docker build CANCELLED ===").await;
            stages[offset].finish(false, Some("cancelled".to_string()));
            exit_code = -2;
        }
        Err(e) => {
            ctx.log_stderr(&format!("Error: Failed to run docker build: {}", e))
                .await;
            stages[offset].finish(false, Some(e.to_string()));
            exit_code = -1;
        }
    }
    ctx.update_stages(stages.clone()).await;

    // Stage 2: Docker Tag
    if exit_code == 0 {
        if config.needs_tag() {
            stages[offset + 1].start();
            ctx.update_stages(stages.clone()).await;
            ctx.log_stdout("[2/3] Tagging image for registry...").await;

            let tag_args = ["tag", build_ref.as_str(), image_ref.as_str()];
            ctx.log_stdout(&format!(">>> {}", docker.render(&tag_args)))
                .await;

            let tag_result =
                CommandRunner::run_simple(docker.command(&tag_args), TAG_TIMEOUT).await;

            match tag_result {
                Ok(output) => {
                    if !output.stderr.is_empty() {
                        ctx.log_stderr(&String::from_utf8_lossy(&output.stderr)).await;
                    }
                    if output.status.success() {
                        stages[offset + 1].finish(true, None);
                        ctx.log_stdout(&format!("✓ Tagged: {}", image_ref)).await;
                    } else {
                        stages[offset + 1].finish(false, Some("docker tag failed".to_string()));
                        exit_code = output.status.code().unwrap_or(-1);
                    }
                }
                Err(e) => {
                    stages[offset + 1].finish(false, Some(e.to_string()));
                    ctx.log_stderr(&format!("Error: Failed to tag image: {}", e))
                        .await;
                    exit_code = -1;
                }
            }
        } else {
            stages[offset + 1].skip(Some("same reference".to_string()));
            ctx.log_stdout("[2/3] Skipping tag (build name matches registry name)")
                .await;
        }
        ctx.update_stages(stages.clone()).await;
    }

    // Stage 3: Docker Push
    if exit_code == 0 && ctx.is_cancelled() {
        ctx.log_stderr("=== Release cancelled before push ===").await;
        return -2;
    }

    if exit_code == 0 {
        stages[offset + 2].start();
        ctx.update_stages(stages.clone()).await;
        ctx.log_stdout("[3/3] Pushing image to registry...").await;

        let push_args = ["push", image_ref.as_str()];
        ctx.log_stdout(&format!(">>> {}", docker.render(&push_args)))
            .await;

        let push_result =
            CommandRunner::run_simple(docker.command(&push_args), PUSH_TIMEOUT).await;

        match push_result {
            Ok(output) => {
                if !output.stdout.is_empty() {
                    ctx.log_stdout(&String::from_utf8_lossy(&output.stdout)).await;
                }
                if !output.stderr.is_empty() {
                    ctx.log_stderr(&String::from_utf8_lossy(&output.stderr)).await;
                }
                if output.status.success() {
                    stages[offset + 2].finish(true, None);
                    ctx.log_stdout(&format!("✓ Pushed: {}", image_ref)).await;
                } else {
                    stages[offset + 2].finish(false, Some("docker push failed".to_string()));
                    exit_code = output.status.code().unwrap_or(-1);
                }
            }
            Err(e) => {
                stages[offset + 2].finish(false, Some(e.to_string()));
                ctx.log_stderr(&format!("Error: Failed to push image: {}", e))
                    .await;
                exit_code = -1;
            }
        }
        ctx.update_stages(stages.clone()).await;
    }

    tracing::info!(
        task_id = %ctx.task_id,
        pipeline = %ctx.pipeline,
        exit_code = exit_code,
        "Release play finished"
    );

    exit_code
}
