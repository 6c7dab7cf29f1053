//! Rollout play execution
//!
//! Pulls the pushed image on the run host group, replaces the named
//! container, and verifies it is up with the configured port bindings.

use std::time::Duration;

use crate::config::{pipeline::RunSpec, PipelineConfig};
use crate::domain::release::ReleaseStage;
use crate::infra::command::CommandRunner;

use super::context::ReleaseContext;

/// Timeout for docker pull
const PULL_TIMEOUT: Duration = Duration::from_secs(900);
/// Timeout for container replacement and verification commands
const RUN_TIMEOUT: Duration = Duration::from_secs(120);

/// Stage identifiers of the rollout play
pub fn stages() -> Vec<ReleaseStage> {
    vec![
        ReleaseStage::new("docker_pull", "Docker Pull"),
        ReleaseStage::new("replace_container", "Replace Container"),
        ReleaseStage::new("verify", "Verify Container"),
    ]
}

/// Execute the rollout play against `stages[offset..offset + 3]`
///
/// Returns the play exit code (0 on success, -2 on cancellation).
pub async fn run(
    ctx: &ReleaseContext,
    config: &PipelineConfig,
    spec: &RunSpec,
    stages: &mut Vec<ReleaseStage>,
    offset: usize,
) -> i32 {
    let docker = ctx.state.docker_cli(&config.run_group);
    let image_ref = config.image_ref();

    ctx.log_stdout(&format!("=== Rollout play on group '{}' ===", config.run_group))
        .await;
    ctx.log_stdout(&format!("Image: {}", image_ref)).await;
    ctx.log_stdout(&format!("Container: {}", spec.container_name))
        .await;

    let mut exit_code = 0;

    // Stage 1: Docker Pull
    stages[offset].start();
    ctx.update_stages(stages.clone()).await;
    ctx.log_stdout("[1/3] Pulling image...").await;

    let pull_args = ["pull", image_ref.as_str()];
    ctx.log_stdout(&format!(">>> {}", docker.render(&pull_args)))
        .await;

    let pull_result = CommandRunner::run_simple(docker.command(&pull_args), PULL_TIMEOUT).await;

    match pull_result {
        Ok(output) => {
            if !output.stdout.is_empty() {
                ctx.log_stdout(&String::from_utf8_lossy(&output.stdout)).await;
            }
            if !output.stderr.is_empty() {
                ctx.log_stderr(&String::from_utf8_lossy(&output.stderr)).await;
            }
            if output.status.success() {
                stages[offset].finish(true, None);
            } else {
                stages[offset].finish(false, Some("docker pull failed".to_string()));
                ctx.log_stderr("Error: Failed to pull image").await;
                exit_code = output.status.code().unwrap_or(-1);
            }
        }
        Err(e) => {
            stages[offset].finish(false, Some(e.to_string()));
            ctx.log_stderr(&format!("Error: Failed to run docker pull: {}", e))
                .await;
            exit_code = -1;
        }
    }
    ctx.update_stages(stages.clone()).await;

    // Check cancellation
    if exit_code == 0 && ctx.is_cancelled() {
        ctx.log_stderr("=== Rollout cancelled before container replacement ===")
            .await;
        return -2;
    }

    // Stage 2: Replace Container
    if exit_code == 0 {
        stages[offset + 1].start();
        ctx.update_stages(stages.clone()).await;
        ctx.log_stdout("[2/3] Replacing container...").await;

        // Remove the previous container if one holds the name. A bare
        // `docker run --name` refuses to reuse an existing name, so the
        // old container goes first; absence is not an error.
        let rm_args = ["rm", "-f", spec.container_name.as_str()];
        ctx.log_stdout(&format!(">>> {}", docker.render(&rm_args)))
            .await;
        match CommandRunner::run_simple(docker.command(&rm_args), RUN_TIMEOUT).await {
            Ok(output) => {
                if output.status.success() {
                    ctx.log_stdout(&format!("Removed previous container {}", spec.container_name))
                        .await;
                } else {
                    ctx.log_stdout("No previous container to remove").await;
                }
            }
            Err(e) => {
                ctx.log_stderr(&format!("Warning: Failed to run docker rm: {}", e))
                    .await;
            }
        }

        // docker run -d -p <host>:<container> --restart <policy> --name <name> <image>
        let mut owned_args: Vec<String> = vec!["run".to_string(), "-d".to_string()];
        for binding in &spec.ports {
            owned_args.push("-p".to_string());
            owned_args.push(binding.as_publish_arg());
        }
        owned_args.push("--restart".to_string());
        owned_args.push(spec.restart.as_arg().to_string());
        owned_args.push("--name".to_string());
        owned_args.push(spec.container_name.clone());
        owned_args.push(image_ref.clone());

        let run_args: Vec<&str> = owned_args.iter().map(|s| s.as_str()).collect();
        ctx.log_stdout(&format!(">>> {}", docker.render(&run_args)))
            .await;

        let run_result = CommandRunner::run_simple(docker.command(&run_args), RUN_TIMEOUT).await;

        match run_result {
            Ok(output) => {
                if !output.stdout.is_empty() {
                    // docker run -d prints the new container id
                    ctx.log_stdout(String::from_utf8_lossy(&output.stdout).trim())
                        .await;
                }
                if !output.stderr.is_empty() {
                    ctx.log_stderr(&String::from_utf8_lossy(&output.stderr)).await;
                }
                if output.status.success() {
                    stages[offset + 1].finish(true, None);
                    ctx.log_stdout(&format!("✓ Container started: {}", spec.container_name))
                        .await;
                } else {
                    stages[offset + 1].finish(false, Some("docker run failed".to_string()));
                    ctx.log_stderr("Error: Failed to start container").await;
                    exit_code = output.status.code().unwrap_or(-1);
                }
            }
            Err(e) => {
                stages[offset + 1].finish(false, Some(e.to_string()));
                ctx.log_stderr(&format!("Error: Failed to run docker run: {}", e))
                    .await;
                exit_code = -1;
            }
        }
        ctx.update_stages(stages.clone()).await;
    }

    // Stage 3: Verify Container
    if exit_code == 0 {
        stages[offset + 2].start();
        ctx.update_stages(stages.clone()).await;
        ctx.log_stdout("[3/3] Verifying container state...").await;

        let filter = format!("name=^/{}$", spec.container_name);
        let ps_args = [
            "ps",
            "--filter",
            filter.as_str(),
            "--format",
            "{{.Names}}|{{.Status}}|{{.Ports}}",
        ];
        ctx.log_stdout(&format!(">>> {}", docker.render(&ps_args)))
            .await;

        let ps_result = CommandRunner::run_simple(docker.command(&ps_args), RUN_TIMEOUT).await;

        match ps_result {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let line = stdout.lines().find(|l| !l.is_empty());
                match line {
                    Some(line) if line.contains("Up") => {
                        ctx.log_stdout(line).await;
                        stages[offset + 2].finish(true, None);
                        ctx.log_stdout(&format!(
                            "✓ Container {} is up ({} port binding(s))",
                            spec.container_name,
                            spec.ports.len()
                        ))
                        .await;
                    }
                    _ => {
                        stages[offset + 2]
                            .finish(false, Some("container not running".to_string()));
                        ctx.log_stderr(&format!(
                            "Error: Container {} is not running after start",
                            spec.container_name
                        ))
                        .await;
                        exit_code = -1;
                    }
                }
            }
            Ok(output) => {
                stages[offset + 2].finish(false, Some("docker ps failed".to_string()));
                ctx.log_stderr(&String::from_utf8_lossy(&output.stderr)).await;
                exit_code = output.status.code().unwrap_or(-1);
            }
            Err(e) => {
                stages[offset + 2].finish(false, Some(e.to_string()));
                ctx.log_stderr(&format!("Error: Failed to verify container: {}", e))
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
        "Rollout play finished"
    );

    exit_code
}
