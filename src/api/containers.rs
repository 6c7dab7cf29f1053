//! 容器管理 API
//!
//! 包含 /containers/* 端点，用于核对发布结果
//! （容器是否在运行、端口映射是否符合预期）

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

use crate::domain::container::{
    ContainerEnvResponse, ContainerInfo, ContainerLogsQuery, ContainerLogsResponse,
    ContainersResponse, EnvVar,
};
use crate::error::{ApiError, ApiResult};
use crate::infra::DockerCli;
use crate::middleware::RequireApiKey;
use crate::state::AppState;

/// 容器列表查询参数
#[derive(Debug, Deserialize)]
pub struct ContainersQuery {
    /// 宿主机组，默认 "docker"（运行组的默认组名）
    pub group: Option<String>,
}

/// 创建容器管理路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/containers", get(list_containers))
        .route("/containers/:name/logs", get(get_container_logs))
        .route("/containers/:name/env", get(get_container_env))
}

/// 解析查询参数中的宿主机组并生成 CLI 句柄
fn docker_for_group(state: &AppState, group: Option<&str>) -> (String, DockerCli) {
    let group = group.unwrap_or("docker").to_string();
    let cli = state.docker_cli(&group);
    (group, cli)
}

/// 列出指定宿主机组上的所有容器
///
/// GET /containers?group=docker
/// 需要 API Key
async fn list_containers(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContainersQuery>,
) -> ApiResult<impl IntoResponse> {
    let (group, docker) = docker_for_group(&state, query.group.as_deref());

    // 执行 docker ps -a 获取容器列表
    let output = docker
        .output(&[
            "ps",
            "-a",
            "--format",
            "{{.ID}}|{{.Names}}|{{.Image}}|{{.Status}}|{{.State}}|{{.CreatedAt}}|{{.Ports}}",
        ])
        .await
        .map_err(|e| {
            error!(group = %group, error = %e, "Failed to run docker ps");
            ApiError::internal(format!("Failed to list containers: {}", e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ApiError::internal(format!(
            "Docker command failed: {}",
            stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let containers: Vec<ContainerInfo> = stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(parse_container_line)
        .collect();

    Ok(Json(ContainersResponse { group, containers }))
}

/// 解析 docker ps 格式化输出的一行
fn parse_container_line(line: &str) -> ContainerInfo {
    let parts: Vec<&str> = line.split('|').collect();
    ContainerInfo {
        id: parts.first().unwrap_or(&"").to_string(),
        name: parts.get(1).unwrap_or(&"").to_string(),
        image: parts.get(2).unwrap_or(&"").to_string(),
        status: parts.get(3).unwrap_or(&"").to_string(),
        state: parts.get(4).unwrap_or(&"").to_string(),
        created: parts.get(5).unwrap_or(&"").to_string(),
        ports: parts
            .get(6)
            .unwrap_or(&"")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

/// 获取容器日志
///
/// GET /containers/:name/logs?tail=100&group=docker
/// 需要 API Key
async fn get_container_logs(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(container_name): Path<String>,
    Query(query): Query<ContainerLogsQuery>,
) -> ApiResult<impl IntoResponse> {
    let (_, docker) = docker_for_group(&state, query.group.as_deref());

    let tail = query.tail.to_string();
    let mut args: Vec<&str> = vec!["logs", "--tail", &tail];
    if query.timestamps {
        args.push("--timestamps");
    }
    args.push(&container_name);

    let output = docker.output(&args).await.map_err(|e| {
        error!(container = %container_name, error = %e, "Failed to get container logs");
        ApiError::internal(format!("Failed to get logs: {}", e))
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    // 检查是否是错误（容器不存在等）
    if !output.status.success() && stderr.contains("No such container") {
        return Err(ApiError::not_found(format!(
            "Container '{}'",
            container_name
        )));
    }

    // 合并 stdout 和 stderr（docker logs 通常输出到 stderr）
    let mut logs: Vec<String> = Vec::new();
    for line in stdout.lines() {
        if !line.is_empty() {
            logs.push(line.to_string());
        }
    }
    for line in stderr.lines() {
        if !line.is_empty() {
            logs.push(line.to_string());
        }
    }

    let total_lines = logs.len();

    Ok(Json(ContainerLogsResponse {
        container: container_name,
        logs,
        total_lines,
    }))
}

/// 获取容器环境变量（敏感信息已脱敏）
///
/// GET /containers/:name/env?group=docker
/// 需要 API Key
async fn get_container_env(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(container_name): Path<String>,
    Query(query): Query<ContainersQuery>,
) -> ApiResult<impl IntoResponse> {
    let (_, docker) = docker_for_group(&state, query.group.as_deref());

    // 使用 docker inspect 获取容器环境变量
    let output = docker
        .output(&[
            "inspect",
            "--format",
            "{{range .Config.Env}}{{.}}\n{{end}}",
            &container_name,
        ])
        .await
        .map_err(|e| {
            error!(container = %container_name, error = %e, "Failed to inspect container");
            ApiError::internal(format!("Failed to get environment: {}", e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such") {
            return Err(ApiError::not_found(format!(
                "Container '{}'",
                container_name
            )));
        }
        return Err(ApiError::internal(format!(
            "Docker inspect failed: {}",
            stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);

    let env_vars: Vec<EnvVar> = stdout
        .lines()
        .filter(|line| !line.is_empty() && line.contains('='))
        .map(|line| {
            let mut parts = line.splitn(2, '=');
            let key = parts.next().unwrap_or("").to_string();
            let value = parts.next().unwrap_or("").to_string();

            // 敏感变量脱敏后返回
            let sensitive = EnvVar::is_sensitive_key(&key);
            EnvVar::new(
                key,
                if sensitive {
                    "***REDACTED***".to_string()
                } else {
                    value
                },
                sensitive,
            )
        })
        .collect();

    Ok(Json(ContainerEnvResponse {
        container: container_name,
        env_vars,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_container_line() {
        let line = "abc123|0705_1|rodywody/test:latest|Up 2 hours|running|2026-08-07 10:00:00|0.0.0.0:8090->8080/tcp";
        let info = parse_container_line(line);

        assert_eq!(info.id, "abc123");
        assert_eq!(info.name, "0705_1");
        assert_eq!(info.image, "rodywody/test:latest");
        assert_eq!(info.state, "running");
        assert_eq!(info.ports, vec!["0.0.0.0:8090->8080/tcp".to_string()]);
    }

    #[test]
    fn test_parse_container_line_short() {
        let info = parse_container_line("abc123|web");
        assert_eq!(info.id, "abc123");
        assert_eq!(info.name, "web");
        assert!(info.ports.is_empty());
    }
}
