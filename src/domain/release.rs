//! 发布相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 发布任务状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Running,
    Success,
    Failed,
}

impl ReleaseStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Running => "running",
            ReleaseStatus::Success => "success",
            ReleaseStatus::Failed => "failed",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReleaseStatus::Success | ReleaseStatus::Failed)
    }
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// 发布阶段信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReleaseStage {
    /// 阶段标识 (e.g., "docker_build", "docker_push", "docker_pull")
    pub name: String,
    /// 显示名称 (e.g., "Docker Build", "Docker Push")
    pub display_name: String,
    /// 开始时间
    pub started_at: Option<DateTime<Utc>>,
    /// 结束时间
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    /// 阶段状态
    pub status: StageStatus,
    /// 附加信息
    pub message: Option<String>,
}

impl ReleaseStage {
    /// 创建新的待执行阶段
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行阶段
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成阶段
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    /// 跳过阶段
    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }
}

/// 发布任务信息
#[derive(Clone, Debug, Serialize)]
pub struct ReleaseTask {
    pub id: String,
    pub pipeline: String,
    pub status: ReleaseStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    /// 发布阶段详情
    #[serde(default)]
    pub stages: Vec<ReleaseStage>,
}

impl ReleaseTask {
    /// 创建新任务
    pub fn new(id: String, pipeline: String) -> Self {
        Self {
            id,
            pipeline,
            status: ReleaseStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            stages: Vec::new(),
        }
    }
}

/// 日志行
#[derive(Clone, Debug, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: String, // stdout | stderr
    pub content: String,
}

impl LogLine {
    /// 创建新日志行
    pub fn new(stream: &str, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream: stream.to_string(),
            content: content.into(),
        }
    }

    /// 创建 stdout 日志行
    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new("stdout", content)
    }

    /// 创建 stderr 日志行
    pub fn stderr(content: impl Into<String>) -> Self {
        Self::new("stderr", content)
    }
}

/// 端口映射（宿主机端口:容器端口）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

impl PortBinding {
    /// 解析 "8090:8080" 形式的映射
    pub fn parse(spec: &str) -> Option<Self> {
        let (host, container) = spec.trim().split_once(':')?;
        Some(Self {
            host: host.trim().parse().ok()?,
            container: container.trim().parse().ok()?,
        })
    }

    /// 解析逗号分隔的多个映射，忽略无法解析的条目
    pub fn parse_bindings(specs: &str) -> Vec<Self> {
        specs.split(',').filter_map(Self::parse).collect()
    }

    /// 渲染为 docker run -p 参数值
    pub fn as_publish_arg(&self) -> String {
        format!("{}:{}", self.host, self.container)
    }
}

/// 容器重启策略（docker run --restart）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl RestartPolicy {
    /// 从 docker CLI 策略名解析，未知值返回 None
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "no" => Some(RestartPolicy::No),
            "always" => Some(RestartPolicy::Always),
            "on-failure" => Some(RestartPolicy::OnFailure),
            "unless-stopped" => Some(RestartPolicy::UnlessStopped),
            _ => None,
        }
    }

    /// 渲染为 --restart 参数值
    pub fn as_arg(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Always
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_status_as_str() {
        assert_eq!(ReleaseStatus::Running.as_str(), "running");
        assert_eq!(ReleaseStatus::Success.as_str(), "success");
        assert_eq!(ReleaseStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_release_status_is_terminal() {
        assert!(!ReleaseStatus::Running.is_terminal());
        assert!(ReleaseStatus::Success.is_terminal());
        assert!(ReleaseStatus::Failed.is_terminal());
    }

    #[test]
    fn test_release_stage_lifecycle() {
        let mut stage = ReleaseStage::new("docker_build", "Docker Build");
        assert_eq!(stage.status, StageStatus::Pending);

        stage.start();
        assert_eq!(stage.status, StageStatus::Running);
        assert!(stage.started_at.is_some());

        stage.finish(true, None);
        assert_eq!(stage.status, StageStatus::Success);
        assert!(stage.finished_at.is_some());
        assert!(stage.duration_ms.is_some());
    }

    #[test]
    fn test_log_line_creation() {
        let line = LogLine::stdout("Hello");
        assert_eq!(line.stream, "stdout");
        assert_eq!(line.content, "Hello");

        let line = LogLine::stderr("Error");
        assert_eq!(line.stream, "stderr");
        assert_eq!(line.content, "Error");
    }

    #[test]
    fn test_port_binding_parse() {
        let binding = PortBinding::parse("8090:8080").unwrap();
        assert_eq!(binding.host, 8090);
        assert_eq!(binding.container, 8080);
        assert_eq!(binding.as_publish_arg(), "8090:8080");

        assert!(PortBinding::parse("8090").is_none());
        assert!(PortBinding::parse("abc:8080").is_none());
    }

    #[test]
    fn test_port_binding_parse_many() {
        let bindings = PortBinding::parse_bindings("8090:8080, 9000:9000, junk");
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].host, 8090);
        assert_eq!(bindings[1].container, 9000);
    }

    #[test]
    fn test_restart_policy_roundtrip() {
        assert_eq!(RestartPolicy::from_str("always"), Some(RestartPolicy::Always));
        assert_eq!(
            RestartPolicy::from_str("unless-stopped"),
            Some(RestartPolicy::UnlessStopped)
        );
        assert_eq!(RestartPolicy::from_str("sometimes"), None);
        assert_eq!(RestartPolicy::Always.as_arg(), "always");
        assert_eq!(RestartPolicy::OnFailure.as_arg(), "on-failure");
    }
}
