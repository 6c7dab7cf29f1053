//! 环境变量配置加载

use std::collections::HashMap;
use std::env;
use tracing::warn;

use crate::infra::DockerCli;

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// API 密钥
    pub api_key: String,
    /// 状态回调 URL
    pub callback_url: Option<String>,
    /// 服务监听端口
    pub port: u16,
    /// 宿主机组 -> Docker daemon 端点
    ///
    /// 未配置端点的组走本地 daemon。组的含义到此为止：
    /// 清单/SSH 管理不在本服务范围内。
    pub group_hosts: HashMap<String, String>,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        // API Key - 支持旧名称兼容
        let api_key = load_with_fallback("RELEASE_AGENT_API_KEY", "API_KEY")
            .unwrap_or_else(|| "change-me-in-production".to_string());

        // Callback URL - 支持旧名称兼容
        let callback_url = load_with_fallback("RELEASE_CALLBACK_URL", "CALLBACK_URL");
        if env::var("API_KEY").is_ok() || env::var("CALLBACK_URL").is_ok() {
            warn!("Deprecated environment variables detected. Please use RELEASE_AGENT_API_KEY and RELEASE_CALLBACK_URL");
        }

        // Port
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(9410);

        let group_hosts = load_group_hosts_from_env();

        Self {
            api_key,
            callback_url,
            port,
            group_hosts,
        }
    }

    /// 获取宿主机组的 daemon 端点
    pub fn docker_host_for(&self, group: &str) -> Option<&str> {
        self.group_hosts.get(group).map(|s| s.as_str())
    }

    /// 创建指向宿主机组 daemon 的 docker CLI 句柄
    pub fn docker_cli(&self, group: &str) -> DockerCli {
        DockerCli::new(self.docker_host_for(group).map(|s| s.to_string()))
    }
}

/// 从 GROUP_<NAME>_DOCKER_HOST 环境变量加载宿主机组端点
fn load_group_hosts_from_env() -> HashMap<String, String> {
    let mut groups = HashMap::new();

    for (key, value) in env::vars() {
        if key.starts_with("GROUP_") && key.ends_with("_DOCKER_HOST") {
            let name = key
                .strip_prefix("GROUP_")
                .and_then(|s| s.strip_suffix("_DOCKER_HOST"))
                .map(|s| s.to_lowercase().replace('_', "-"));

            if let Some(name) = name {
                if !value.is_empty() {
                    groups.insert(name, value);
                }
            }
        }
    }

    groups
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

/// 常量
pub mod constants {
    /// 发布超时（秒）
    pub const RELEASE_TIMEOUT_SECS: u64 = 1800; // 30 分钟

    /// 心跳间隔（秒）
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 15;

    /// 任务历史最大保存数量
    pub const MAX_TASK_HISTORY: usize = 100;

    /// 最大活跃任务数
    pub const MAX_ACTIVE_TASKS: usize = 50;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_with_fallback() {
        // 设置测试环境变量
        env::set_var("TEST_PRIMARY", "primary_value");
        env::set_var("TEST_FALLBACK", "fallback_value");

        assert_eq!(
            load_with_fallback("TEST_PRIMARY", "TEST_FALLBACK"),
            Some("primary_value".to_string())
        );

        env::remove_var("TEST_PRIMARY");
        assert_eq!(
            load_with_fallback("TEST_PRIMARY", "TEST_FALLBACK"),
            Some("fallback_value".to_string())
        );

        env::remove_var("TEST_FALLBACK");
        assert_eq!(load_with_fallback("TEST_PRIMARY", "TEST_FALLBACK"), None);
    }

    #[test]
    fn test_load_group_hosts() {
        env::set_var("GROUP_BUILD_FARM_DOCKER_HOST", "tcp://10.0.0.5:2376");

        let groups = load_group_hosts_from_env();
        assert_eq!(
            groups.get("build-farm").map(|s| s.as_str()),
            Some("tcp://10.0.0.5:2376")
        );

        env::remove_var("GROUP_BUILD_FARM_DOCKER_HOST");
    }
}
