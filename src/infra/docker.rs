//! Docker CLI 封装
//!
//! 按宿主机组组装 docker 命令：组配置了远程 daemon 端点时追加 `-H <endpoint>`，
//! 否则走本地 daemon。凭据、login 状态等仍由 docker CLI 自身管理。

use tokio::process::Command;

/// 指向某个宿主机组 Docker daemon 的 CLI 句柄
#[derive(Clone, Debug)]
pub struct DockerCli {
    /// 远程 daemon 端点（如 "ssh://deploy@10.0.0.5" 或 "tcp://10.0.0.5:2376"）
    host: Option<String>,
}

impl DockerCli {
    /// 创建指向指定 daemon 端点的句柄，None 表示本地 daemon
    pub fn new(host: Option<String>) -> Self {
        Self { host }
    }

    /// 是否指向远程 daemon
    pub fn is_remote(&self) -> bool {
        self.host.is_some()
    }

    /// 组装 docker 命令
    pub fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("docker");
        if let Some(ref host) = self.host {
            cmd.arg("-H").arg(host);
        }
        cmd.args(args);
        cmd
    }

    /// 渲染命令行用于日志回显（与实际执行的参数保持一致）
    pub fn render(&self, args: &[&str]) -> String {
        let mut parts = vec!["docker".to_string()];
        if let Some(ref host) = self.host {
            parts.push("-H".to_string());
            parts.push(host.clone());
        }
        parts.extend(args.iter().map(|a| a.to_string()));
        parts.join(" ")
    }

    /// 执行并收集输出（无流式）
    pub async fn output(&self, args: &[&str]) -> std::io::Result<std::process::Output> {
        self.command(args).output().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_local() {
        let cli = DockerCli::new(None);
        assert_eq!(cli.render(&["pull", "rodywody/test:latest"]), "docker pull rodywody/test:latest");
        assert!(!cli.is_remote());
    }

    #[test]
    fn test_render_remote() {
        let cli = DockerCli::new(Some("tcp://10.0.0.5:2376".to_string()));
        assert_eq!(
            cli.render(&["ps", "-a"]),
            "docker -H tcp://10.0.0.5:2376 ps -a"
        );
        assert!(cli.is_remote());
    }
}
