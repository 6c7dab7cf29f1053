//! 基础设施模块
//!
//! 封装外部依赖（HTTP client、命令执行、docker CLI）

pub mod command;
pub mod docker;
pub mod notify;

pub use command::CommandRunner;
pub use docker::DockerCli;
pub use notify::WebhookNotifier;
