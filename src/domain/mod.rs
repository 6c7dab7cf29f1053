//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod container;
pub mod release;

// Re-exports for convenience
pub use container::{ContainerInfo, ContainerLogsQuery, EnvVar};
pub use release::{
    LogLine, PortBinding, ReleaseStage, ReleaseStatus, ReleaseTask, RestartPolicy, StageStatus,
};
