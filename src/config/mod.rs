//! 配置模块

pub mod env;
pub mod pipeline;

pub use env::EnvConfig;
pub use pipeline::{load_pipelines_from_env, PipelineConfig};
