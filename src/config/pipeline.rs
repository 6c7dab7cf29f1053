//! 流水线配置
//!
//! 一条流水线描述两段发布：构建组上 build/tag/push，运行组上 pull/run

use std::collections::HashMap;
use std::env;

use crate::domain::release::{PortBinding, RestartPolicy};

/// 构建段配置
#[derive(Clone, Debug)]
pub struct BuildSpec {
    /// 构建上下文目录
    pub context_dir: String,
    /// Dockerfile 路径（相对于上下文，默认由 docker 决定）
    pub dockerfile: Option<String>,
    /// 本地构建用镜像名（默认与推送目标一致）
    pub build_name: Option<String>,
}

/// 运行段配置
#[derive(Clone, Debug)]
pub struct RunSpec {
    /// 容器名称
    pub container_name: String,
    /// 端口映射
    pub ports: Vec<PortBinding>,
    /// 重启策略
    pub restart: RestartPolicy,
}

/// 流水线配置
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// 推送/拉取的镜像仓库名（含 registry 前缀，如 rodywody/test）
    pub image: String,
    /// 镜像 tag
    pub tag: String,
    /// 构建段
    pub build: BuildSpec,
    /// 运行段（未配置容器名时流水线只做构建推送）
    pub run: Option<RunSpec>,
    /// 构建宿主机组
    pub build_group: String,
    /// 运行宿主机组
    pub run_group: String,
}

impl PipelineConfig {
    /// 推送/拉取用完整镜像引用
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// 构建用镜像引用
    pub fn build_ref(&self) -> String {
        match self.build.build_name {
            Some(ref name) => format!("{}:{}", name, self.tag),
            None => self.image_ref(),
        }
    }

    /// tag 阶段是否需要真正执行（构建名与推送目标一致时跳过）
    pub fn needs_tag(&self) -> bool {
        self.build_ref() != self.image_ref()
    }
}

/// 从环境变量加载流水线配置
///
/// 每个 PIPELINE_<NAME>_IMAGE 定义一条流水线，伴随变量：
/// _TAG, _BUILD_NAME, _CONTEXT, _DOCKERFILE, _CONTAINER, _PORTS,
/// _RESTART, _BUILD_GROUP, _RUN_GROUP
pub fn load_pipelines_from_env() -> HashMap<String, PipelineConfig> {
    let mut pipelines = HashMap::new();

    for (key, image) in env::vars() {
        if key.starts_with("PIPELINE_") && key.ends_with("_IMAGE") {
            let name = key
                .strip_prefix("PIPELINE_")
                .and_then(|s| s.strip_suffix("_IMAGE"))
                .map(|s| s.to_lowercase().replace('_', "-"));

            let Some(name) = name else {
                continue;
            };
            if image.is_empty() {
                continue;
            }

            let var = |suffix: &str| {
                env::var(format!(
                    "PIPELINE_{}_{}",
                    name.to_uppercase().replace('-', "_"),
                    suffix
                ))
                .ok()
                .filter(|v| !v.is_empty())
            };

            let tag = var("TAG").unwrap_or_else(|| "latest".to_string());
            let context_dir = var("CONTEXT").unwrap_or_else(|| ".".to_string());
            let dockerfile = var("DOCKERFILE");
            let build_name = var("BUILD_NAME");

            let run = var("CONTAINER").map(|container_name| RunSpec {
                container_name,
                ports: var("PORTS")
                    .map(|v| PortBinding::parse_bindings(&v))
                    .unwrap_or_default(),
                restart: var("RESTART")
                    .and_then(|v| RestartPolicy::from_str(&v))
                    .unwrap_or_default(),
            });

            let build_group = var("BUILD_GROUP").unwrap_or_else(|| "ansible".to_string());
            let run_group = var("RUN_GROUP").unwrap_or_else(|| "docker".to_string());

            pipelines.insert(
                name,
                PipelineConfig {
                    image,
                    tag,
                    build: BuildSpec {
                        context_dir,
                        dockerfile,
                        build_name,
                    },
                    run,
                    build_group,
                    run_group,
                },
            );
        }
    }

    pipelines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_pipeline_with_defaults() {
        env::set_var("PIPELINE_WEBTEST_IMAGE", "rodywody/test");
        env::set_var("PIPELINE_WEBTEST_CONTAINER", "0705_1");
        env::set_var("PIPELINE_WEBTEST_PORTS", "8090:8080");

        let pipelines = load_pipelines_from_env();
        let config = pipelines.get("webtest").expect("pipeline parsed");

        assert_eq!(config.image, "rodywody/test");
        assert_eq!(config.tag, "latest");
        assert_eq!(config.image_ref(), "rodywody/test:latest");
        assert_eq!(config.build.context_dir, ".");
        assert_eq!(config.build_group, "ansible");
        assert_eq!(config.run_group, "docker");

        let run = config.run.as_ref().expect("run spec present");
        assert_eq!(run.container_name, "0705_1");
        assert_eq!(run.ports, vec![PortBinding { host: 8090, container: 8080 }]);
        assert_eq!(run.restart, RestartPolicy::Always);

        env::remove_var("PIPELINE_WEBTEST_IMAGE");
        env::remove_var("PIPELINE_WEBTEST_CONTAINER");
        env::remove_var("PIPELINE_WEBTEST_PORTS");
    }

    #[test]
    fn test_load_pipeline_build_only() {
        env::set_var("PIPELINE_LIBONLY_IMAGE", "registry.local/lib");
        env::set_var("PIPELINE_LIBONLY_TAG", "v2");
        env::set_var("PIPELINE_LIBONLY_BUILD_NAME", "lib");

        let pipelines = load_pipelines_from_env();
        let config = pipelines.get("libonly").expect("pipeline parsed");

        assert!(config.run.is_none());
        assert_eq!(config.build_ref(), "lib:v2");
        assert_eq!(config.image_ref(), "registry.local/lib:v2");
        assert!(config.needs_tag());

        env::remove_var("PIPELINE_LIBONLY_IMAGE");
        env::remove_var("PIPELINE_LIBONLY_TAG");
        env::remove_var("PIPELINE_LIBONLY_BUILD_NAME");
    }

    #[test]
    fn test_tag_skipped_when_same_reference() {
        let config = PipelineConfig {
            image: "rodywody/test".to_string(),
            tag: "latest".to_string(),
            build: BuildSpec {
                context_dir: ".".to_string(),
                dockerfile: None,
                build_name: None,
            },
            run: None,
            build_group: "ansible".to_string(),
            run_group: "docker".to_string(),
        };

        assert!(!config.needs_tag());
        assert_eq!(config.build_ref(), config.image_ref());
    }
}
