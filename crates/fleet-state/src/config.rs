//! # 状态树运行配置
//!
//! ## 定位（Why）
//! - 为注册表与实体树提供少量可调项：慢持锁告警阈值、新集群的默认值、集群 ID 起点与日志过滤；
//! - 配置文档采用 TOML，经 `serde` 反序列化；缺省字段一律回退到 [`Default`]，未知字段直接拒绝，
//!   避免拼写错误被静默忽略。
//!
//! ## 示例（How）
//! ```toml
//! [locking]
//! slow_hold_warn_ms = 100
//!
//! [cluster]
//! default_provisioning_state = "INIT"
//! default_stack = "HDP-2.2"
//!
//! [registry]
//! first_cluster_id = 1
//!
//! [observability]
//! log_filter = "info,fleet_state=debug"
//! ```

use core::time::Duration;
use std::{fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;

use crate::state::{StackId, State};

/// 配置加载失败的原因。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// 字段语法正确但取值不可用。
    #[error("invalid configuration value for `{field}`: {detail}")]
    Invalid { field: &'static str, detail: String },
}

/// 顶层配置。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StateSettings {
    pub locking: LockSettings,
    pub cluster: ClusterDefaults,
    pub registry: RegistrySettings,
    pub observability: ObservabilitySettings,
}

/// 实体锁相关配置。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LockSettings {
    /// 写锁持有超过该毫秒数时输出告警；`0` 表示关闭统计。
    pub slow_hold_warn_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            slow_hold_warn_ms: 100,
        }
    }
}

impl LockSettings {
    /// 转换为实体锁使用的阈值。
    pub fn slow_hold_threshold(&self) -> Option<Duration> {
        (self.slow_hold_warn_ms > 0).then(|| Duration::from_millis(self.slow_hold_warn_ms))
    }
}

/// 新建集群的默认字段。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterDefaults {
    pub default_provisioning_state: State,
    /// 未显式设置时，新集群的期望栈版本为空。
    pub default_stack: Option<StackId>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySettings {
    /// 第一个集群分配到的 ID，之后单调递增。
    pub first_cluster_id: i64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            first_cluster_id: 1,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilitySettings {
    /// `RUST_LOG` 未设置时使用的 `EnvFilter` 指令。
    pub log_filter: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_owned(),
        }
    }
}

impl StateSettings {
    /// 从 TOML 文本解析配置并校验取值。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings: StateSettings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 从文件读取配置。
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.first_cluster_id < 1 {
            return Err(ConfigError::Invalid {
                field: "registry.first_cluster_id",
                detail: format!("must be positive, got {}", self.registry.first_cluster_id),
            });
        }
        if self.observability.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "observability.log_filter",
                detail: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = StateSettings::from_toml_str("").expect("空文档应使用默认值");
        assert_eq!(settings, StateSettings::default());
        assert_eq!(
            settings.locking.slow_hold_threshold(),
            Some(Duration::from_millis(100))
        );
        assert_eq!(settings.cluster.default_provisioning_state, State::Init);
        assert_eq!(settings.registry.first_cluster_id, 1);
    }

    #[test]
    fn full_document_overrides_every_section() {
        let settings = StateSettings::from_toml_str(
            r#"
            [locking]
            slow_hold_warn_ms = 0

            [cluster]
            default_provisioning_state = "INSTALLED"
            default_stack = "HDP-2.2"

            [registry]
            first_cluster_id = 10

            [observability]
            log_filter = "fleet_state=trace"
            "#,
        )
        .expect("合法配置");

        assert_eq!(settings.locking.slow_hold_threshold(), None);
        assert_eq!(
            settings.cluster.default_provisioning_state,
            State::Installed
        );
        assert_eq!(
            settings.cluster.default_stack.as_ref().map(ToString::to_string),
            Some("HDP-2.2".to_owned())
        );
        assert_eq!(settings.registry.first_cluster_id, 10);
        assert_eq!(settings.observability.log_filter, "fleet_state=trace");
    }

    #[test]
    fn unknown_fields_and_bad_values_are_rejected() {
        assert!(matches!(
            StateSettings::from_toml_str("[locking]\nslow_hold = 5\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            StateSettings::from_toml_str("[cluster]\ndefault_stack = \"HDP\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            StateSettings::from_toml_str("[registry]\nfirst_cluster_id = 0\n"),
            Err(ConfigError::Invalid {
                field: "registry.first_cluster_id",
                ..
            })
        ));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = StateSettings::from_path("/nonexistent/fleet-state.toml")
            .expect_err("文件不存在");
        assert!(err.to_string().contains("/nonexistent/fleet-state.toml"));
    }
}
