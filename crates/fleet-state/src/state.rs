//! # 状态枚举与栈版本标识
//!
//! ## 角色定位（Why）
//! - 集中声明实体树各层共享的标量类型：运行状态 [`State`]、维护状态 [`MaintenanceState`]、
//!   集群版本状态 [`RepositoryVersionState`] 与栈标识 [`StackId`]；
//! - 这些类型只承载取值，不承载状态机：跃迁约束属于外层编排，此处任意取值之间均可直接写入。
//!
//! ## 契约（What）
//! - 所有枚举均为 `Copy`，可在锁内按值拷贝，避免响应对象持有锁内引用；
//! - 序列化形态为全大写蛇形字符串（`"INSTALLED"`、`"IMPLIED_FROM_HOST"`），与外部 API 的约定一致。

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// 组件实例的实际/期望运行状态。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// 刚创建，尚未执行任何操作。
    #[default]
    Init,
    Installing,
    InstallFailed,
    Installed,
    Starting,
    Started,
    Stopping,
    Uninstalling,
    Uninstalled,
    WipingOut,
    Upgrading,
    Disabled,
    Unknown,
}

impl State {
    /// 返回稳定的字符串表示。
    pub const fn as_str(self) -> &'static str {
        match self {
            State::Init => "INIT",
            State::Installing => "INSTALLING",
            State::InstallFailed => "INSTALL_FAILED",
            State::Installed => "INSTALLED",
            State::Starting => "STARTING",
            State::Started => "STARTED",
            State::Stopping => "STOPPING",
            State::Uninstalling => "UNINSTALLING",
            State::Uninstalled => "UNINSTALLED",
            State::WipingOut => "WIPING_OUT",
            State::Upgrading => "UPGRADING",
            State::Disabled => "DISABLED",
            State::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 维护状态：屏蔽告警/自动化，但不改变运行状态。
///
/// `Implied*` 变体表示维护状态由上级（服务或主机）传导而来，而非在实体上显式设置。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceState {
    On,
    #[default]
    Off,
    ImpliedFromService,
    ImpliedFromHost,
    ImpliedFromServiceAndHost,
}

impl MaintenanceState {
    pub const fn as_str(self) -> &'static str {
        match self {
            MaintenanceState::On => "ON",
            MaintenanceState::Off => "OFF",
            MaintenanceState::ImpliedFromService => "IMPLIED_FROM_SERVICE",
            MaintenanceState::ImpliedFromHost => "IMPLIED_FROM_HOST",
            MaintenanceState::ImpliedFromServiceAndHost => "IMPLIED_FROM_SERVICE_AND_HOST",
        }
    }
}

impl fmt::Display for MaintenanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 集群版本记录的仓库状态。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepositoryVersionState {
    Init,
    Current,
    Installing,
    Installed,
    InstallFailed,
    OutOfSync,
    Upgrading,
    Upgraded,
    UpgradeFailed,
}

impl RepositoryVersionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            RepositoryVersionState::Init => "INIT",
            RepositoryVersionState::Current => "CURRENT",
            RepositoryVersionState::Installing => "INSTALLING",
            RepositoryVersionState::Installed => "INSTALLED",
            RepositoryVersionState::InstallFailed => "INSTALL_FAILED",
            RepositoryVersionState::OutOfSync => "OUT_OF_SYNC",
            RepositoryVersionState::Upgrading => "UPGRADING",
            RepositoryVersionState::Upgraded => "UPGRADED",
            RepositoryVersionState::UpgradeFailed => "UPGRADE_FAILED",
        }
    }
}

impl fmt::Display for RepositoryVersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 软件栈标识，形如 `HDP-2.2`。
///
/// # 教案式说明
/// - **契约 (What)**：`stack_name` 与 `stack_version` 均非空；文本形态以第一个 `-` 分隔，
///   因而版本部分允许继续包含 `-`（如 `HDP-2.2-SNAPSHOT`）；
/// - **序列化**：以文本形态出现在响应中，反序列化时走同一解析逻辑。
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StackId {
    stack_name: String,
    stack_version: String,
}

impl StackId {
    /// 由名称与版本两段直接构造。
    pub fn new(
        stack_name: impl Into<String>,
        stack_version: impl Into<String>,
    ) -> Result<Self, StateError> {
        let stack_name = stack_name.into();
        let stack_version = stack_version.into();
        if stack_name.is_empty() || stack_version.is_empty() {
            return Err(StateError::InvalidStackId {
                value: format!("{stack_name}-{stack_version}"),
            });
        }
        Ok(Self {
            stack_name,
            stack_version,
        })
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn stack_version(&self) -> &str {
        &self.stack_version
    }
}

impl FromStr for StackId {
    type Err = StateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once('-') {
            Some((name, version)) => StackId::new(name, version),
            None => Err(StateError::InvalidStackId {
                value: value.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for StackId {
    type Error = StateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StackId> for String {
    fn from(value: StackId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.stack_name, self.stack_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_id_splits_on_first_dash() {
        let stack: StackId = "HDP-2.2-SNAPSHOT".parse().expect("合法栈标识");
        assert_eq!(stack.stack_name(), "HDP");
        assert_eq!(stack.stack_version(), "2.2-SNAPSHOT");
        assert_eq!(stack.to_string(), "HDP-2.2-SNAPSHOT");
    }

    #[test]
    fn stack_id_rejects_missing_version() {
        assert!(matches!(
            "HDP".parse::<StackId>(),
            Err(StateError::InvalidStackId { .. })
        ));
        assert!(matches!(
            "HDP-".parse::<StackId>(),
            Err(StateError::InvalidStackId { .. })
        ));
    }

    #[test]
    fn enums_serialize_as_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&State::InstallFailed).expect("序列化"),
            "\"INSTALL_FAILED\""
        );
        assert_eq!(
            serde_json::to_string(&MaintenanceState::ImpliedFromServiceAndHost).expect("序列化"),
            "\"IMPLIED_FROM_SERVICE_AND_HOST\""
        );
        let parsed: RepositoryVersionState =
            serde_json::from_str("\"OUT_OF_SYNC\"").expect("反序列化");
        assert_eq!(parsed, RepositoryVersionState::OutOfSync);
        assert_eq!(State::WipingOut.to_string(), State::WipingOut.as_str());
    }
}
