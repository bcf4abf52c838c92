//! # 日志安装入口
//!
//! 状态树内部一律通过 `tracing` 事件输出诊断信息；宿主进程可以自行组装 Subscriber，
//! 也可以调用 [`init_tracing`] 获得 `EnvFilter + fmt` 的默认组合。
//!
//! 事件约定：
//! - 实体创建、移除：`debug`；
//! - 遍历时跳过已移除的子节点：`debug`，字段 `parent`/`child`；
//! - 写锁持有超阈值、持久化失败：`warn`。

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

use crate::config::StateSettings;

/// 安装全局 Subscriber 失败的原因。
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// 进程中已存在全局 Subscriber，本函数不覆盖。
    #[error("a global tracing subscriber is already installed")]
    SubscriberAlreadySet,

    #[error("invalid log filter `{filter}`: {detail}")]
    InvalidFilter { filter: String, detail: String },

    #[error("failed to install tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 安装 `EnvFilter + fmt` 组合为全局 Subscriber。
///
/// # 教案式说明
/// - **逻辑 (How)**：优先读取 `RUST_LOG`；未设置时使用 `observability.log_filter`；
/// - **契约 (What)**：外部已设置全局 Subscriber 时返回 [`ObservabilityError::SubscriberAlreadySet`]，
///   不做任何修改；过滤指令非法时返回 [`ObservabilityError::InvalidFilter`]。
pub fn init_tracing(settings: &StateSettings) -> Result<(), ObservabilityError> {
    if dispatcher::has_been_set() {
        return Err(ObservabilityError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter(&settings.observability.log_filter)?)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_env_filter(fallback: &str) -> Result<EnvFilter, ObservabilityError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(fallback).map_err(|err| ObservabilityError::InvalidFilter {
            filter: fallback.to_owned(),
            detail: err.to_string(),
        }),
    }
}
