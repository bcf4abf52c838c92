//! # fleet-alerts
//!
//! ## 定位与职责（Why）
//! - 解析服务随附的告警定义文档：顶层键为作用域（`"service"` 或组件名），值为告警定义数组；
//! - 每个定义的 `source` 通过 `type` 标签在封闭集合 {METRIC, PORT, SCRIPT, AGGREGATE, PERCENT}
//!   中显式分派，未知标签返回带类型的错误而不是空值；
//! - 把存储层保存的告警记录还原为领域对象（[`AlertDefinitionFactory::coerce`]）。
//!
//! ## 边界（What）
//! - 本 crate 与 `fleet-state` 的加锁核心没有任何交互，只共享工作区的依赖栈。

pub mod definition;
pub mod error;
pub mod factory;
pub mod source;

pub use definition::{AlertDefinition, AlertDefinitionRecord, Scope};
pub use error::AlertError;
pub use factory::AlertDefinitionFactory;
pub use source::{
    AggregateSource, AlertUri, MetricField, MetricInfo, MetricSource, PercentSource, PortSource,
    ReportTemplate, Reporting, ScriptSource, Source, SourceType,
};
