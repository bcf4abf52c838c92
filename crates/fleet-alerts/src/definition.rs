//! 告警定义与其存储记录。

use serde::{Deserialize, Serialize};

use crate::source::Source;

/// 告警的生效范围。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    #[default]
    Any,
    Host,
    Service,
}

/// 告警定义。
///
/// `service_name` 与 `component_name` 不出现在文档中，由工厂按文档所属服务与作用域键填入。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertDefinition {
    pub name: String,
    pub label: Option<String>,
    pub service_name: String,
    pub component_name: Option<String>,
    pub scope: Scope,
    pub enabled: bool,
    /// 调度间隔，单位分钟。
    pub interval: u32,
    /// 来源解码失败的存储记录会留下 `None`。
    pub source: Option<Source>,
}

/// 存储层保存的告警定义；`source` 为原始 JSON 文本。
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AlertDefinitionRecord {
    pub definition_name: String,
    pub label: Option<String>,
    pub service_name: String,
    pub component_name: Option<String>,
    pub scope: Scope,
    pub enabled: bool,
    pub schedule_interval: u32,
    pub source: String,
}
