//! # AlertDefinitionFactory：文档与记录到领域对象的转换
//!
//! ## 行为契约（What）
//! - `definitions_from_*`：文档顶层是 `{ "service": [...], "<COMPONENT>": [...] }`，
//!   每条定义都填入调用方给出的服务名；键不是 `"service"` 时，键本身作为组件名；
//!   同名定义只保留第一条，结果按名称排序；
//! - 文档层面的任何错误（读取失败、JSON 非法、来源标签未知）都会中止整份文档的解析；
//! - `coerce`：存储记录中的来源无法解码时记录 `error` 事件，来源留空，其余字段照常还原。

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use serde::Deserialize;
use serde_json::Value;

use crate::{
    definition::{AlertDefinition, AlertDefinitionRecord, Scope},
    error::AlertError,
    source::Source,
};

/// 作用域键 `"service"` 表示服务级告警。
const SERVICE_SCOPE_KEY: &str = "service";

/// 文档中的单条定义，来源暂存为原始 JSON。
#[derive(Debug, Deserialize)]
struct DocumentEntry {
    name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    scope: Scope,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default = "default_interval")]
    interval: u32,
    source: Value,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u32 {
    1
}

/// 无状态的告警定义工厂。
#[derive(Clone, Copy, Debug, Default)]
pub struct AlertDefinitionFactory;

impl AlertDefinitionFactory {
    pub fn new() -> Self {
        Self
    }

    /// 读取服务随附的告警定义文件。
    pub fn definitions_from_path(
        &self,
        path: impl AsRef<Path>,
        service_name: &str,
    ) -> Result<Vec<AlertDefinition>, AlertError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| {
            tracing::error!(path = %path.display(), error = %source, "could not read alert definition file");
            AlertError::Io {
                path: path.display().to_string(),
                source,
            }
        })?;
        self.definitions_from_str(&text, service_name)
    }

    /// 解析告警定义文档。
    pub fn definitions_from_str(
        &self,
        text: &str,
        service_name: &str,
    ) -> Result<Vec<AlertDefinition>, AlertError> {
        let document: BTreeMap<String, Vec<DocumentEntry>> = serde_json::from_str(text)?;

        let mut seen = BTreeSet::new();
        let mut definitions = Vec::new();
        for (scope_key, entries) in document {
            let component_name = (scope_key != SERVICE_SCOPE_KEY).then(|| scope_key.clone());
            for entry in entries {
                let definition = AlertDefinition {
                    source: Some(Source::from_value(entry.source)?),
                    name: entry.name,
                    label: entry.label,
                    service_name: service_name.to_owned(),
                    component_name: component_name.clone(),
                    scope: entry.scope,
                    enabled: entry.enabled,
                    interval: entry.interval,
                };
                if seen.insert(definition.name.clone()) {
                    definitions.push(definition);
                } else {
                    tracing::debug!(
                        service = service_name,
                        definition = %definition.name,
                        "duplicate alert definition ignored"
                    );
                }
            }
        }

        definitions.sort_by(|left, right| left.name.cmp(&right.name));
        tracing::debug!(
            service = service_name,
            count = definitions.len(),
            "alert definitions loaded"
        );
        Ok(definitions)
    }

    /// 把存储记录还原为告警定义。
    pub fn coerce(&self, record: &AlertDefinitionRecord) -> AlertDefinition {
        let source = match Source::from_json(&record.source) {
            Ok(source) => Some(source),
            Err(err) => {
                tracing::error!(
                    definition = %record.definition_name,
                    error = %err,
                    "unable to deserialize the alert definition source during coercion"
                );
                None
            }
        };

        AlertDefinition {
            name: record.definition_name.clone(),
            label: record.label.clone(),
            service_name: record.service_name.clone(),
            component_name: record.component_name.clone(),
            scope: record.scope,
            enabled: record.enabled,
            interval: record.schedule_interval,
            source,
        }
    }
}
