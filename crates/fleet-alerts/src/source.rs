//! # 告警来源
//!
//! ## 核心意图（Why）
//! - 告警来源是封闭的和类型：指标、端口、脚本、聚合、百分比，各自携带不同字段；
//! - 文档用 `type` 字段区分变体。解码时先读出标签，再按标签选择具体结构反序列化，
//!   因此未知标签会得到 [`AlertError::UnsupportedSourceType`]，而不是一条泛化的 JSON 错误。
//!
//! ## 契约（What）
//! - 所有变体共享可选的 `reporting` 模板（ok / warning / critical 三档文案与阈值）；
//! - 序列化时重新写出 `type` 标签，输出可以被 [`Source::from_value`] 原样读回。

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AlertError;

/// 来源类型标签。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SourceType {
    Metric,
    Port,
    Script,
    Aggregate,
    Percent,
}

impl SourceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceType::Metric => "METRIC",
            SourceType::Port => "PORT",
            SourceType::Script => "SCRIPT",
            SourceType::Aggregate => "AGGREGATE",
            SourceType::Percent => "PERCENT",
        }
    }
}

impl FromStr for SourceType {
    type Err = AlertError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "METRIC" => Ok(SourceType::Metric),
            "PORT" => Ok(SourceType::Port),
            "SCRIPT" => Ok(SourceType::Script),
            "AGGREGATE" => Ok(SourceType::Aggregate),
            "PERCENT" => Ok(SourceType::Percent),
            other => Err(AlertError::UnsupportedSourceType {
                source_type: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单档告警文案；`value` 为该档的触发阈值。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reporting {
    pub ok: ReportTemplate,
    pub warning: ReportTemplate,
    pub critical: ReportTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

/// 指标端点地址，`https_property` 等于 `https_property_value` 时使用 HTTPS。
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AlertUri {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_property_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_port: Option<u16>,
}

/// 一组指标属性及其取值表达式。
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MetricInfo {
    #[serde(default)]
    pub property_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting: Option<Reporting>,
    #[serde(default)]
    pub uri: AlertUri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jmx: Option<MetricInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ganglia: Option<MetricInfo>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting: Option<Reporting>,
    pub uri: String,
    pub default_port: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting: Option<Reporting>,
    pub path: String,
}

/// 对另一条告警在多台主机上的结果做聚合。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting: Option<Reporting>,
    pub alert_name: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MetricField {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// 以 `numerator / denominator` 的百分比与阈值比较。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PercentSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting: Option<Reporting>,
    pub numerator: MetricField,
    pub denominator: MetricField,
}

/// 告警来源。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    Metric(MetricSource),
    Port(PortSource),
    Script(ScriptSource),
    Aggregate(AggregateSource),
    Percent(PercentSource),
}

impl Source {
    /// 按 `type` 标签分派解码。
    pub fn from_value(value: Value) -> Result<Self, AlertError> {
        let source_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(AlertError::MissingSourceType)?
            .parse::<SourceType>()?;

        let source = match source_type {
            SourceType::Metric => Source::Metric(serde_json::from_value(value)?),
            SourceType::Port => Source::Port(serde_json::from_value(value)?),
            SourceType::Script => Source::Script(serde_json::from_value(value)?),
            SourceType::Aggregate => Source::Aggregate(serde_json::from_value(value)?),
            SourceType::Percent => Source::Percent(serde_json::from_value(value)?),
        };
        Ok(source)
    }

    /// 从 JSON 文本解码。
    pub fn from_json(text: &str) -> Result<Self, AlertError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            Source::Metric(_) => SourceType::Metric,
            Source::Port(_) => SourceType::Port,
            Source::Script(_) => SourceType::Script,
            Source::Aggregate(_) => SourceType::Aggregate,
            Source::Percent(_) => SourceType::Percent,
        }
    }

    pub fn reporting(&self) -> Option<&Reporting> {
        match self {
            Source::Metric(source) => source.reporting.as_ref(),
            Source::Port(source) => source.reporting.as_ref(),
            Source::Script(source) => source.reporting.as_ref(),
            Source::Aggregate(source) => source.reporting.as_ref(),
            Source::Percent(source) => source.reporting.as_ref(),
        }
    }
}
