//! 告警定义解析的错误域。

use std::io;

use thiserror::Error;

/// 读取或解码告警定义失败的原因。
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("could not read alert definition file `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// 文档不是合法 JSON，或某个字段不符合对应来源的结构。
    #[error("malformed alert definition document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("alert source has no string `type` field")]
    MissingSourceType,

    #[error("alert source type `{source_type}` is not supported")]
    UnsupportedSourceType { source_type: String },
}
