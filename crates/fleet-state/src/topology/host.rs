//! # Host：注册表登记的主机
//!
//! 主机不属于任何集群的子树，由注册表统一持有；集群只记录关联的主机名。
//! 主机属性（`os_family`、`os_release_version` 等）以字符串键值保存，写入时合并而非整体替换。

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    error::StateError,
    persistence::{EntityRecord, HostRecord, StateContext},
    sync::{EntityLock, LockKind},
};

const OS_FAMILY: &str = "os_family";
const OS_RELEASE_VERSION: &str = "os_release_version";

#[derive(Debug)]
struct HostFields {
    attributes: BTreeMap<String, String>,
}

/// 受管主机。
#[derive(Debug)]
pub struct Host {
    host_name: Arc<str>,
    context: StateContext,
    fields: EntityLock<HostFields>,
}

impl Host {
    pub(crate) fn new(host_name: &str, context: StateContext) -> Arc<Self> {
        let slow_hold = context.slow_hold();
        Arc::new(Self {
            host_name: Arc::from(host_name),
            context,
            fields: EntityLock::new(
                LockKind::Host,
                HostFields {
                    attributes: BTreeMap::new(),
                },
                slow_hold,
            ),
        })
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// 合并属性：同名键被覆盖，其余键保留。
    pub fn set_host_attributes<I, K, V>(&self, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let incoming = attributes
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect::<Vec<_>>();
        self.fields.write().attributes.extend(incoming);
    }

    pub fn host_attributes(&self) -> BTreeMap<String, String> {
        self.fields.read().attributes.clone()
    }

    pub fn os_family(&self) -> Option<String> {
        self.fields.read().attributes.get(OS_FAMILY).cloned()
    }

    pub fn os_release_version(&self) -> Option<String> {
        self.fields.read().attributes.get(OS_RELEASE_VERSION).cloned()
    }

    pub fn persist(&self) -> Result<(), StateError> {
        let record = HostRecord {
            host_name: self.host_name.to_string(),
            attributes: self.host_attributes(),
        };
        self.context.persist(EntityRecord::Host(record))
    }
}
