//! # 持久化协作方接口
//!
//! ## 角色定位（Why）
//! - 状态树只负责内存权威，落盘由外部协作方完成；本模块定义二者之间的唯一接缝 [`Persistence`]；
//! - 实体的 `persist()` 先在自身读锁内拷贝出浅层 [`EntityRecord`]，释放锁后再调用协作方，
//!   协作方因此永远不会在任何读者可能等待的临界区内执行。
//!
//! ## 契约（What）
//! - 实现方不得回调状态树中需要加锁的方法；
//! - 显式 `persist()` 返回错误时内存状态已经生效，调用方自行决定是否重试；
//!   `get_or_add_*` 与 `add_cluster` 的首次持久化失败会撤回新建实体；
//! - 记录只包含实体自身字段，不包含子树。

use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    config::StateSettings,
    error::StateError,
    response::ServiceComponentHostResponse,
    state::{MaintenanceState, StackId, State},
};

/// 交给持久化协作方的浅层实体记录。
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EntityRecord {
    Cluster(ClusterRecord),
    Host(HostRecord),
    Service(ServiceRecord),
    ServiceComponent(ServiceComponentRecord),
    ServiceComponentHost(ServiceComponentHostResponse),
}

impl EntityRecord {
    /// 记录所属实体的类别名，用于日志字段。
    pub fn kind(&self) -> &'static str {
        match self {
            EntityRecord::Cluster(_) => "cluster",
            EntityRecord::Host(_) => "host",
            EntityRecord::Service(_) => "service",
            EntityRecord::ServiceComponent(_) => "service_component",
            EntityRecord::ServiceComponentHost(_) => "service_component_host",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ClusterRecord {
    pub cluster_id: i64,
    pub cluster_name: String,
    pub desired_stack_version: Option<StackId>,
    pub provisioning_state: State,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct HostRecord {
    pub host_name: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ServiceRecord {
    pub cluster_name: String,
    pub service_name: String,
    pub desired_state: State,
    pub maintenance_state: MaintenanceState,
    pub desired_stack_version: Option<StackId>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ServiceComponentRecord {
    pub cluster_name: String,
    pub service_name: String,
    pub component_name: String,
    pub desired_state: State,
    pub desired_stack_version: Option<StackId>,
}

/// 持久化协作方。
pub trait Persistence: Send + Sync + 'static {
    fn persist(&self, record: EntityRecord) -> Result<(), StateError>;
}

/// 丢弃所有记录，适用于纯内存部署。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPersistence;

impl Persistence for NoopPersistence {
    fn persist(&self, _record: EntityRecord) -> Result<(), StateError> {
        Ok(())
    }
}

/// 按调用顺序记录所有持久化请求，供测试断言。
#[derive(Debug, Default)]
pub struct RecordingPersistence {
    records: Mutex<Vec<EntityRecord>>,
}

impl RecordingPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录内容的拷贝。
    pub fn records(&self) -> Vec<EntityRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Persistence for RecordingPersistence {
    fn persist(&self, record: EntityRecord) -> Result<(), StateError> {
        self.records.lock().push(record);
        Ok(())
    }
}

/// 实体共享的运行上下文：配置与持久化协作方。
///
/// 由注册表创建，集群、服务、组件、主机组件在构造时从父实体克隆一份。
#[derive(Clone)]
pub(crate) struct StateContext {
    settings: Arc<StateSettings>,
    persistence: Arc<dyn Persistence>,
}

impl StateContext {
    pub(crate) fn new(settings: Arc<StateSettings>, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            settings,
            persistence,
        }
    }

    pub(crate) fn settings(&self) -> &StateSettings {
        &self.settings
    }

    pub(crate) fn slow_hold(&self) -> Option<core::time::Duration> {
        self.settings.locking.slow_hold_threshold()
    }

    /// 调用协作方；调用方必须已释放所有实体锁。
    pub(crate) fn persist(&self, record: EntityRecord) -> Result<(), StateError> {
        debug_assert_eq!(
            crate::sync::held_entity_locks(),
            0,
            "persist() must run outside every entity critical section"
        );
        let kind = record.kind();
        self.persistence.persist(record).inspect_err(|err| {
            tracing::warn!(entity = kind, error = %err, "persisting entity failed");
        })
    }
}

impl fmt::Debug for StateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use core::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// 可切换的协作方：拒绝期间返回错误，放行期间记录实体类别。
    #[derive(Debug, Default)]
    pub(crate) struct FlakyPersistence {
        reject: AtomicBool,
        accepted: Mutex<Vec<&'static str>>,
    }

    impl FlakyPersistence {
        pub(crate) fn rejecting() -> Self {
            let persistence = Self::default();
            persistence.set_reject(true);
            persistence
        }

        pub(crate) fn set_reject(&self, reject: bool) {
            self.reject.store(reject, Ordering::SeqCst);
        }

        pub(crate) fn accepted(&self) -> Vec<&'static str> {
            self.accepted.lock().clone()
        }
    }

    impl Persistence for FlakyPersistence {
        fn persist(&self, record: EntityRecord) -> Result<(), StateError> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(StateError::Persistence {
                    detail: format!("{} rejected", record.kind()),
                });
            }
            self.accepted.lock().push(record.kind());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectingPersistence;

    impl Persistence for RejectingPersistence {
        fn persist(&self, _record: EntityRecord) -> Result<(), StateError> {
            Err(StateError::Persistence {
                detail: "disk full".into(),
            })
        }
    }

    fn host_record() -> EntityRecord {
        EntityRecord::Host(HostRecord {
            host_name: "h1".into(),
            attributes: BTreeMap::new(),
        })
    }

    #[test]
    fn recording_persistence_keeps_call_order() {
        let recorder = Arc::new(RecordingPersistence::new());
        let context = StateContext::new(Arc::new(StateSettings::default()), recorder.clone());
        context.persist(host_record()).expect("记录成功");
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.records()[0].kind(), "host");
    }

    #[test]
    #[tracing_test::traced_test]
    fn failures_are_logged_and_propagated() {
        let context = StateContext::new(
            Arc::new(StateSettings::default()),
            Arc::new(RejectingPersistence),
        );
        let err = context.persist(host_record()).expect_err("协作方拒绝");
        assert_eq!(
            err,
            StateError::Persistence {
                detail: "disk full".into()
            }
        );
        assert!(logs_contain("persisting entity failed"));
    }

    #[test]
    fn records_serialize_with_entity_tag() {
        let json = serde_json::to_value(host_record()).expect("序列化");
        assert_eq!(json["entity"], "host");
        assert_eq!(json["host_name"], "h1");
    }
}
