//! # ServiceComponent：服务下的组件
//!
//! ## 核心意图（Why）
//! - 持有某组件在各主机上的实例映射（主机名 → [`ServiceComponentHost`]），以及组件级期望状态；
//! - 主机组件的新增与读取可能同时发生：新增路径只在本组件写锁内完成“查找 + 插入”，
//!   序列化路径只在读锁内拷贝实例列表，两者都不跨层持锁。
//!
//! ## 行为契约（What）
//! - `add_service_component_host` 与 `get_or_add_service_component_host` 会先确认主机已关联到所属集群
//!   （只持集群读锁，随即释放），再进入本组件写锁插入；插入之后在锁外复核一次关联，
//!   主机若已被解除关联则撤回刚插入的实例。解除关联一侧先摘除关联、再检查实例，
//!   两侧各自复核，静止时不会留下指向未关联主机的实例；
//! - 新建实例持久化失败时同样撤回，调用方重试会重新创建并再次持久化；
//! - 挂入的实例必须由本组件构造，否则返回 [`StateError::ParentMismatch`]；
//! - `convert_to_response` 快照实例列表后释放读锁，再逐个收集实例响应并统计状态分布。

use std::{
    collections::{BTreeMap, btree_map::Entry},
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    error::StateError,
    persistence::{EntityRecord, ServiceComponentRecord, StateContext},
    response::ServiceComponentResponse,
    state::{StackId, State},
    sync::{EntityLock, LockKind},
    topology::{Service, ServiceComponentHost},
    traverse::{self, TreeNode},
};

#[derive(Debug)]
struct ComponentFields {
    desired_state: State,
    desired_stack_version: Option<StackId>,
    host_components: BTreeMap<String, Arc<ServiceComponentHost>>,
}

/// 服务下的一个组件。
#[derive(Debug)]
pub struct ServiceComponent {
    cluster_name: Arc<str>,
    service_name: Arc<str>,
    component_name: Arc<str>,
    service: Weak<Service>,
    detached: AtomicBool,
    context: StateContext,
    fields: EntityLock<ComponentFields>,
}

impl ServiceComponent {
    /// 工厂：纯构造，不加任何锁，也不挂入父服务。
    pub fn new(service: &Arc<Service>, name: impl Into<String>) -> Arc<Self> {
        let context = service.context().clone();
        let slow_hold = context.slow_hold();
        Arc::new(Self {
            cluster_name: service.cluster_name_arc(),
            service_name: service.name_arc(),
            component_name: Arc::from(name.into()),
            service: Arc::downgrade(service),
            detached: AtomicBool::new(false),
            context,
            fields: EntityLock::new(
                LockKind::ServiceComponent,
                ComponentFields {
                    desired_state: State::Init,
                    desired_stack_version: None,
                    host_components: BTreeMap::new(),
                },
                slow_hold,
            ),
        })
    }

    pub fn name(&self) -> &str {
        &self.component_name
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.component_name)
    }

    pub(crate) fn service_name_arc(&self) -> Arc<str> {
        Arc::clone(&self.service_name)
    }

    pub(crate) fn cluster_name_arc(&self) -> Arc<str> {
        Arc::clone(&self.cluster_name)
    }

    pub(crate) fn context(&self) -> &StateContext {
        &self.context
    }

    /// 沿回溯引用取得所属服务。
    pub fn service(&self) -> Result<Arc<Service>, StateError> {
        self.service
            .upgrade()
            .ok_or_else(|| StateError::detached("service", &self.service_name))
    }

    pub fn desired_state(&self) -> State {
        self.fields.read().desired_state
    }

    pub fn set_desired_state(&self, state: State) {
        self.fields.write().desired_state = state;
    }

    pub fn desired_stack_version(&self) -> Option<StackId> {
        self.fields.read().desired_stack_version.clone()
    }

    pub fn set_desired_stack_version(&self, stack: StackId) {
        self.fields.write().desired_stack_version = Some(stack);
    }

    /// 实例映射的浅拷贝。
    pub fn service_component_hosts(&self) -> BTreeMap<String, Arc<ServiceComponentHost>> {
        self.fields.read().host_components.clone()
    }

    pub fn get_service_component_host(
        &self,
        host_name: &str,
    ) -> Result<Arc<ServiceComponentHost>, StateError> {
        let found = self.fields.read().host_components.get(host_name).cloned();
        found.ok_or_else(|| self.host_component_not_found(host_name))
    }

    /// 挂入一个已构造的实例；同一主机已有实例时返回冲突。
    pub fn add_service_component_host(
        &self,
        host_component: Arc<ServiceComponentHost>,
    ) -> Result<(), StateError> {
        if !host_component.belongs_to(self) {
            return Err(StateError::ParentMismatch {
                entity: "service component host",
                name: host_component.host_name().to_owned(),
                parent_kind: "service component",
                expected: format!(
                    "{}/{}/{}",
                    host_component.cluster_name(),
                    host_component.service_name(),
                    host_component.service_component_name()
                ),
                actual: format!(
                    "{}/{}/{}",
                    self.cluster_name, self.service_name, self.component_name
                ),
            });
        }
        self.ensure_host_in_cluster(host_component.host_name())?;

        {
            let mut fields = self.fields.write();
            match fields
                .host_components
                .entry(host_component.host_name().to_owned())
            {
                Entry::Occupied(_) => {
                    return Err(StateError::DuplicateServiceComponentHost {
                        component: self.component_name.to_string(),
                        host: host_component.host_name().to_owned(),
                    });
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::clone(&host_component));
                }
            }
        }

        tracing::debug!(
            cluster = %self.cluster_name,
            service = %self.service_name,
            component = %self.component_name,
            host = host_component.host_name(),
            "host component attached"
        );
        self.confirm_host_in_cluster(&host_component)
    }

    /// 幂等创建：查找与插入在同一次写锁内完成，新建实例在锁外持久化。
    ///
    /// 持久化失败时实例被撤回，返回错误；并发拿到同一实例的调用者会看到它变为 detached。
    pub fn get_or_add_service_component_host(
        self: &Arc<Self>,
        host_name: &str,
    ) -> Result<Arc<ServiceComponentHost>, StateError> {
        self.ensure_host_in_cluster(host_name)?;

        let (host_component, created) = {
            let mut fields = self.fields.write();
            match fields.host_components.entry(host_name.to_owned()) {
                Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
                Entry::Vacant(vacant) => {
                    let created = ServiceComponentHost::new(self, host_name);
                    vacant.insert(Arc::clone(&created));
                    (created, true)
                }
            }
        };

        if created {
            tracing::debug!(
                cluster = %self.cluster_name,
                service = %self.service_name,
                component = %self.component_name,
                host = host_name,
                "host component created"
            );
            self.confirm_host_in_cluster(&host_component)?;
            if let Err(err) = host_component.persist() {
                self.withdraw_host_component(&host_component);
                return Err(err);
            }
        }
        Ok(host_component)
    }

    /// 移除实例并标记为 detached；仍持有该实例的读者在遍历时会跳过它。
    pub fn delete_service_component_host(
        &self,
        host_name: &str,
    ) -> Result<Arc<ServiceComponentHost>, StateError> {
        let removed = {
            let mut fields = self.fields.write();
            let removed = fields.host_components.remove(host_name);
            if let Some(host_component) = &removed {
                host_component.mark_detached();
            }
            removed
        };

        match removed {
            Some(host_component) => {
                tracing::debug!(
                    service = %self.service_name,
                    component = %self.component_name,
                    host = host_name,
                    "host component removed"
                );
                Ok(host_component)
            }
            None => Err(self.host_component_not_found(host_name)),
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub(crate) fn mark_detached(&self) {
        self.detached.store(true, Ordering::Release);
    }

    /// 本组件是否由 `service` 构造。
    pub(crate) fn belongs_to(&self, service: &Service) -> bool {
        core::ptr::eq(self.service.as_ptr(), service)
    }

    /// 快照后递归：本层读锁只覆盖字段拷贝与实例列表快照。
    pub fn convert_to_response(&self) -> ServiceComponentResponse {
        let (desired_state, desired_stack_version, snapshot) = {
            let fields = self.fields.read();
            (
                fields.desired_state,
                fields.desired_stack_version.clone(),
                fields.host_components.values().cloned().collect::<Vec<_>>(),
            )
        };

        ServiceComponentResponse {
            cluster_name: self.cluster_name.to_string(),
            service_name: self.service_name.to_string(),
            component_name: self.component_name.to_string(),
            desired_state,
            desired_stack_version,
            total_count: 0,
            installed_count: 0,
            started_count: 0,
            host_components: traverse::collect_child_responses(&self.component_name, snapshot),
        }
        .tally()
    }

    pub fn persist(&self) -> Result<(), StateError> {
        let record = {
            let fields = self.fields.read();
            ServiceComponentRecord {
                cluster_name: self.cluster_name.to_string(),
                service_name: self.service_name.to_string(),
                component_name: self.component_name.to_string(),
                desired_state: fields.desired_state,
                desired_stack_version: fields.desired_stack_version.clone(),
            }
        };
        self.context
            .persist(EntityRecord::ServiceComponent(record))
    }

    fn host_component_not_found(&self, host_name: &str) -> StateError {
        StateError::ServiceComponentHostNotFound {
            cluster: self.cluster_name.to_string(),
            service: self.service_name.to_string(),
            component: self.component_name.to_string(),
            host: host_name.to_owned(),
        }
    }

    /// 插入之后复核主机关联，主机已被解除关联时撤回实例。
    fn confirm_host_in_cluster(
        &self,
        host_component: &Arc<ServiceComponentHost>,
    ) -> Result<(), StateError> {
        self.ensure_host_in_cluster(host_component.host_name())
            .inspect_err(|_| {
                self.withdraw_host_component(host_component);
                tracing::debug!(
                    cluster = %self.cluster_name,
                    component = %self.component_name,
                    host = host_component.host_name(),
                    "host unmapped while attaching; host component withdrawn"
                );
            })
    }

    /// 撤回刚挂入的实例；映射中已换成其他实例时不做改动。
    fn withdraw_host_component(&self, host_component: &Arc<ServiceComponentHost>) {
        let mut fields = self.fields.write();
        let same = fields
            .host_components
            .get(host_component.host_name())
            .is_some_and(|current| Arc::ptr_eq(current, host_component));
        if same {
            fields.host_components.remove(host_component.host_name());
            host_component.mark_detached();
        }
    }

    /// 确认主机已关联到所属集群；只持集群读锁。
    fn ensure_host_in_cluster(&self, host_name: &str) -> Result<(), StateError> {
        let cluster = self.service()?.cluster()?;
        if cluster.has_host(host_name) {
            Ok(())
        } else {
            Err(StateError::HostNotInCluster {
                cluster: self.cluster_name.to_string(),
                host: host_name.to_owned(),
            })
        }
    }
}

impl TreeNode for ServiceComponent {
    type Response = ServiceComponentResponse;

    fn node_name(&self) -> &str {
        &self.component_name
    }

    fn is_detached(&self) -> bool {
        ServiceComponent::is_detached(self)
    }

    fn convert_to_response(&self) -> ServiceComponentResponse {
        ServiceComponent::convert_to_response(self)
    }
}
