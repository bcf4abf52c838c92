//! # Service：集群内的服务
//!
//! 持有组件映射与服务级期望状态、维护状态。加锁形状与 [`crate::topology::ServiceComponent`]
//! 一致：写入只触碰本层，序列化先快照组件列表再释放读锁。

use std::{
    collections::{BTreeMap, btree_map::Entry},
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    error::StateError,
    persistence::{EntityRecord, ServiceRecord, StateContext},
    response::ServiceResponse,
    state::{MaintenanceState, StackId, State},
    sync::{EntityLock, LockKind},
    topology::{Cluster, ServiceComponent},
    traverse::{self, TreeNode},
};

#[derive(Debug)]
struct ServiceFields {
    desired_state: State,
    maintenance_state: MaintenanceState,
    desired_stack_version: Option<StackId>,
    components: BTreeMap<String, Arc<ServiceComponent>>,
}

/// 集群内的一个服务。
#[derive(Debug)]
pub struct Service {
    cluster_name: Arc<str>,
    service_name: Arc<str>,
    cluster: Weak<Cluster>,
    detached: AtomicBool,
    context: StateContext,
    fields: EntityLock<ServiceFields>,
}

impl Service {
    /// 工厂：纯构造，不加任何锁，也不挂入集群。
    pub fn new(cluster: &Arc<Cluster>, name: impl Into<String>) -> Arc<Self> {
        let context = cluster.context().clone();
        let slow_hold = context.slow_hold();
        Arc::new(Self {
            cluster_name: cluster.name_arc(),
            service_name: Arc::from(name.into()),
            cluster: Arc::downgrade(cluster),
            detached: AtomicBool::new(false),
            context,
            fields: EntityLock::new(
                LockKind::Service,
                ServiceFields {
                    desired_state: State::Init,
                    maintenance_state: MaintenanceState::Off,
                    desired_stack_version: None,
                    components: BTreeMap::new(),
                },
                slow_hold,
            ),
        })
    }

    pub fn name(&self) -> &str {
        &self.service_name
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.service_name)
    }

    pub(crate) fn cluster_name_arc(&self) -> Arc<str> {
        Arc::clone(&self.cluster_name)
    }

    pub(crate) fn context(&self) -> &StateContext {
        &self.context
    }

    pub fn cluster(&self) -> Result<Arc<Cluster>, StateError> {
        self.cluster
            .upgrade()
            .ok_or_else(|| StateError::detached("cluster", &self.cluster_name))
    }

    pub fn desired_state(&self) -> State {
        self.fields.read().desired_state
    }

    pub fn set_desired_state(&self, state: State) {
        self.fields.write().desired_state = state;
    }

    pub fn maintenance_state(&self) -> MaintenanceState {
        self.fields.read().maintenance_state
    }

    pub fn set_maintenance_state(&self, state: MaintenanceState) {
        self.fields.write().maintenance_state = state;
    }

    pub fn desired_stack_version(&self) -> Option<StackId> {
        self.fields.read().desired_stack_version.clone()
    }

    pub fn set_desired_stack_version(&self, stack: StackId) {
        self.fields.write().desired_stack_version = Some(stack);
    }

    pub fn service_components(&self) -> BTreeMap<String, Arc<ServiceComponent>> {
        self.fields.read().components.clone()
    }

    pub fn get_service_component(
        &self,
        component_name: &str,
    ) -> Result<Arc<ServiceComponent>, StateError> {
        let found = self.fields.read().components.get(component_name).cloned();
        found.ok_or_else(|| StateError::ServiceComponentNotFound {
            cluster: self.cluster_name.to_string(),
            service: self.service_name.to_string(),
            component: component_name.to_owned(),
        })
    }

    /// 挂入一个已构造的组件；组件必须由本服务构造。
    pub fn add_service_component(&self, component: Arc<ServiceComponent>) -> Result<(), StateError> {
        if !component.belongs_to(self) {
            return Err(StateError::ParentMismatch {
                entity: "service component",
                name: component.name().to_owned(),
                parent_kind: "service",
                expected: format!("{}/{}", component.cluster_name(), component.service_name()),
                actual: format!("{}/{}", self.cluster_name, self.service_name),
            });
        }
        {
            let mut fields = self.fields.write();
            match fields.components.entry(component.name().to_owned()) {
                Entry::Occupied(_) => {
                    return Err(StateError::DuplicateServiceComponent {
                        service: self.service_name.to_string(),
                        component: component.name().to_owned(),
                    });
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::clone(&component));
                }
            }
        }
        tracing::debug!(
            cluster = %self.cluster_name,
            service = %self.service_name,
            component = component.name(),
            "component attached"
        );
        Ok(())
    }

    /// 幂等创建组件；并发调用者拿到同一个实例。持久化失败时新组件被撤回。
    pub fn get_or_add_service_component(
        self: &Arc<Self>,
        component_name: &str,
    ) -> Result<Arc<ServiceComponent>, StateError> {
        let (component, created) = {
            let mut fields = self.fields.write();
            match fields.components.entry(component_name.to_owned()) {
                Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
                Entry::Vacant(vacant) => {
                    let created = ServiceComponent::new(self, component_name);
                    vacant.insert(Arc::clone(&created));
                    (created, true)
                }
            }
        };

        if created {
            tracing::debug!(
                cluster = %self.cluster_name,
                service = %self.service_name,
                component = component_name,
                "component created"
            );
            if let Err(err) = component.persist() {
                self.withdraw_service_component(&component);
                return Err(err);
            }
        }
        Ok(component)
    }

    pub fn delete_service_component(
        &self,
        component_name: &str,
    ) -> Result<Arc<ServiceComponent>, StateError> {
        let removed = {
            let mut fields = self.fields.write();
            let removed = fields.components.remove(component_name);
            if let Some(component) = &removed {
                component.mark_detached();
            }
            removed
        };

        let component = removed.ok_or_else(|| StateError::ServiceComponentNotFound {
            cluster: self.cluster_name.to_string(),
            service: self.service_name.to_string(),
            component: component_name.to_owned(),
        })?;
        tracing::debug!(
            cluster = %self.cluster_name,
            service = %self.service_name,
            component = component_name,
            "component removed"
        );
        Ok(component)
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub(crate) fn mark_detached(&self) {
        self.detached.store(true, Ordering::Release);
    }

    /// 本服务是否由 `cluster` 构造。
    pub(crate) fn belongs_to(&self, cluster: &Cluster) -> bool {
        core::ptr::eq(self.cluster.as_ptr(), cluster)
    }

    fn withdraw_service_component(&self, component: &Arc<ServiceComponent>) {
        let mut fields = self.fields.write();
        let same = fields
            .components
            .get(component.name())
            .is_some_and(|current| Arc::ptr_eq(current, component));
        if same {
            fields.components.remove(component.name());
            component.mark_detached();
        }
    }

    pub fn convert_to_response(&self) -> ServiceResponse {
        let (desired_state, maintenance_state, desired_stack_version, snapshot) = {
            let fields = self.fields.read();
            (
                fields.desired_state,
                fields.maintenance_state,
                fields.desired_stack_version.clone(),
                fields.components.values().cloned().collect::<Vec<_>>(),
            )
        };

        ServiceResponse {
            cluster_name: self.cluster_name.to_string(),
            service_name: self.service_name.to_string(),
            desired_state,
            maintenance_state,
            desired_stack_version,
            components: traverse::collect_child_responses(&self.service_name, snapshot),
        }
    }

    pub fn persist(&self) -> Result<(), StateError> {
        let record = {
            let fields = self.fields.read();
            ServiceRecord {
                cluster_name: self.cluster_name.to_string(),
                service_name: self.service_name.to_string(),
                desired_state: fields.desired_state,
                maintenance_state: fields.maintenance_state,
                desired_stack_version: fields.desired_stack_version.clone(),
            }
        };
        self.context.persist(EntityRecord::Service(record))
    }
}

impl TreeNode for Service {
    type Response = ServiceResponse;

    fn node_name(&self) -> &str {
        &self.service_name
    }

    fn is_detached(&self) -> bool {
        Service::is_detached(self)
    }

    fn convert_to_response(&self) -> ServiceResponse {
        Service::convert_to_response(self)
    }
}
