//! # ServiceComponentHost：叶子实体
//!
//! ## 核心意图（Why）
//! - 表示“某组件在某主机上的一个实例”，承载心跳、重启逻辑高频写入的运行状态；
//! - 本实体是并发安全的状态容器，而不是工作流引擎：任意状态之间都可以直接写入，
//!   跃迁约束由外层编排负责。
//!
//! ## 行为契约（What）
//! - 每个 setter 获取自身写锁、修改单个字段、立即释放；setter 内部从不触碰其他实体的锁；
//! - [`ServiceComponentHost::convert_to_response`] 在读锁内拷贝全部字段后释放；
//! - 名称字段（集群/服务/组件/主机）在构造后不可变，存放在锁外，读取无需加锁。

use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    error::StateError,
    persistence::{EntityRecord, StateContext},
    response::ServiceComponentHostResponse,
    state::{MaintenanceState, StackId, State},
    sync::{EntityLock, LockKind},
    topology::ServiceComponent,
    traverse::TreeNode,
};

#[derive(Debug)]
struct HostComponentFields {
    state: State,
    desired_state: State,
    stack_version: Option<StackId>,
    desired_stack_version: Option<StackId>,
    restart_required: bool,
    maintenance_state: MaintenanceState,
}

/// 组件在单台主机上的实例。
#[derive(Debug)]
pub struct ServiceComponentHost {
    cluster_name: Arc<str>,
    service_name: Arc<str>,
    component_name: Arc<str>,
    host_name: Arc<str>,
    component: Weak<ServiceComponent>,
    detached: AtomicBool,
    context: StateContext,
    fields: EntityLock<HostComponentFields>,
}

impl ServiceComponentHost {
    /// 工厂：纯构造，不加任何锁。
    ///
    /// 父组件可以在持有自身写锁时调用本函数；返回的实例尚未挂入父组件映射。
    pub fn new(component: &Arc<ServiceComponent>, host_name: impl Into<String>) -> Arc<Self> {
        let context = component.context().clone();
        let slow_hold = context.slow_hold();
        Arc::new(Self {
            cluster_name: component.cluster_name_arc(),
            service_name: component.service_name_arc(),
            component_name: component.name_arc(),
            host_name: Arc::from(host_name.into()),
            component: Arc::downgrade(component),
            detached: AtomicBool::new(false),
            context,
            fields: EntityLock::new(
                LockKind::ServiceComponentHost,
                HostComponentFields {
                    state: State::Init,
                    desired_state: State::Init,
                    stack_version: None,
                    desired_stack_version: None,
                    restart_required: false,
                    maintenance_state: MaintenanceState::Off,
                },
                slow_hold,
            ),
        })
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn service_component_name(&self) -> &str {
        &self.component_name
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// 沿回溯引用取得所属组件。
    pub fn service_component(&self) -> Result<Arc<ServiceComponent>, StateError> {
        self.component
            .upgrade()
            .ok_or_else(|| StateError::detached("service component", &self.component_name))
    }

    pub fn state(&self) -> State {
        self.fields.read().state
    }

    pub fn set_state(&self, state: State) {
        self.fields.write().state = state;
    }

    pub fn desired_state(&self) -> State {
        self.fields.read().desired_state
    }

    pub fn set_desired_state(&self, state: State) {
        self.fields.write().desired_state = state;
    }

    pub fn stack_version(&self) -> Option<StackId> {
        self.fields.read().stack_version.clone()
    }

    pub fn set_stack_version(&self, stack: StackId) {
        self.fields.write().stack_version = Some(stack);
    }

    pub fn desired_stack_version(&self) -> Option<StackId> {
        self.fields.read().desired_stack_version.clone()
    }

    pub fn set_desired_stack_version(&self, stack: StackId) {
        self.fields.write().desired_stack_version = Some(stack);
    }

    pub fn is_restart_required(&self) -> bool {
        self.fields.read().restart_required
    }

    pub fn set_restart_required(&self, restart_required: bool) {
        self.fields.write().restart_required = restart_required;
    }

    pub fn maintenance_state(&self) -> MaintenanceState {
        self.fields.read().maintenance_state
    }

    pub fn set_maintenance_state(&self, state: MaintenanceState) {
        self.fields.write().maintenance_state = state;
    }

    /// 是否已从所属组件移除。
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub(crate) fn mark_detached(&self) {
        self.detached.store(true, Ordering::Release);
    }

    /// 本实例是否由 `component` 构造。
    pub(crate) fn belongs_to(&self, component: &ServiceComponent) -> bool {
        core::ptr::eq(self.component.as_ptr(), component)
    }

    /// 拷贝全部字段为不可变响应。
    pub fn convert_to_response(&self) -> ServiceComponentHostResponse {
        let fields = self.fields.read();
        ServiceComponentHostResponse {
            cluster_name: self.cluster_name.to_string(),
            service_name: self.service_name.to_string(),
            component_name: self.component_name.to_string(),
            host_name: self.host_name.to_string(),
            state: fields.state,
            desired_state: fields.desired_state,
            stack_version: fields.stack_version.clone(),
            desired_stack_version: fields.desired_stack_version.clone(),
            restart_required: fields.restart_required,
            maintenance_state: fields.maintenance_state,
        }
    }

    /// 在锁外把当前字段交给持久化协作方。
    pub fn persist(&self) -> Result<(), StateError> {
        let record = EntityRecord::ServiceComponentHost(self.convert_to_response());
        self.context.persist(record)
    }
}

impl TreeNode for ServiceComponentHost {
    type Response = ServiceComponentHostResponse;

    fn node_name(&self) -> &str {
        &self.host_name
    }

    fn is_detached(&self) -> bool {
        ServiceComponentHost::is_detached(self)
    }

    fn convert_to_response(&self) -> ServiceComponentHostResponse {
        ServiceComponentHost::convert_to_response(self)
    }
}
