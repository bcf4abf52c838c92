//! # 响应快照
//!
//! `convert_to_response()` 的产物：纯数据、不含任何锁或回溯引用，可直接交给 API 层序列化。
//! 每一层只在自身读锁内拷贝本层字段，子层响应在锁外逐个收集，因此一棵响应树可能混合
//! 不同时刻的状态（跨层只保证最终一致）。

use serde::Serialize;

use crate::state::{MaintenanceState, RepositoryVersionState, StackId, State};

/// 集群响应。
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ClusterResponse {
    pub cluster_id: i64,
    pub cluster_name: String,
    pub provisioning_state: State,
    pub desired_stack_version: Option<StackId>,
    pub total_hosts: usize,
    /// 快照时刻关联的主机名，已排序。
    pub host_names: Vec<String>,
    pub cluster_versions: Vec<ClusterVersion>,
    pub config_group_count: usize,
    pub services: Vec<ServiceResponse>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ServiceResponse {
    pub cluster_name: String,
    pub service_name: String,
    pub desired_state: State,
    pub maintenance_state: MaintenanceState,
    pub desired_stack_version: Option<StackId>,
    pub components: Vec<ServiceComponentResponse>,
}

/// 组件响应，附带按实际状态统计的实例数量。
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ServiceComponentResponse {
    pub cluster_name: String,
    pub service_name: String,
    pub component_name: String,
    pub desired_state: State,
    pub desired_stack_version: Option<StackId>,
    pub total_count: usize,
    pub installed_count: usize,
    pub started_count: usize,
    pub host_components: Vec<ServiceComponentHostResponse>,
}

impl ServiceComponentResponse {
    /// 根据子响应补齐统计字段。
    pub(crate) fn tally(mut self) -> Self {
        self.total_count = self.host_components.len();
        self.installed_count = self
            .host_components
            .iter()
            .filter(|sch| sch.state == State::Installed)
            .count();
        self.started_count = self
            .host_components
            .iter()
            .filter(|sch| sch.state == State::Started)
            .count();
        self
    }
}

/// 主机组件响应；同时作为主机组件的持久化记录。
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ServiceComponentHostResponse {
    pub cluster_name: String,
    pub service_name: String,
    pub component_name: String,
    pub host_name: String,
    pub state: State,
    pub desired_state: State,
    pub stack_version: Option<StackId>,
    pub desired_stack_version: Option<StackId>,
    pub restart_required: bool,
    pub maintenance_state: MaintenanceState,
}

/// 集群版本记录。
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ClusterVersion {
    pub id: i64,
    pub stack: StackId,
    pub version: String,
    pub user: String,
    pub state: RepositoryVersionState,
}

/// 集群配置组。
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ConfigGroup {
    pub id: i64,
    pub name: String,
    pub tag: String,
    pub description: String,
    pub host_names: Vec<String>,
}
