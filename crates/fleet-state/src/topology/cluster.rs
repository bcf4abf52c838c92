//! # Cluster：实体树的根
//!
//! ## 核心意图（Why）
//! - 集群是竞争最激烈的实体：心跳线程写期望栈版本与供给状态，API 线程序列化整棵树，
//!   安装流程不断创建服务；
//! - 集群锁因此只覆盖本层字段（标量、服务映射、主机关联、版本记录、配置组），
//!   任何需要下钻的操作都先拷贝 `Arc` 快照再释放锁。
//!
//! ## 行为契约（What）
//! - setter 只写单个字段后立即返回，绝不级联到子实体；
//! - [`Cluster::convert_to_response`] 与 [`Cluster::service_component_hosts`] 都是“快照后递归”；
//! - 主机关联由注册表维护（见 [`crate::registry::Clusters::map_host_to_cluster`]），
//!   集群自身的主机集合是唯一的权威记录，本类型只暴露查询接口。
//!
//! ## 风险提示（Trade-offs）
//! - 跨层只保证单遍尽力一致：响应树中的服务列表与各服务内部状态可能来自不同时刻。

use std::{
    collections::{BTreeMap, BTreeSet, btree_map::Entry},
    sync::Arc,
};

use crate::{
    error::StateError,
    persistence::{ClusterRecord, EntityRecord, StateContext},
    response::{ClusterResponse, ClusterVersion, ConfigGroup},
    state::{RepositoryVersionState, StackId, State},
    sync::{EntityLock, LockKind},
    topology::{Service, ServiceComponentHost},
    traverse,
};

#[derive(Debug)]
struct ClusterFields {
    desired_stack_version: Option<StackId>,
    provisioning_state: State,
    services: BTreeMap<String, Arc<Service>>,
    host_names: BTreeSet<String>,
    cluster_versions: Vec<ClusterVersion>,
    next_version_id: i64,
    config_groups: BTreeMap<i64, ConfigGroup>,
}

impl ClusterFields {
    fn version_index(&self, stack: &StackId, version: &str) -> Option<usize> {
        self.cluster_versions
            .iter()
            .position(|record| &record.stack == stack && record.version == version)
    }
}

/// 受管集群。
#[derive(Debug)]
pub struct Cluster {
    cluster_id: i64,
    cluster_name: Arc<str>,
    context: StateContext,
    fields: EntityLock<ClusterFields>,
}

impl Cluster {
    /// 仅由注册表调用；初始字段取自配置中的集群默认值。
    pub(crate) fn new(cluster_id: i64, name: &str, context: StateContext) -> Arc<Self> {
        let defaults = &context.settings().cluster;
        let fields = ClusterFields {
            desired_stack_version: defaults.default_stack.clone(),
            provisioning_state: defaults.default_provisioning_state,
            services: BTreeMap::new(),
            host_names: BTreeSet::new(),
            cluster_versions: Vec::new(),
            next_version_id: 1,
            config_groups: BTreeMap::new(),
        };
        let slow_hold = context.slow_hold();
        Arc::new(Self {
            cluster_id,
            cluster_name: Arc::from(name),
            fields: EntityLock::new(LockKind::Cluster, fields, slow_hold),
            context,
        })
    }

    pub fn cluster_id(&self) -> i64 {
        self.cluster_id
    }

    pub fn name(&self) -> &str {
        &self.cluster_name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.cluster_name)
    }

    pub(crate) fn context(&self) -> &StateContext {
        &self.context
    }

    pub fn desired_stack_version(&self) -> Option<StackId> {
        self.fields.read().desired_stack_version.clone()
    }

    /// 只写集群自身字段；各服务的期望栈版本不受影响。
    pub fn set_desired_stack_version(&self, stack: StackId) {
        self.fields.write().desired_stack_version = Some(stack);
    }

    pub fn provisioning_state(&self) -> State {
        self.fields.read().provisioning_state
    }

    pub fn set_provisioning_state(&self, state: State) {
        self.fields.write().provisioning_state = state;
    }

    // ---- 服务 ----

    pub fn services(&self) -> BTreeMap<String, Arc<Service>> {
        self.fields.read().services.clone()
    }

    pub fn get_service(&self, service_name: &str) -> Result<Arc<Service>, StateError> {
        let found = self.fields.read().services.get(service_name).cloned();
        found.ok_or_else(|| StateError::ServiceNotFound {
            cluster: self.cluster_name.to_string(),
            service: service_name.to_owned(),
        })
    }

    /// 挂入一个已构造的服务；服务必须由本集群构造。
    pub fn add_service(&self, service: Arc<Service>) -> Result<(), StateError> {
        if !service.belongs_to(self) {
            return Err(StateError::ParentMismatch {
                entity: "service",
                name: service.name().to_owned(),
                parent_kind: "cluster",
                expected: service.cluster_name().to_owned(),
                actual: self.cluster_name.to_string(),
            });
        }
        {
            let mut fields = self.fields.write();
            match fields.services.entry(service.name().to_owned()) {
                Entry::Occupied(_) => {
                    return Err(StateError::DuplicateService {
                        cluster: self.cluster_name.to_string(),
                        service: service.name().to_owned(),
                    });
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::clone(&service));
                }
            }
        }
        tracing::debug!(
            cluster = %self.cluster_name,
            service = service.name(),
            "service attached"
        );
        Ok(())
    }

    /// 幂等创建服务：查找与插入处于同一次写锁内。持久化失败时新服务被撤回。
    pub fn get_or_add_service(self: &Arc<Self>, service_name: &str) -> Result<Arc<Service>, StateError> {
        let (service, created) = {
            let mut fields = self.fields.write();
            match fields.services.entry(service_name.to_owned()) {
                Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
                Entry::Vacant(vacant) => {
                    let created = Service::new(self, service_name);
                    vacant.insert(Arc::clone(&created));
                    (created, true)
                }
            }
        };

        if created {
            tracing::debug!(
                cluster = %self.cluster_name,
                service = service_name,
                "service created"
            );
            if let Err(err) = service.persist() {
                self.withdraw_service(&service);
                return Err(err);
            }
        }
        Ok(service)
    }

    pub fn delete_service(&self, service_name: &str) -> Result<Arc<Service>, StateError> {
        let removed = {
            let mut fields = self.fields.write();
            let removed = fields.services.remove(service_name);
            if let Some(service) = &removed {
                service.mark_detached();
            }
            removed
        };

        let service = removed.ok_or_else(|| StateError::ServiceNotFound {
            cluster: self.cluster_name.to_string(),
            service: service_name.to_owned(),
        })?;
        tracing::debug!(
            cluster = %self.cluster_name,
            service = service_name,
            "service removed"
        );
        Ok(service)
    }

    fn withdraw_service(&self, service: &Arc<Service>) {
        let mut fields = self.fields.write();
        let same = fields
            .services
            .get(service.name())
            .is_some_and(|current| Arc::ptr_eq(current, service));
        if same {
            fields.services.remove(service.name());
            service.mark_detached();
        }
    }

    // ---- 主机关联 ----

    pub fn has_host(&self, host_name: &str) -> bool {
        self.fields.read().host_names.contains(host_name)
    }

    /// 已排序的关联主机名。
    pub fn host_names(&self) -> Vec<String> {
        self.fields.read().host_names.iter().cloned().collect()
    }

    /// 返回 `false` 表示主机已关联。
    pub(crate) fn add_host_association(&self, host_name: &str) -> bool {
        self.fields.write().host_names.insert(host_name.to_owned())
    }

    pub(crate) fn remove_host_association(&self, host_name: &str) -> bool {
        self.fields.write().host_names.remove(host_name)
    }

    /// 指定主机上的全部组件实例。
    ///
    /// 逐层快照：集群读锁内拷贝服务列表，服务读锁内拷贝组件列表，组件读锁内查找实例；
    /// 任意时刻只持一把锁。遍历期间被移除的服务或组件会被跳过。
    pub fn service_component_hosts(&self, host_name: &str) -> Vec<Arc<ServiceComponentHost>> {
        let services = self.fields.read().services.values().cloned().collect::<Vec<_>>();

        let mut found = Vec::new();
        for service in services {
            if service.is_detached() {
                continue;
            }
            for component in service.service_components().into_values() {
                if component.is_detached() {
                    continue;
                }
                if let Ok(host_component) = component.get_service_component_host(host_name) {
                    found.push(host_component);
                }
            }
        }
        found
    }

    // ---- 集群版本 ----

    /// 登记一个 (栈, 版本) 记录；同一组合只能登记一次。
    pub fn create_cluster_version(
        &self,
        stack: StackId,
        version: &str,
        user: &str,
        state: RepositoryVersionState,
    ) -> Result<ClusterVersion, StateError> {
        let record = {
            let mut fields = self.fields.write();
            if fields.version_index(&stack, version).is_some() {
                return Err(StateError::DuplicateClusterVersion {
                    cluster: self.cluster_name.to_string(),
                    stack: stack.to_string(),
                    version: version.to_owned(),
                });
            }
            let record = ClusterVersion {
                id: fields.next_version_id,
                stack,
                version: version.to_owned(),
                user: user.to_owned(),
                state,
            };
            fields.next_version_id += 1;
            fields.cluster_versions.push(record.clone());
            record
        };

        tracing::debug!(
            cluster = %self.cluster_name,
            stack = %record.stack,
            version = %record.version,
            state = %record.state,
            "cluster version created"
        );
        Ok(record)
    }

    pub fn cluster_versions(&self) -> Vec<ClusterVersion> {
        self.fields.read().cluster_versions.clone()
    }

    /// 当前生效的版本记录（状态为 `CURRENT`）。
    pub fn current_cluster_version(&self) -> Option<ClusterVersion> {
        self.fields
            .read()
            .cluster_versions
            .iter()
            .find(|record| record.state == RepositoryVersionState::Current)
            .cloned()
    }

    /// 改写版本记录状态。
    ///
    /// 切换到 `CURRENT` 时，原先的 `CURRENT` 记录在同一临界区内降为 `INSTALLED`，
    /// 保证任意时刻至多一条 `CURRENT`。
    pub fn transition_cluster_version(
        &self,
        stack: &StackId,
        version: &str,
        state: RepositoryVersionState,
    ) -> Result<(), StateError> {
        let previous = {
            let mut fields = self.fields.write();
            let index = fields.version_index(stack, version).ok_or_else(|| {
                StateError::ClusterVersionNotFound {
                    cluster: self.cluster_name.to_string(),
                    stack: stack.to_string(),
                    version: version.to_owned(),
                }
            })?;

            if state == RepositoryVersionState::Current {
                for (position, record) in fields.cluster_versions.iter_mut().enumerate() {
                    if position != index && record.state == RepositoryVersionState::Current {
                        record.state = RepositoryVersionState::Installed;
                    }
                }
            }
            core::mem::replace(&mut fields.cluster_versions[index].state, state)
        };

        tracing::debug!(
            cluster = %self.cluster_name,
            stack = %stack,
            version,
            from = %previous,
            to = %state,
            "cluster version transitioned"
        );
        Ok(())
    }

    // ---- 配置组 ----

    pub fn add_config_group(&self, group: ConfigGroup) -> Result<(), StateError> {
        let mut fields = self.fields.write();
        match fields.config_groups.entry(group.id) {
            Entry::Occupied(_) => Err(StateError::DuplicateConfigGroup {
                cluster: self.cluster_name.to_string(),
                group_id: group.id,
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(group);
                Ok(())
            }
        }
    }

    pub fn delete_config_group(&self, group_id: i64) -> Result<ConfigGroup, StateError> {
        let removed = self.fields.write().config_groups.remove(&group_id);
        removed.ok_or_else(|| StateError::ConfigGroupNotFound {
            cluster: self.cluster_name.to_string(),
            group_id,
        })
    }

    pub fn config_groups(&self) -> BTreeMap<i64, ConfigGroup> {
        self.fields.read().config_groups.clone()
    }

    // ---- 序列化与持久化 ----

    /// 集群读锁只覆盖标量拷贝与服务快照，递归在锁外进行。
    pub fn convert_to_response(&self) -> ClusterResponse {
        let (
            provisioning_state,
            desired_stack_version,
            host_names,
            cluster_versions,
            config_group_count,
            snapshot,
        ) = {
            let fields = self.fields.read();
            (
                fields.provisioning_state,
                fields.desired_stack_version.clone(),
                fields.host_names.iter().cloned().collect::<Vec<_>>(),
                fields.cluster_versions.clone(),
                fields.config_groups.len(),
                fields.services.values().cloned().collect::<Vec<_>>(),
            )
        };

        ClusterResponse {
            cluster_id: self.cluster_id,
            cluster_name: self.cluster_name.to_string(),
            provisioning_state,
            desired_stack_version,
            total_hosts: host_names.len(),
            host_names,
            cluster_versions,
            config_group_count,
            services: traverse::collect_child_responses(&self.cluster_name, snapshot),
        }
    }

    pub fn persist(&self) -> Result<(), StateError> {
        let record = {
            let fields = self.fields.read();
            ClusterRecord {
                cluster_id: self.cluster_id,
                cluster_name: self.cluster_name.to_string(),
                desired_stack_version: fields.desired_stack_version.clone(),
                provisioning_state: fields.provisioning_state,
            }
        };
        self.context.persist(EntityRecord::Cluster(record))
    }
}
