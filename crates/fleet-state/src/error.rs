//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为状态树对外暴露的错误语义提供集中定义；
//! - 区分“未命中”“冲突”“不变量违例”“协作方失败”四类，使上层的“查不到就创建”流程
//!   能够按类别精确匹配，而不必解析错误文本。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，满足 `Send + Sync + 'static`；
//! - 未命中类错误通过 [`StateError::is_not_found`] 识别，冲突类通过 [`StateError::is_conflict`] 识别；
//! - 死锁不在本枚举中：它由加锁协议在结构上排除，而不是在运行期处理。

use thiserror::Error;

/// 状态树核心错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：聚合注册表、实体树各层的失败路径，携带足以定位实体的名称上下文；
/// - **契约 (What)**：
///   - `*NotFound` 变体是可恢复、调用方可见的条件，惯用于幂等创建流程；
///   - `Duplicate*` 变体表示重复创建，通常意味着上层编排顺序有误；
///   - 其余变体为不变量违例或协作方失败；
/// - **风险 (Trade-offs)**：使用 `String` 保存上下文，牺牲少量分配换取可读性。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum StateError {
    /// 注册表中不存在该名称的集群。
    #[error("cluster `{cluster}` is not registered")]
    ClusterNotFound { cluster: String },

    /// 注册表中不存在该 ID 的集群。
    #[error("cluster with id {cluster_id} is not registered")]
    ClusterIdNotFound { cluster_id: i64 },

    /// 主机尚未登记到注册表。
    #[error("host `{host}` is not registered")]
    HostNotFound { host: String },

    /// 已知集群内未找到服务。
    #[error("service `{service}` not found in cluster `{cluster}`")]
    ServiceNotFound { cluster: String, service: String },

    /// 已知服务内未找到组件。
    #[error("component `{component}` not found in service `{service}` of cluster `{cluster}`")]
    ServiceComponentNotFound {
        cluster: String,
        service: String,
        component: String,
    },

    /// 组件在指定主机上没有实例。
    #[error(
        "component `{component}` of service `{service}` in cluster `{cluster}` is not installed on host `{host}`"
    )]
    ServiceComponentHostNotFound {
        cluster: String,
        service: String,
        component: String,
        host: String,
    },

    /// 集群中不存在对应的版本记录。
    #[error("cluster `{cluster}` has no version record for `{stack}` {version}")]
    ClusterVersionNotFound {
        cluster: String,
        stack: String,
        version: String,
    },

    /// 集群中不存在对应的配置组。
    #[error("config group {group_id} not found in cluster `{cluster}`")]
    ConfigGroupNotFound { cluster: String, group_id: i64 },

    #[error("cluster `{cluster}` already exists")]
    DuplicateCluster { cluster: String },

    #[error("host `{host}` already exists")]
    DuplicateHost { host: String },

    #[error("service `{service}` already exists in cluster `{cluster}`")]
    DuplicateService { cluster: String, service: String },

    #[error("component `{component}` already exists in service `{service}`")]
    DuplicateServiceComponent { service: String, component: String },

    #[error("component `{component}` is already installed on host `{host}`")]
    DuplicateServiceComponentHost { component: String, host: String },

    #[error("cluster `{cluster}` already has a version record for `{stack}` {version}")]
    DuplicateClusterVersion {
        cluster: String,
        stack: String,
        version: String,
    },

    #[error("config group {group_id} already exists in cluster `{cluster}`")]
    DuplicateConfigGroup { cluster: String, group_id: i64 },

    #[error("host `{host}` is already mapped to cluster `{cluster}`")]
    DuplicateHostMapping { cluster: String, host: String },

    /// 主机上仍有组件实例，不能解除与集群的关联。
    #[error("host `{host}` still carries {components} component(s) in cluster `{cluster}`")]
    HostInUse {
        cluster: String,
        host: String,
        components: usize,
    },

    /// 主机组件指向的主机未与所属集群关联。
    #[error("host `{host}` is not mapped to cluster `{cluster}`")]
    HostNotInCluster { cluster: String, host: String },

    /// 子实体构造时绑定的父实体不是接收它的实体。
    #[error("{entity} `{name}` was built for {parent_kind} `{expected}`, not `{actual}`")]
    ParentMismatch {
        entity: &'static str,
        name: String,
        parent_kind: &'static str,
        expected: String,
        actual: String,
    },

    /// 回溯引用的父实体已被释放。
    ///
    /// 回溯引用是非拥有的 `Weak`，父实体整体释放后子实体仍可能被调用方持有。
    #[error("{entity} `{name}` is detached from its parent")]
    Detached { entity: &'static str, name: String },

    #[error("`{value}` is not a valid stack id (expected `<name>-<version>`)")]
    InvalidStackId { value: String },

    /// 持久化协作方报告失败；新建实体会被撤回，其余写入已经生效。
    #[error("persistence failed: {detail}")]
    Persistence { detail: String },

    /// 进程级注册表被重复安装。
    #[error("the global cluster registry is already installed")]
    RegistryAlreadyInstalled,
}

impl StateError {
    /// 是否属于“未命中”类，可被幂等创建流程捕获后转入创建分支。
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StateError::ClusterNotFound { .. }
                | StateError::ClusterIdNotFound { .. }
                | StateError::HostNotFound { .. }
                | StateError::ServiceNotFound { .. }
                | StateError::ServiceComponentNotFound { .. }
                | StateError::ServiceComponentHostNotFound { .. }
                | StateError::ClusterVersionNotFound { .. }
                | StateError::ConfigGroupNotFound { .. }
        )
    }

    /// 是否属于重名冲突。
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StateError::DuplicateCluster { .. }
                | StateError::DuplicateHost { .. }
                | StateError::DuplicateService { .. }
                | StateError::DuplicateServiceComponent { .. }
                | StateError::DuplicateServiceComponentHost { .. }
                | StateError::DuplicateClusterVersion { .. }
                | StateError::DuplicateConfigGroup { .. }
                | StateError::DuplicateHostMapping { .. }
                | StateError::HostInUse { .. }
        )
    }

    pub(crate) fn detached(entity: &'static str, name: &str) -> Self {
        StateError::Detached {
            entity,
            name: name.to_owned(),
        }
    }
}
