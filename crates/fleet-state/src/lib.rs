//! # fleet-state
//!
//! ## 定位与职责（Why）
//! - 受管集群的内存权威状态树：`Cluster → Service → ServiceComponent → ServiceComponentHost`；
//! - 心跳、编排、API 序列化等线程同时读写这棵树，本 crate 的核心是让它们在真并行下
//!   既不死锁、也不读到撕裂的单实体字段。
//!
//! ## 加锁协议（How）
//! 1. 每个实体一把读写锁，只保护自身标量字段与自身子节点映射；
//! 2. 遍历：持读锁拷贝标量与子节点 `Arc` 快照，**释放锁**后再递归；
//! 3. 写入只锁本层，不在同一临界区内触碰祖先或后代的锁；
//! 4. “查找或创建”子节点在父节点的一次写锁内完成；
//! 5. 同一线程任意时刻至多持有一把实体锁；注册表的分片锁从不与实体锁嵌套。
//!
//! 第 5 条由 [`sync`] 中的实体锁在调试构建下逐次校验。
//!
//! ## 模块地图（Where）
//! - [`registry`]：进程级 [`Clusters`] 注册表，含主机目录与主机 → 集群映射；
//! - [`topology`]：各层实体；
//! - [`response`]：`convert_to_response()` 产出的纯数据快照；
//! - [`persistence`]：持久化协作方接缝；
//! - [`config`] / [`observability`]：配置加载与日志安装；
//! - [`error`] / [`state`]：错误域与状态枚举。

pub mod config;
pub mod error;
pub mod observability;
pub mod persistence;
pub mod registry;
pub mod response;
pub mod state;
pub mod sync;
pub mod topology;

mod traverse;

pub use config::{ConfigError, StateSettings};
pub use error::StateError;
pub use observability::{ObservabilityError, init_tracing};
pub use persistence::{EntityRecord, NoopPersistence, Persistence, RecordingPersistence};
pub use registry::Clusters;
pub use response::{
    ClusterResponse, ClusterVersion, ConfigGroup, ServiceComponentHostResponse,
    ServiceComponentResponse, ServiceResponse,
};
pub use state::{MaintenanceState, RepositoryVersionState, StackId, State};
pub use sync::held_entity_locks;
pub use topology::{Cluster, Host, Service, ServiceComponent, ServiceComponentHost};
