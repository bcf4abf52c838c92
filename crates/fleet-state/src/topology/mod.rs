//! # 实体树
//!
//! `Cluster → Service → ServiceComponent → ServiceComponentHost` 四层，外加由注册表持有的 [`Host`]。
//! 每个实体各持一把 [`crate::sync`] 实体锁；父实体拥有子实体的 `Arc`，子实体只保留指向父实体的
//! `Weak` 导航引用。

mod cluster;
mod component;
mod host;
mod host_component;
mod service;

pub use cluster::Cluster;
pub use component::ServiceComponent;
pub use host::Host;
pub use host_component::ServiceComponentHost;
pub use service::Service;
