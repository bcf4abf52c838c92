//! # Clusters：进程级集群注册表
//!
//! ## 核心意图（Why）
//! - 以 `DashMap` 提供按名称、按 ID 的集群查找，以及主机目录与“主机 → 集群”映射；
//! - 注册表自身的分片锁只覆盖插入与查找：任何需要进入集群锁的操作，都先把 `Arc` 克隆出来、
//!   释放分片守卫，再调用集群方法。注册表锁与实体锁因此永远不会嵌套。
//!
//! ## 行为契约（What）
//! - `add_cluster`/`add_host`：基于 `entry` API 原子地“查重 + 插入”，重名返回冲突错误；
//! - 主机与集群的关联只记录在集群自身的主机集合里，`map_host_to_cluster` 在集群写锁内
//!   原子地“查重 + 插入”，`clusters_for_host` 逐个询问集群，不另设一份映射；
//! - `unmap_host_from_cluster`：先摘除关联，再检查主机上是否还有组件实例，有则恢复关联并
//!   返回 [`StateError::HostInUse`]；
//! - `add_cluster` 持久化失败时撤回新集群，名称可以再次使用；
//! - `install_global`：进程内只能成功一次，之后 [`Clusters::global`] 返回同一实例。
//!
//! ## 风险提示（Trade-offs）
//! - 集群一经创建便常驻进程，注册表不提供删除集群的入口；
//! - 按 ID 索引在名称索引之后写入，极短窗口内可能按名称可见而按 ID 暂不可见。

use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicI64, Ordering},
    },
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    config::StateSettings,
    error::StateError,
    persistence::{NoopPersistence, Persistence, StateContext},
    topology::{Cluster, Host},
};

static GLOBAL: OnceLock<Clusters> = OnceLock::new();

/// 集群与主机的并发注册表。
#[derive(Debug)]
pub struct Clusters {
    clusters: DashMap<Arc<str>, Arc<Cluster>>,
    clusters_by_id: DashMap<i64, Arc<Cluster>>,
    hosts: DashMap<Arc<str>, Arc<Host>>,
    next_cluster_id: AtomicI64,
    context: StateContext,
}

impl Default for Clusters {
    fn default() -> Self {
        Self::with_settings(StateSettings::default(), Arc::new(NoopPersistence))
    }
}

impl Clusters {
    /// 默认配置、无持久化的注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用给定配置与持久化协作方构造注册表。
    pub fn with_settings(settings: StateSettings, persistence: Arc<dyn Persistence>) -> Self {
        let first_cluster_id = settings.registry.first_cluster_id;
        Self {
            clusters: DashMap::new(),
            clusters_by_id: DashMap::new(),
            hosts: DashMap::new(),
            next_cluster_id: AtomicI64::new(first_cluster_id),
            context: StateContext::new(Arc::new(settings), persistence),
        }
    }

    pub fn settings(&self) -> &StateSettings {
        self.context.settings()
    }

    /// 把注册表安装为进程级单例。
    ///
    /// # 教案式说明
    /// - **契约 (What)**：首次调用返回 `'static` 引用；之后的调用返回
    ///   [`StateError::RegistryAlreadyInstalled`]，传入的注册表被丢弃，已安装实例保持不变；
    /// - **并发 (How)**：`OnceLock` 保证并发安装时只有一个调用者胜出。
    pub fn install_global(registry: Clusters) -> Result<&'static Clusters, StateError> {
        let mut installed = false;
        let global = GLOBAL.get_or_init(|| {
            installed = true;
            registry
        });
        if installed {
            tracing::debug!("global cluster registry installed");
            Ok(global)
        } else {
            Err(StateError::RegistryAlreadyInstalled)
        }
    }

    /// 已安装的进程级注册表。
    pub fn global() -> Option<&'static Clusters> {
        GLOBAL.get()
    }

    // ---- 集群 ----

    /// 创建并登记集群，ID 由单调计数器分配。
    pub fn add_cluster(&self, cluster_name: &str) -> Result<Arc<Cluster>, StateError> {
        let cluster = match self.clusters.entry(Arc::from(cluster_name)) {
            Entry::Occupied(_) => {
                return Err(StateError::DuplicateCluster {
                    cluster: cluster_name.to_owned(),
                });
            }
            Entry::Vacant(vacant) => {
                let cluster_id = self.next_cluster_id.fetch_add(1, Ordering::Relaxed);
                let cluster = Cluster::new(cluster_id, cluster_name, self.context.clone());
                vacant.insert(Arc::clone(&cluster));
                cluster
            }
        };
        self.clusters_by_id
            .insert(cluster.cluster_id(), Arc::clone(&cluster));

        tracing::debug!(
            cluster = cluster_name,
            cluster_id = cluster.cluster_id(),
            "cluster created"
        );
        if let Err(err) = cluster.persist() {
            self.clusters_by_id
                .remove_if(&cluster.cluster_id(), |_, current| Arc::ptr_eq(current, &cluster));
            self.clusters
                .remove_if(cluster_name, |_, current| Arc::ptr_eq(current, &cluster));
            tracing::debug!(cluster = cluster_name, "cluster withdrawn after persistence failure");
            return Err(err);
        }
        Ok(cluster)
    }

    pub fn get_cluster(&self, cluster_name: &str) -> Result<Arc<Cluster>, StateError> {
        self.clusters
            .get(cluster_name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StateError::ClusterNotFound {
                cluster: cluster_name.to_owned(),
            })
    }

    pub fn get_cluster_by_id(&self, cluster_id: i64) -> Result<Arc<Cluster>, StateError> {
        self.clusters_by_id
            .get(&cluster_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StateError::ClusterIdNotFound { cluster_id })
    }

    /// 全部集群，按名称排序。
    pub fn clusters(&self) -> Vec<Arc<Cluster>> {
        let mut clusters = self
            .clusters
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect::<Vec<_>>();
        clusters.sort_by(|left, right| left.name().cmp(right.name()));
        clusters
    }

    // ---- 主机 ----

    pub fn add_host(&self, host_name: &str) -> Result<Arc<Host>, StateError> {
        match self.hosts.entry(Arc::from(host_name)) {
            Entry::Occupied(_) => Err(StateError::DuplicateHost {
                host: host_name.to_owned(),
            }),
            Entry::Vacant(vacant) => {
                let host = Host::new(host_name, self.context.clone());
                vacant.insert(Arc::clone(&host));
                tracing::debug!(host = host_name, "host registered");
                Ok(host)
            }
        }
    }

    pub fn get_host(&self, host_name: &str) -> Result<Arc<Host>, StateError> {
        self.hosts
            .get(host_name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StateError::HostNotFound {
                host: host_name.to_owned(),
            })
    }

    /// 全部主机，按主机名排序。
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        let mut hosts = self
            .hosts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect::<Vec<_>>();
        hosts.sort_by(|left, right| left.host_name().cmp(right.host_name()));
        hosts
    }

    /// 把主机关联到集群。
    ///
    /// 注册表分片守卫在进入集群写锁之前已经释放。
    pub fn map_host_to_cluster(&self, host_name: &str, cluster_name: &str) -> Result<(), StateError> {
        let host = self.get_host(host_name)?;
        let cluster = self.get_cluster(cluster_name)?;

        if !cluster.add_host_association(host.host_name()) {
            return Err(StateError::DuplicateHostMapping {
                cluster: cluster_name.to_owned(),
                host: host_name.to_owned(),
            });
        }
        tracing::debug!(host = host_name, cluster = cluster_name, "host mapped to cluster");
        Ok(())
    }

    /// 解除主机与集群的关联。
    ///
    /// # 教案式说明
    /// - **契约 (What)**：主机上仍有该集群的组件实例时返回 [`StateError::HostInUse`]，关联保持不变；
    /// - **并发 (How)**：先摘除关联，使新的实例挂入在复核时失败；再逐层检查已有实例，
    ///   发现实例则恢复关联。期间恰好并发的挂入会自行撤回，两侧都不会留下悬空实例。
    pub fn unmap_host_from_cluster(
        &self,
        host_name: &str,
        cluster_name: &str,
    ) -> Result<(), StateError> {
        let host = self.get_host(host_name)?;
        let cluster = self.get_cluster(cluster_name)?;

        if !cluster.remove_host_association(host.host_name()) {
            return Err(StateError::HostNotInCluster {
                cluster: cluster_name.to_owned(),
                host: host_name.to_owned(),
            });
        }

        let remaining = cluster.service_component_hosts(host_name).len();
        if remaining > 0 {
            cluster.add_host_association(host.host_name());
            tracing::debug!(
                host = host_name,
                cluster = cluster_name,
                components = remaining,
                "host still carries components; unmap refused"
            );
            return Err(StateError::HostInUse {
                cluster: cluster_name.to_owned(),
                host: host_name.to_owned(),
                components: remaining,
            });
        }

        tracing::debug!(
            host = host_name,
            cluster = cluster_name,
            "host unmapped from cluster"
        );
        Ok(())
    }

    /// 主机所关联的全部集群，按名称排序。
    pub fn clusters_for_host(&self, host_name: &str) -> Result<Vec<Arc<Cluster>>, StateError> {
        self.get_host(host_name)?;
        Ok(self
            .clusters()
            .into_iter()
            .filter(|cluster| cluster.has_host(host_name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::{
        persistence::{RecordingPersistence, testing::FlakyPersistence},
        sync::held_entity_locks,
    };

    fn registry_with_hosts(hosts: &[&str]) -> (Clusters, Arc<Cluster>) {
        let registry = Clusters::new();
        let cluster = registry.add_cluster("c1").expect("集群创建成功");
        for host in hosts {
            registry.add_host(host).expect("主机登记成功");
            registry.map_host_to_cluster(host, "c1").expect("主机关联成功");
        }
        (registry, cluster)
    }

    #[test]
    fn cluster_ids_are_sequential_from_configured_start() {
        let mut settings = StateSettings::default();
        settings.registry.first_cluster_id = 7;
        let registry = Clusters::with_settings(settings, Arc::new(NoopPersistence));

        let first = registry.add_cluster("c1").expect("c1");
        let second = registry.add_cluster("c2").expect("c2");
        assert_eq!(first.cluster_id(), 7);
        assert_eq!(second.cluster_id(), 8);

        let by_id = registry.get_cluster_by_id(8).expect("按 ID 查找");
        assert!(Arc::ptr_eq(&by_id, &second));
        assert_eq!(
            registry.get_cluster_by_id(9).expect_err("未登记"),
            StateError::ClusterIdNotFound { cluster_id: 9 }
        );
    }

    #[test]
    fn duplicate_cluster_is_a_conflict_and_keeps_the_original() {
        let registry = Clusters::new();
        let original = registry.add_cluster("c1").expect("首次创建");
        let err = registry.add_cluster("c1").expect_err("重名");
        assert!(err.is_conflict());
        assert!(Arc::ptr_eq(&registry.get_cluster("c1").expect("c1"), &original));
        assert_eq!(registry.clusters().len(), 1);
    }

    #[test]
    fn unknown_cluster_is_not_found() {
        let registry = Clusters::new();
        let err = registry.get_cluster("missing").expect_err("未登记");
        assert_eq!(
            err,
            StateError::ClusterNotFound {
                cluster: "missing".into()
            }
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn new_clusters_take_configured_defaults() {
        let settings = StateSettings::from_toml_str(
            "[cluster]\ndefault_provisioning_state = \"INSTALLED\"\ndefault_stack = \"HDP-2.2\"\n",
        )
        .expect("合法配置");
        let registry = Clusters::with_settings(settings, Arc::new(NoopPersistence));
        let cluster = registry.add_cluster("c1").expect("c1");
        assert_eq!(cluster.provisioning_state(), crate::state::State::Installed);
        assert_eq!(
            cluster.desired_stack_version().map(|stack| stack.to_string()),
            Some("HDP-2.2".to_owned())
        );
    }

    #[test]
    fn host_mapping_round_trips_through_cluster_associations() {
        let (registry, cluster) = registry_with_hosts(&["h2", "h1"]);
        assert_eq!(cluster.host_names(), vec!["h1".to_owned(), "h2".to_owned()]);
        assert!(cluster.has_host("h1"));

        let err = registry.map_host_to_cluster("h1", "c1").expect_err("重复关联");
        assert!(err.is_conflict());

        let other = registry.add_cluster("c2").expect("c2");
        registry.map_host_to_cluster("h1", "c2").expect("一台主机可属于多个集群");
        let names = registry
            .clusters_for_host("h1")
            .expect("h1")
            .iter()
            .map(|cluster| cluster.name().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["c1".to_owned(), "c2".to_owned()]);

        registry.unmap_host_from_cluster("h1", "c2").expect("解除关联");
        assert!(!other.has_host("h1"));
        assert_eq!(
            registry.unmap_host_from_cluster("h1", "c2").expect_err("已解除"),
            StateError::HostNotInCluster {
                cluster: "c2".into(),
                host: "h1".into()
            }
        );
        assert_eq!(held_entity_locks(), 0);
    }

    #[test]
    fn unmapping_unregistered_host_is_not_found() {
        let (registry, _) = registry_with_hosts(&["h1"]);
        assert_eq!(
            registry.unmap_host_from_cluster("ghost", "c1").expect_err("未登记主机"),
            StateError::HostNotFound {
                host: "ghost".into()
            }
        );
        registry.add_host("h2").expect("h2");
        assert!(matches!(
            registry.unmap_host_from_cluster("h2", "c1"),
            Err(StateError::HostNotInCluster { .. })
        ));
        assert!(registry.clusters_for_host("h2").expect("h2").is_empty());
    }

    #[test]
    fn unmapping_host_with_components_is_refused() {
        let (registry, cluster) = registry_with_hosts(&["h1", "h2"]);
        cluster
            .get_or_add_service("HDFS")
            .and_then(|service| service.get_or_add_service_component("DATANODE"))
            .and_then(|component| component.get_or_add_service_component_host("h1"))
            .expect("h1 上的 DATANODE");

        let err = registry
            .unmap_host_from_cluster("h1", "c1")
            .expect_err("主机上仍有组件");
        assert_eq!(
            err,
            StateError::HostInUse {
                cluster: "c1".into(),
                host: "h1".into(),
                components: 1
            }
        );
        assert!(err.is_conflict());
        assert!(cluster.has_host("h1"));
        assert_eq!(cluster.service_component_hosts("h1").len(), 1);

        registry.unmap_host_from_cluster("h2", "c1").expect("h2 上没有组件");
        assert!(!cluster.has_host("h2"));
        assert_eq!(held_entity_locks(), 0);
    }

    #[test]
    fn racing_map_and_unmap_leave_one_answer() {
        let (registry, cluster) = registry_with_hosts(&["h"]);
        let registry = Arc::new(registry);

        for _ in 0..500 {
            let first = {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let _ = registry.unmap_host_from_cluster("h", "c1");
                })
            };
            let second = {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let _ = registry.unmap_host_from_cluster("h", "c1");
                    let _ = registry.map_host_to_cluster("h", "c1");
                })
            };
            first.join().expect("unmap 线程");
            second.join().expect("unmap/map 线程");

            let mapped = !registry.clusters_for_host("h").expect("h").is_empty();
            assert_eq!(mapped, cluster.has_host("h"));
            if !mapped {
                registry.map_host_to_cluster("h", "c1").expect("重新关联");
            }
        }
    }

    #[test]
    fn mapping_unknown_host_or_cluster_fails() {
        let (registry, _) = registry_with_hosts(&["h1"]);
        assert!(matches!(
            registry.map_host_to_cluster("ghost", "c1"),
            Err(StateError::HostNotFound { .. })
        ));
        assert!(matches!(
            registry.map_host_to_cluster("h1", "ghost"),
            Err(StateError::ClusterNotFound { .. })
        ));
        assert!(matches!(
            registry.clusters_for_host("ghost"),
            Err(StateError::HostNotFound { .. })
        ));
    }

    #[test]
    fn host_attributes_merge_and_persist() {
        let recorder = Arc::new(RecordingPersistence::new());
        let registry = Clusters::with_settings(StateSettings::default(), recorder.clone());
        let host = registry.add_host("c64-0").expect("登记主机");
        host.set_host_attributes([("os_family", "redhat"), ("os_release_version", "6.4")]);
        host.set_host_attributes([("os_release_version", "6.5")]);

        assert_eq!(host.os_family().as_deref(), Some("redhat"));
        assert_eq!(host.os_release_version().as_deref(), Some("6.5"));

        host.persist().expect("持久化");
        let records = recorder.records();
        let last = records.last().expect("至少一条记录");
        assert_eq!(last.kind(), "host");
        assert!(matches!(
            registry.add_host("c64-0"),
            Err(StateError::DuplicateHost { .. })
        ));
    }

    #[test]
    fn rejected_cluster_is_withdrawn_and_can_be_retried() {
        let persistence = Arc::new(FlakyPersistence::rejecting());
        let registry = Clusters::with_settings(StateSettings::default(), persistence.clone());

        let err = registry.add_cluster("c1").expect_err("协作方拒绝");
        assert!(matches!(err, StateError::Persistence { .. }));
        assert!(registry.get_cluster("c1").expect_err("已撤回").is_not_found());
        assert!(registry.clusters().is_empty());

        persistence.set_reject(false);
        let cluster = registry.add_cluster("c1").expect("重试成功");
        assert!(Arc::ptr_eq(
            &registry.get_cluster_by_id(cluster.cluster_id()).expect("按 ID"),
            &cluster
        ));
        assert_eq!(persistence.accepted(), vec!["cluster"]);
    }

    #[test]
    fn add_cluster_persists_the_new_cluster() {
        let recorder = Arc::new(RecordingPersistence::new());
        let registry = Clusters::with_settings(StateSettings::default(), recorder.clone());
        registry.add_cluster("c1").expect("c1");
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.records()[0].kind(), "cluster");
    }
}
