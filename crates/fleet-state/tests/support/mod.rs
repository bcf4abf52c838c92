//! 集成测试共用的夹具与看门狗。
//!
//! - `HdfsFixture`：100 台主机、HDFS 服务与 NAMENODE/DATANODE 两个组件，期望栈版本 `HDP-0.1`；
//! - `join_within`：在墙钟上限内等待全部工作线程，期间周期性调用 `parking_lot` 的死锁检测器。

#![allow(dead_code)]

use std::{
    sync::{Arc, mpsc},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use fleet_state::{
    Cluster, Clusters, RepositoryVersionState, Service, ServiceComponentHost, StackId, State,
};

pub const NUMBER_OF_HOSTS: usize = 100;

pub fn stack() -> StackId {
    StackId::new("HDP", "0.1").expect("合法栈标识")
}

pub fn host_name(index: usize) -> String {
    format!("c64-{index}")
}

pub struct HdfsFixture {
    pub registry: Clusters,
    pub cluster: Arc<Cluster>,
    pub service: Arc<Service>,
}

impl HdfsFixture {
    pub fn new() -> Self {
        let registry = Clusters::new();
        let cluster = registry.add_cluster("c1").expect("创建集群");
        cluster.set_desired_stack_version(stack());
        cluster
            .create_cluster_version(stack(), "0.1", "admin", RepositoryVersionState::Upgrading)
            .expect("登记集群版本");

        for index in 0..NUMBER_OF_HOSTS {
            let name = host_name(index);
            let host = registry.add_host(&name).expect("登记主机");
            host.set_host_attributes([("os_family", "redhat"), ("os_release_version", "6.4")]);
            host.persist().expect("持久化主机");
            registry.map_host_to_cluster(&name, "c1").expect("关联主机");
        }

        let service = cluster.get_or_add_service("HDFS").expect("安装 HDFS");
        for component in ["NAMENODE", "DATANODE"] {
            let component = service
                .get_or_add_service_component(component)
                .expect("添加组件");
            component.set_desired_state(State::Installed);
            component.persist().expect("持久化组件");
        }

        Self {
            registry,
            cluster,
            service,
        }
    }

    /// 在指定主机上安装组件实例，并写入已安装状态。
    pub fn install(&self, component: &str, host: &str) -> Arc<ServiceComponentHost> {
        let service = self.cluster.get_or_add_service("HDFS").expect("HDFS");
        let component = service
            .get_or_add_service_component(component)
            .expect("组件");
        let sch = component
            .get_or_add_service_component_host(host)
            .expect("主机组件");
        sch.set_desired_state(State::Installed);
        sch.set_state(State::Installed);
        sch.set_desired_stack_version(stack());
        sch.set_stack_version(stack());
        sch.persist().expect("持久化主机组件");
        sch
    }
}

/// 在 `bound` 内等待全部线程结束。
///
/// 超时或检测到死锁环时直接 panic；任一工作线程 panic 时重新抛出。
pub fn join_within(label: &str, bound: Duration, workers: Vec<JoinHandle<()>>) {
    let (done_tx, done_rx) = mpsc::channel();
    let joiner = thread::spawn(move || {
        let outcome = workers
            .into_iter()
            .map(JoinHandle::join)
            .find(Result::is_err)
            .unwrap_or(Ok(()));
        let _ = done_tx.send(outcome.is_ok());
    });

    let deadline = Instant::now() + bound;
    loop {
        match done_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(all_ok) => {
                joiner.join().expect("汇合线程不应 panic");
                assert!(all_ok, "{label}: 至少一个工作线程 panic");
                return;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let cycles = parking_lot::deadlock::check_deadlock();
                assert!(cycles.is_empty(), "{label}: 检测到 {} 个死锁环", cycles.len());
                assert!(
                    Instant::now() < deadline,
                    "{label}: 工作线程未能在 {bound:?} 内结束"
                );
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                panic!("{label}: 汇合线程意外退出");
            }
        }
    }
}
