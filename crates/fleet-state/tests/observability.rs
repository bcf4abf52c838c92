//! 全局 Subscriber 安装语义；独立测试二进制，避免与其他测试争用进程级状态。

use fleet_state::{Clusters, ObservabilityError, StateError, StateSettings, init_tracing};

#[test]
fn global_installs_succeed_only_once() {
    let settings = StateSettings::from_toml_str("[observability]\nlog_filter = \"fleet_state=debug\"\n")
        .expect("合法配置");

    init_tracing(&settings).expect("首次安装成功");
    assert!(matches!(
        init_tracing(&settings),
        Err(ObservabilityError::SubscriberAlreadySet)
    ));

    let installed = Clusters::install_global(Clusters::with_settings(
        settings,
        std::sync::Arc::new(fleet_state::NoopPersistence),
    ))
    .expect("首次安装注册表");
    installed.add_cluster("c1").expect("c1");

    assert!(matches!(
        Clusters::install_global(Clusters::new()),
        Err(StateError::RegistryAlreadyInstalled)
    ));
    let global = Clusters::global().expect("已安装");
    assert!(std::ptr::eq(global, installed));
    assert!(global.get_cluster("c1").is_ok());
}
