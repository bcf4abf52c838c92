//! 快照后递归协议的 Loom 影子模型
//!
//! # 教案级说明
//! - **意图 (Why)**：墙钟测试只能覆盖实际发生的调度；Loom 穷举两层实体之间的全部交错，
//!   证明“父读锁内拷贝快照、释放后再锁子节点”与“父写锁内查找或创建”组合后不存在等待环；
//! - **模型 (How)**：父节点 = `RwLock<Vec<Arc<Child>>>`，子节点 = `RwLock<u32>`；
//!   读线程按协议遍历，写线程分别向父节点追加子节点、改写已有子节点字段；
//! - **范围**：这是独立的影子模型，不驱动 `EntityLock` 与 `topology` 中的真实类型；
//!   真实类型的加锁形状由 `tests/deadlock.rs` 的墙钟看门狗与死锁检测器覆盖，
//!   模型与实现之间的对应关系需要在修改加锁顺序时人工复核；
//! - **契约 (What)**：每个交错都能结束，且读者看到的子节点字段只可能是初值或写入值；
//! - **运行方式**：`RUSTFLAGS="--cfg loom" cargo test -p fleet-state --features loom-model --test loom_protocol`。

#![cfg(all(feature = "loom-model", any(loom, fleet_loom)))]

use loom::{
    model,
    sync::{Arc, RwLock},
    thread,
};

struct Child {
    value: RwLock<u32>,
}

struct Parent {
    children: RwLock<Vec<Arc<Child>>>,
}

impl Parent {
    fn with_one_child() -> Self {
        Self {
            children: RwLock::new(vec![Arc::new(Child {
                value: RwLock::new(0),
            })]),
        }
    }

    /// 遍历：读锁内只克隆 `Arc`，子节点在父锁释放后逐个读取。
    fn snapshot_then_recurse(&self) -> Vec<u32> {
        let snapshot = self
            .children
            .read()
            .expect("父读锁")
            .iter()
            .cloned()
            .collect::<Vec<_>>();
        snapshot
            .iter()
            .map(|child| *child.value.read().expect("子读锁"))
            .collect()
    }

    /// 查找或创建：长度检查与追加处于同一次写锁内。
    fn get_or_add(&self, wanted: usize) -> Arc<Child> {
        let mut children = self.children.write().expect("父写锁");
        while children.len() < wanted {
            children.push(Arc::new(Child {
                value: RwLock::new(0),
            }));
        }
        Arc::clone(&children[wanted - 1])
    }

    fn first_child(&self) -> Arc<Child> {
        Arc::clone(&self.children.read().expect("父读锁")[0])
    }
}

#[test]
fn traversal_and_writes_never_form_a_wait_cycle() {
    model(|| {
        let parent = Arc::new(Parent::with_one_child());

        let reader = {
            let parent = Arc::clone(&parent);
            thread::spawn(move || parent.snapshot_then_recurse())
        };

        let creator = {
            let parent = Arc::clone(&parent);
            thread::spawn(move || {
                let created = parent.get_or_add(2);
                *created.value.write().expect("子写锁") = 9;
            })
        };

        let first = parent.first_child();
        *first.value.write().expect("子写锁") = 7;

        let observed = reader.join().expect("读线程不应 panic");
        creator.join().expect("创建线程不应 panic");

        assert!(matches!(observed.len(), 1 | 2));
        assert!(matches!(observed[0], 0 | 7));
        if let Some(second) = observed.get(1) {
            assert!(matches!(second, 0 | 9));
        }
        assert_eq!(parent.snapshot_then_recurse(), vec![7, 9]);
    });
}

#[test]
fn concurrent_get_or_add_creates_each_child_once() {
    model(|| {
        let parent = Arc::new(Parent::with_one_child());

        let handles = (0..2)
            .map(|_| {
                let parent = Arc::clone(&parent);
                thread::spawn(move || parent.get_or_add(2))
            })
            .collect::<Vec<_>>();

        let created = handles
            .into_iter()
            .map(|handle| handle.join().expect("创建线程不应 panic"))
            .collect::<Vec<_>>();

        assert!(Arc::ptr_eq(&created[0], &created[1]));
        assert_eq!(parent.children.read().expect("父读锁").len(), 2);
    });
}
