//! # 实体锁：单层持锁纪律的落点
//!
//! ## 核心意图（Why）
//! - 实体树每个节点各持一把读写锁，锁只保护该节点自身的标量字段与子节点映射；
//! - 任何线程在任意时刻至多持有一把实体锁：遍历先拷贝快照再释放锁，写入只触碰本层。
//!   这样不同层级的读写者之间不可能形成等待环；
//! - [`EntityLock`] 把这条纪律变成可检查的事实：守卫维护线程局部的持锁计数，
//!   调试构建下嵌套加锁会立即触发断言，而不是在生产中偶发死锁。
//!
//! ## 契约（What）
//! - `read`/`write` 返回的守卫绝不离开实体方法体，所有对外返回值都是拷贝；
//! - 守卫释放顺序：先释放底层锁，再归还计数并（写守卫）上报持锁时长；
//! - 写锁持有超过阈值时输出 `warn` 事件，阈值来自 [`crate::config::LockSettings`]。

use core::{
    cell::Cell,
    fmt,
    ops::{Deref, DerefMut},
    time::Duration,
};
use std::time::Instant;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 实体锁所属的实体类别，用于断言信息与慢持锁告警。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LockKind {
    Cluster,
    Host,
    Service,
    ServiceComponent,
    ServiceComponentHost,
}

impl LockKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            LockKind::Cluster => "cluster",
            LockKind::Host => "host",
            LockKind::Service => "service",
            LockKind::ServiceComponent => "service_component",
            LockKind::ServiceComponentHost => "service_component_host",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

thread_local! {
    static HELD: Cell<usize> = const { Cell::new(0) };
}

/// 当前线程持有的实体锁数量。
///
/// 任何公开操作返回后该值都应为 0；测试借此验证没有守卫泄漏到调用方。
pub fn held_entity_locks() -> usize {
    HELD.with(Cell::get)
}

/// 带持锁审计的读写锁。
pub(crate) struct EntityLock<T> {
    inner: RwLock<T>,
    kind: LockKind,
    slow_hold: Option<Duration>,
}

impl<T> EntityLock<T> {
    /// `slow_hold` 为 `None` 时不做写锁时长统计。
    pub(crate) fn new(kind: LockKind, value: T, slow_hold: Option<Duration>) -> Self {
        Self {
            inner: RwLock::new(value),
            kind,
            slow_hold,
        }
    }

    /// 进入读侧临界区。
    pub(crate) fn read(&self) -> EntityReadGuard<'_, T> {
        let token = HeldToken::enter(self.kind, None);
        EntityReadGuard {
            guard: self.inner.read(),
            _token: token,
        }
    }

    /// 进入写侧临界区。
    pub(crate) fn write(&self) -> EntityWriteGuard<'_, T> {
        let token = HeldToken::enter(self.kind, self.slow_hold);
        let guard = self.inner.write();
        EntityWriteGuard {
            guard,
            _token: token.started(),
        }
    }
}

impl<T> fmt::Debug for EntityLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityLock")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// 持锁计数的归还凭证。
///
/// 作为守卫的最后一个字段声明，保证在底层锁释放之后才执行 `Drop`。
struct HeldToken {
    kind: LockKind,
    slow_hold: Option<Duration>,
    acquired: Option<Instant>,
}

impl HeldToken {
    fn enter(kind: LockKind, slow_hold: Option<Duration>) -> Self {
        let held = HELD.with(Cell::get);
        debug_assert_eq!(
            held, 0,
            "{kind} lock requested while this thread already holds {held} entity lock(s)"
        );
        HELD.with(|cell| cell.set(held + 1));
        Self {
            kind,
            slow_hold,
            acquired: None,
        }
    }

    /// 锁已到手，开始计时。
    fn started(mut self) -> Self {
        if self.slow_hold.is_some() {
            self.acquired = Some(Instant::now());
        }
        self
    }
}

impl Drop for HeldToken {
    fn drop(&mut self) {
        HELD.with(|cell| cell.set(cell.get().saturating_sub(1)));

        if let (Some(threshold), Some(acquired)) = (self.slow_hold, self.acquired) {
            let held_for = acquired.elapsed();
            if held_for > threshold {
                tracing::warn!(
                    lock = self.kind.as_str(),
                    held_ms = held_for.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "entity write lock held longer than threshold"
                );
            }
        }
    }
}

pub(crate) struct EntityReadGuard<'a, T> {
    guard: RwLockReadGuard<'a, T>,
    _token: HeldToken,
}

impl<T> Deref for EntityReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

pub(crate) struct EntityWriteGuard<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
    _token: HeldToken,
}

impl<T> Deref for EntityWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for EntityWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
