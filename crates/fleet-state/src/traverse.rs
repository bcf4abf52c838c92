//! # 快照后递归
//!
//! 父节点在读锁内只拷贝子节点的 `Arc` 列表，释放锁之后才调用本模块逐个收集子响应。
//! 快照与递归之间被移除的子节点（已标记 detached）会被跳过并记录 `debug` 事件：
//! 这是约定的宽松一致性，而不是错误。

use std::sync::Arc;

/// 可参与快照遍历的实体。
pub(crate) trait TreeNode {
    type Response;

    /// 在父节点映射中的键。
    fn node_name(&self) -> &str;

    /// 是否已从父节点移除。
    fn is_detached(&self) -> bool;

    fn convert_to_response(&self) -> Self::Response;
}

/// 在不持有 `parent` 锁的前提下收集子响应。
pub(crate) fn collect_child_responses<C: TreeNode>(
    parent: &str,
    snapshot: Vec<Arc<C>>,
) -> Vec<C::Response> {
    let mut responses = Vec::with_capacity(snapshot.len());
    for child in snapshot {
        if child.is_detached() {
            tracing::debug!(
                parent,
                child = child.node_name(),
                "skipping child removed after snapshot"
            );
            continue;
        }
        responses.push(child.convert_to_response());
    }
    responses
}
