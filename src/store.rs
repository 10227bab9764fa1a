use async_trait::async_trait;
use uuid::Uuid;

use crate::config::HierarchyConfig;
use crate::error::HierarchyError;
use crate::node::Node;

/// Storage collaborator used by [`crate::HierarchyStore`].
///
/// Returned nodes carry empty `children`; the hierarchy layer attaches them.
#[async_trait]
pub trait NodeStore: Send + Sync {
    fn config(&self) -> &HierarchyConfig;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Node>, HierarchyError>;

    /// Every node whose `parent_id` is one of `ids`.
    async fn find_by_parent_ids(&self, ids: &[Uuid]) -> Result<Vec<Node>, HierarchyError>;

    /// Nodes without a parent, ordered by id.
    async fn find_roots(&self) -> Result<Vec<Node>, HierarchyError>;
}

/// Stores able to expand a whole subtree in one request.
#[async_trait]
pub trait RecursiveNodeStore: NodeStore {
    /// Rows reachable from `root_id` paired with their level, expanding at
    /// most `max_levels` generations. No visited set is kept, so a cyclic
    /// graph yields repeated ids instead of looping forever.
    async fn find_subtree(
        &self,
        root_id: Uuid,
        max_levels: u32,
    ) -> Result<Vec<(Node, u32)>, HierarchyError>;
}
