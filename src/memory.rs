use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::config::{DependentBehavior, HierarchyConfig};
use crate::error::HierarchyError;
use crate::node::Node;
use crate::store::{NodeStore, RecursiveNodeStore};

/// In-process node store backed by an id-ordered map.
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    config: HierarchyConfig,
    nodes: RwLock<BTreeMap<Uuid, Node>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HierarchyConfig) -> Self {
        Self {
            config,
            nodes: RwLock::default(),
        }
    }

    /// Load nodes as-is. Parent references are not checked, so a corrupted
    /// (dangling or cyclic) graph can be represented.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let map = nodes
            .into_iter()
            .map(|node| (node.id, node.detached()))
            .collect();
        Self {
            config: HierarchyConfig::default(),
            nodes: RwLock::new(map),
        }
    }

    pub fn len(&self) -> Result<usize, HierarchyError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, HierarchyError> {
        Ok(self.read()?.is_empty())
    }

    pub fn contains(&self, id: Uuid) -> Result<bool, HierarchyError> {
        Ok(self.read()?.contains_key(&id))
    }

    /// Insert a node whose parent, if any, already exists.
    pub fn insert(&self, node: Node) -> Result<Node, HierarchyError> {
        let mut nodes = self.write()?;
        if nodes.contains_key(&node.id) {
            return Err(HierarchyError::DuplicateNode(node.id));
        }
        if let Some(parent_id) = node.parent_id {
            if !nodes.contains_key(&parent_id) {
                return Err(HierarchyError::UnknownParent(parent_id));
            }
        }

        let stored = node.detached();
        debug!(id = %stored.id, parent = ?stored.parent_id, "inserting node");
        nodes.insert(stored.id, stored.clone());
        Ok(stored)
    }

    /// Delete a node, applying the configured [`DependentBehavior`] to its
    /// descendants. Returns the number of removed nodes.
    pub fn delete(&self, id: Uuid) -> Result<u64, HierarchyError> {
        let mut nodes = self.write()?;
        if !nodes.contains_key(&id) {
            return Err(HierarchyError::NodeNotFound(id));
        }

        let removed = match self.config.dependent_behavior() {
            DependentBehavior::Destroy => {
                let mut removed = 0;
                for level in subtree_levels(&nodes, id).iter().rev() {
                    for node_id in level {
                        if nodes.remove(node_id).is_some() {
                            removed += 1;
                        }
                    }
                }
                removed
            }
            DependentBehavior::Restrict => {
                if nodes.values().any(|node| node.parent_id == Some(id)) {
                    return Err(HierarchyError::HasChildren(id));
                }
                nodes.remove(&id);
                1
            }
            DependentBehavior::Nullify => {
                for node in nodes.values_mut().filter(|node| node.parent_id == Some(id)) {
                    node.parent_id = None;
                }
                nodes.remove(&id);
                1
            }
        };

        debug!(%id, removed, "deleted node");
        Ok(removed)
    }

    /// Reparent `id` under `new_parent` (or make it a root).
    pub fn move_node(&self, id: Uuid, new_parent: Option<Uuid>) -> Result<Node, HierarchyError> {
        let mut nodes = self.write()?;
        if !nodes.contains_key(&id) {
            return Err(HierarchyError::NodeNotFound(id));
        }

        if let Some(parent) = new_parent {
            if !nodes.contains_key(&parent) {
                return Err(HierarchyError::UnknownParent(parent));
            }
            if subtree_levels(&nodes, id).iter().flatten().any(|d| *d == parent) {
                return Err(HierarchyError::WouldCreateCycle { node: id, parent });
            }
        }

        let node = nodes
            .get_mut(&id)
            .ok_or(HierarchyError::NodeNotFound(id))?;
        node.parent_id = new_parent;
        debug!(%id, parent = ?new_parent, "moved node");
        Ok(node.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<Uuid, Node>>, HierarchyError> {
        self.nodes
            .read()
            .map_err(|_| HierarchyError::invariant("node map lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<Uuid, Node>>, HierarchyError> {
        self.nodes
            .write()
            .map_err(|_| HierarchyError::invariant("node map lock poisoned"))
    }

    fn children_of(&self, ids: &[Uuid]) -> Result<Vec<Node>, HierarchyError> {
        let parents: HashSet<Uuid> = ids.iter().copied().collect();
        let nodes = self.read()?;
        Ok(nodes
            .values()
            .filter(|node| node.parent_id.is_some_and(|p| parents.contains(&p)))
            .cloned()
            .collect())
    }

    fn subtree_rows(&self, root_id: Uuid, max_levels: u32) -> Result<Vec<(Node, u32)>, HierarchyError> {
        let nodes = self.read()?;
        let Some(root) = nodes.get(&root_id) else {
            return Ok(Vec::new());
        };

        let mut rows = vec![(root.detached(), 1)];
        let mut frontier: HashSet<Uuid> = HashSet::from([root_id]);
        let mut level = 1;
        while level < max_levels && !frontier.is_empty() {
            level += 1;
            let mut next = HashSet::new();
            for node in nodes
                .values()
                .filter(|node| node.parent_id.is_some_and(|p| frontier.contains(&p)))
            {
                next.insert(node.id);
                rows.push((node.detached(), level));
            }
            frontier = next;
        }
        Ok(rows)
    }
}

/// Ids of `root` and its descendants grouped by generation. Stops at ids
/// already collected, so a corrupted cyclic graph still terminates.
fn subtree_levels(nodes: &BTreeMap<Uuid, Node>, root: Uuid) -> Vec<Vec<Uuid>> {
    let mut visited = HashSet::from([root]);
    let mut levels = vec![vec![root]];

    loop {
        let Some(frontier) = levels.last() else { break };
        let frontier: HashSet<Uuid> = frontier.iter().copied().collect();
        let next: Vec<Uuid> = nodes
            .values()
            .filter(|node| node.parent_id.is_some_and(|p| frontier.contains(&p)))
            .map(|node| node.id)
            .filter(|id| visited.insert(*id))
            .collect();
        if next.is_empty() {
            break;
        }
        levels.push(next);
    }

    levels
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Node>, HierarchyError> {
        Ok(self.read()?.get(&id).map(Node::detached))
    }

    async fn find_by_parent_ids(&self, ids: &[Uuid]) -> Result<Vec<Node>, HierarchyError> {
        self.children_of(ids)
    }

    async fn find_roots(&self) -> Result<Vec<Node>, HierarchyError> {
        Ok(self
            .read()?
            .values()
            .filter(|node| node.is_root())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RecursiveNodeStore for MemoryNodeStore {
    async fn find_subtree(
        &self,
        root_id: Uuid,
        max_levels: u32,
    ) -> Result<Vec<(Node, u32)>, HierarchyError> {
        self.subtree_rows(root_id, max_levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HierarchyOptions;

    fn store_with(behavior: DependentBehavior) -> MemoryNodeStore {
        let config = HierarchyOptions::default()
            .dependent_behavior(behavior)
            .apply(HierarchyConfig::default());
        MemoryNodeStore::with_config(config)
    }

    /// root -> (a -> a1, b)
    fn seed(store: &MemoryNodeStore) -> (Node, Node, Node, Node) {
        let root = store.insert(Node::new("root")).unwrap();
        let a = store.insert(Node::child_of(root.id, "a")).unwrap();
        let a1 = store.insert(Node::child_of(a.id, "a1")).unwrap();
        let b = store.insert(Node::child_of(root.id, "b")).unwrap();
        (root, a, a1, b)
    }

    #[test]
    fn insert_rejects_duplicates_and_dangling_parents() {
        let store = MemoryNodeStore::new();
        let root = store.insert(Node::new("root")).unwrap();

        assert!(matches!(
            store.insert(Node::with_id(root.id, None, "again")),
            Err(HierarchyError::DuplicateNode(id)) if id == root.id
        ));

        let missing = Uuid::new_v4();
        assert!(matches!(
            store.insert(Node::child_of(missing, "orphan")),
            Err(HierarchyError::UnknownParent(id)) if id == missing
        ));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn destroy_removes_whole_subtree() {
        let store = store_with(DependentBehavior::Destroy);
        let (root, a, a1, b) = seed(&store);

        assert_eq!(store.delete(a.id).unwrap(), 2);
        assert!(!store.contains(a1.id).unwrap());
        assert!(store.contains(root.id).unwrap());
        assert!(store.contains(b.id).unwrap());
    }

    #[test]
    fn restrict_refuses_nodes_with_children() {
        let store = store_with(DependentBehavior::Restrict);
        let (_, a, a1, _) = seed(&store);

        assert!(matches!(
            store.delete(a.id),
            Err(HierarchyError::HasChildren(id)) if id == a.id
        ));
        assert_eq!(store.delete(a1.id).unwrap(), 1);
        assert_eq!(store.delete(a.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn nullify_turns_children_into_roots() {
        let store = store_with(DependentBehavior::Nullify);
        let (root, a, _, b) = seed(&store);

        assert_eq!(store.delete(root.id).unwrap(), 1);
        let roots = store.find_roots().await.unwrap();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(roots.iter().map(|n| n.id).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn delete_unknown_node_fails() {
        let store = MemoryNodeStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.delete(id), Err(HierarchyError::NodeNotFound(x)) if x == id));
    }

    #[test]
    fn move_under_descendant_is_rejected() {
        let store = MemoryNodeStore::new();
        let (root, a, a1, b) = seed(&store);

        assert!(matches!(
            store.move_node(a.id, Some(a1.id)),
            Err(HierarchyError::WouldCreateCycle { node, parent }) if node == a.id && parent == a1.id
        ));
        assert!(matches!(
            store.move_node(a.id, Some(a.id)),
            Err(HierarchyError::WouldCreateCycle { .. })
        ));

        let moved = store.move_node(a.id, Some(b.id)).unwrap();
        assert_eq!(moved.parent_id, Some(b.id));

        let detached = store.move_node(b.id, None).unwrap();
        assert!(detached.is_root());
        assert!(store.contains(root.id).unwrap());
    }

    #[tokio::test]
    async fn subtree_rows_are_bounded_on_cycles() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let store = MemoryNodeStore::from_nodes([
            Node::with_id(a, Some(b), "a"),
            Node::with_id(b, Some(a), "b"),
        ]);

        let rows = store.find_subtree(a, 5).await.unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows.last().map(|(_, level)| *level), Some(5));
    }
}
