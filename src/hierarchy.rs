//! Subtree reconstruction over any [`NodeStore`].
//!
//! Both traversal strategies feed the same assembly step, which attaches
//! children through an id-indexed map and orders the result by
//! `(level, id)`.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::HierarchyError;
use crate::node::{HierarchyEntry, Node};
use crate::store::{NodeStore, RecursiveNodeStore};

/// Read-side operations on a parent-pointer tree.
#[derive(Debug)]
pub struct HierarchyStore<S> {
    store: S,
}

impl<S> HierarchyStore<S>
where
    S: NodeStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Reconstruct the subtree rooted at `root_id`, expanding one level per
    /// storage round-trip.
    ///
    /// An unknown root yields an empty result.
    ///
    /// Each entry owns a full copy of its subtree in `children`, so assembly
    /// clones every node once per ancestor: the cost grows with the sum of
    /// node depths, roughly `n²/2` for a single chain of `n` nodes.
    pub async fn fetch_hierarchy(&self, root_id: Uuid) -> Result<Vec<HierarchyEntry>, HierarchyError> {
        let max_depth = self.store.config().max_depth();

        let Some(root) = self.store.find_by_id(root_id).await? else {
            debug!(root = %root_id, "hierarchy root not found");
            return Ok(Vec::new());
        };

        let mut visited = HashSet::from([root.id]);
        let mut frontier = vec![root.id];
        let mut rows = vec![(root.detached(), 1)];
        let mut level = 1;

        loop {
            let next = self.store.find_by_parent_ids(&frontier).await?;
            if next.is_empty() {
                break;
            }
            if level >= max_depth {
                warn!(root = %root_id, max_depth, "hierarchy exceeds maximum depth");
                return Err(HierarchyError::DepthLimitExceeded(max_depth));
            }

            level += 1;
            debug!(root = %root_id, level, nodes = next.len(), "expanded hierarchy level");

            frontier = Vec::with_capacity(next.len());
            for node in next {
                if !visited.insert(node.id) {
                    warn!(root = %root_id, node = %node.id, "cycle detected in hierarchy");
                    return Err(HierarchyError::CycleDetected(node.id));
                }
                frontier.push(node.id);
                rows.push((node.detached(), level));
            }
        }

        assemble(rows, max_depth)
    }

    /// Direct parent of `node`, if it has one.
    pub async fn parent(&self, node: &Node) -> Result<Option<Node>, HierarchyError> {
        match node.parent_id {
            Some(parent_id) => self.store.find_by_id(parent_id).await,
            None => Ok(None),
        }
    }

    /// Direct children of `node`, ordered by id.
    pub async fn children(&self, node: &Node) -> Result<Vec<Node>, HierarchyError> {
        let mut children = self.store.find_by_parent_ids(&[node.id]).await?;
        children.sort_by_key(|child| child.id);
        Ok(children)
    }

    pub async fn roots(&self) -> Result<Vec<Node>, HierarchyError> {
        let mut roots = self.store.find_roots().await?;
        roots.sort_by_key(|root| root.id);
        Ok(roots)
    }

    /// The hierarchy under `root_id` without the root entry itself.
    pub async fn descendants(&self, root_id: Uuid) -> Result<Vec<HierarchyEntry>, HierarchyError> {
        let mut entries = self.fetch_hierarchy(root_id).await?;
        if !entries.is_empty() {
            entries.remove(0);
        }
        Ok(entries)
    }
}

impl<S> HierarchyStore<S>
where
    S: RecursiveNodeStore,
{
    /// Same result as [`HierarchyStore::fetch_hierarchy`], with the expansion
    /// performed by the store in a single request.
    pub async fn fetch_hierarchy_recursive(
        &self,
        root_id: Uuid,
    ) -> Result<Vec<HierarchyEntry>, HierarchyError> {
        let max_depth = self.store.config().max_depth();
        // One extra generation so overflow can be told apart from a tree
        // that ends exactly at the limit.
        let rows = self
            .store
            .find_subtree(root_id, max_depth.saturating_add(1))
            .await?;
        debug!(root = %root_id, rows = rows.len(), "fetched recursive hierarchy");
        assemble(rows, max_depth)
    }
}

/// Validate traversal rows, attach children and order by `(level, id)`.
pub(crate) fn assemble(
    mut rows: Vec<(Node, u32)>,
    max_depth: u32,
) -> Result<Vec<HierarchyEntry>, HierarchyError> {
    let mut seen = HashSet::with_capacity(rows.len());
    if let Some((node, _)) = rows.iter().find(|(node, _)| !seen.insert(node.id)) {
        warn!(node = %node.id, "cycle detected in hierarchy");
        return Err(HierarchyError::CycleDetected(node.id));
    }
    if rows.iter().any(|(_, level)| *level > max_depth) {
        warn!(max_depth, "hierarchy exceeds maximum depth");
        return Err(HierarchyError::DepthLimitExceeded(max_depth));
    }

    rows.sort_by(|(a, a_level), (b, b_level)| a_level.cmp(b_level).then_with(|| a.id.cmp(&b.id)));

    // Deepest rows first, so every child is complete before its parent takes a copy.
    let mut pending: HashMap<Uuid, Vec<Node>> = HashMap::new();
    let mut entries = Vec::with_capacity(rows.len());
    for (mut node, level) in rows.into_iter().rev() {
        let mut children = pending.remove(&node.id).unwrap_or_default();
        children.reverse();
        node.children = children;

        if level > 1 {
            if let Some(parent_id) = node.parent_id {
                pending.entry(parent_id).or_default().push(node.clone());
            }
        }
        entries.push(HierarchyEntry::new(node, level));
    }
    entries.reverse();

    Ok(entries)
}
