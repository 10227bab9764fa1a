use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One element of a parent-pointer tree.
///
/// `children` is a derived view: it is filled in by hierarchy retrieval and is
/// never persisted. Nodes are compared by identifier through
/// [`Node::same_identity`]; payload changes never affect identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub data: String,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Node {
    /// Create a root node with a freshly generated id.
    pub fn new(data: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), None, data)
    }

    /// Create a node under `parent` with a freshly generated id.
    pub fn child_of(parent: Uuid, data: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), Some(parent), data)
    }

    pub fn with_id(id: Uuid, parent_id: Option<Uuid>, data: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            data: data.into(),
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn same_identity(&self, other: &Node) -> bool {
        self.id == other.id
    }

    /// Copy of this node without its materialized children.
    pub(crate) fn detached(&self) -> Self {
        Self::with_id(self.id, self.parent_id, self.data.clone())
    }
}

/// A node paired with its 1-based depth relative to the traversal root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HierarchyEntry {
    pub node: Node,
    pub level: u32,
}

impl HierarchyEntry {
    pub fn new(node: Node, level: u32) -> Self {
        Self { node, level }
    }

    /// Split into the `(node, level)` pair.
    pub fn into_parts(self) -> (Node, u32) {
        (self.node, self.level)
    }
}
