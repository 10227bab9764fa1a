use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the adjacency-tree APIs.
#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("adjacency-tree supports PostgreSQL and SQLite connections only")]
    UnsupportedBackend,

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("node {0} not found")]
    NodeNotFound(Uuid),

    #[error("parent node {0} does not exist")]
    UnknownParent(Uuid),

    #[error("node {0} already exists")]
    DuplicateNode(Uuid),

    #[error("cycle detected: node {0} was reached twice")]
    CycleDetected(Uuid),

    #[error("hierarchy exceeds the maximum depth of {0} levels")]
    DepthLimitExceeded(u32),

    #[error("node {0} has children")]
    HasChildren(Uuid),

    #[error("moving node {node} under {parent} would create a cycle")]
    WouldCreateCycle { node: Uuid, parent: Uuid },

    #[error("adjacency-tree invariant violation: {0}")]
    Invariant(String),
}

impl HierarchyError {
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }
}
