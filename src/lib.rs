//! Adjacency-list hierarchies on top of SeaORM.
//!
//! Trees are stored as rows pointing at their parent. [`HierarchyStore`]
//! rebuilds the subtree under any node, tagging each node with its 1-based
//! level and attaching its children, either level by level through a
//! [`NodeStore`] or in a single recursive query through a
//! [`RecursiveNodeStore`]. PostgreSQL and SQLite are supported.

pub mod config;
pub mod error;
pub mod hierarchy;
pub mod lock;
pub mod memory;
pub mod node;
pub mod repository;
pub mod store;
pub mod traits;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::config::{DependentBehavior, HierarchyConfig, HierarchyOptions};
    pub use crate::hierarchy::HierarchyStore;
    pub use crate::node::{HierarchyEntry, Node};
    pub use crate::store::{NodeStore, RecursiveNodeStore};
    pub use crate::traits::AdjacencyModel;
}

pub use adjacency_tree_macros::AdjacencyModel as AdjacencyModelDerive;
#[doc(hidden)]
pub use adjacency_tree_macros::AdjacencyModel;
pub use config::{
    AdvisoryLockKey, AdvisoryLockStrategy, DependentBehavior, HierarchyConfig, HierarchyOptions,
    DEFAULT_MAX_DEPTH,
};
pub use error::HierarchyError;
pub use hierarchy::HierarchyStore;
pub use memory::MemoryNodeStore;
pub use node::{HierarchyEntry, Node};
pub use repository::AdjacencyRepository;
pub use store::{NodeStore, RecursiveNodeStore};
pub use traits::AdjacencyModel;
