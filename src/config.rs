use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

/// Default bound on traversal depth; deeper hierarchies are reported as errors.
pub const DEFAULT_MAX_DEPTH: u32 = 1024;

/// Default number of parent ids bound into a single `IN (...)` lookup.
pub const DEFAULT_PARENT_BATCH_SIZE: usize = 1000;

/// Static configuration describing how a node table is laid out and how
/// structural mutations behave.
#[derive(Clone, Debug)]
pub struct HierarchyConfig {
    entity_name: String,
    table_name: String,
    id_column: String,
    parent_column: String,
    data_column: String,
    dependent_behavior: DependentBehavior,
    max_depth: u32,
    parent_batch_size: usize,
    advisory_lock_strategy: AdvisoryLockStrategy,
}

impl HierarchyConfig {
    /// Create a new configuration using the logical entity name and the backing table.
    pub fn new(entity_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        let entity_name = entity_name.into();
        let table_name = table_name.into();

        let default_lock = AdvisoryLockStrategy::Namespaced(AdvisoryLockKey::derived_from(
            &entity_name,
            &table_name,
        ));

        Self {
            entity_name,
            table_name,
            id_column: "id".to_string(),
            parent_column: "parent_id".to_string(),
            data_column: "data".to_string(),
            dependent_behavior: DependentBehavior::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            parent_batch_size: DEFAULT_PARENT_BATCH_SIZE,
            advisory_lock_strategy: default_lock,
        }
    }

    /// Merge options produced by [`HierarchyOptions`].
    pub(crate) fn apply_options(mut self, options: HierarchyOptions) -> Self {
        if let Some(id_column) = options.id_column {
            self.id_column = id_column;
        }
        if let Some(parent_column) = options.parent_column {
            self.parent_column = parent_column;
        }
        if let Some(data_column) = options.data_column {
            self.data_column = data_column;
        }
        if let Some(behavior) = options.dependent_behavior {
            self.dependent_behavior = behavior;
        }
        if let Some(max_depth) = options.max_depth {
            self.max_depth = max_depth;
        }
        if let Some(batch_size) = options.parent_batch_size {
            self.parent_batch_size = batch_size.max(1);
        }
        if let Some(strategy) = options.advisory_lock_strategy {
            self.advisory_lock_strategy = strategy;
        }
        self
    }

    /// Human-readable Rust struct name for the node entity.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Table storing the nodes.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Column name storing the parent foreign key.
    pub fn parent_column(&self) -> &str {
        &self.parent_column
    }

    pub fn data_column(&self) -> &str {
        &self.data_column
    }

    /// Dependent behavior when deleting nodes.
    pub fn dependent_behavior(&self) -> DependentBehavior {
        self.dependent_behavior
    }

    /// Deepest level a traversal may reach before failing.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Upper bound on parent ids per child lookup; wider levels are split
    /// into several queries to stay under the backend's bind-parameter limit.
    pub fn parent_batch_size(&self) -> usize {
        self.parent_batch_size
    }

    /// Advisory lock strategy (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self::new("Node", "node")
    }
}

/// Builder-style options consumed by the derive macro.
#[derive(Clone, Debug, Default)]
pub struct HierarchyOptions {
    id_column: Option<String>,
    parent_column: Option<String>,
    data_column: Option<String>,
    dependent_behavior: Option<DependentBehavior>,
    max_depth: Option<u32>,
    parent_batch_size: Option<usize>,
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
}

impl HierarchyOptions {
    pub fn id_column(mut self, value: impl Into<String>) -> Self {
        self.id_column = Some(value.into());
        self
    }

    pub fn parent_column(mut self, value: impl Into<String>) -> Self {
        self.parent_column = Some(value.into());
        self
    }

    pub fn data_column(mut self, value: impl Into<String>) -> Self {
        self.data_column = Some(value.into());
        self
    }

    pub fn dependent_behavior(mut self, behavior: DependentBehavior) -> Self {
        self.dependent_behavior = Some(behavior);
        self
    }

    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn parent_batch_size(mut self, batch_size: usize) -> Self {
        self.parent_batch_size = Some(batch_size);
        self
    }

    pub fn advisory_lock_strategy(mut self, strategy: AdvisoryLockStrategy) -> Self {
        self.advisory_lock_strategy = Some(strategy);
        self
    }

    pub fn apply(self, base: HierarchyConfig) -> HierarchyConfig {
        base.apply_options(self)
    }
}

/// Behaviour to apply to descendants when deleting a node.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentBehavior {
    /// Delete the whole subtree.
    #[default]
    Destroy,
    /// Refuse to delete a node that still has children.
    Restrict,
    /// Detach direct children into roots, then delete the node.
    Nullify,
}

/// Key used for PostgreSQL advisory locks.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AdvisoryLockKey(String);

impl AdvisoryLockKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn derived_from(entity: &str, table: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(entity.as_bytes());
        hasher.update(b"/");
        hasher.update(table.as_bytes());
        let crc = hasher.finalize();
        Self(format!("adjacency-tree::{entity}::{table}::{crc:x}"))
    }
}

/// Configuration describing how to acquire advisory locks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvisoryLockStrategy {
    Disabled,
    Namespaced(AdvisoryLockKey),
}

impl AdvisoryLockStrategy {
    pub fn key(&self) -> Option<&AdvisoryLockKey> {
        match self {
            AdvisoryLockStrategy::Disabled => None,
            AdvisoryLockStrategy::Namespaced(key) => Some(key),
        }
    }
}
