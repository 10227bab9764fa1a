use std::collections::HashSet;
use std::marker::PhantomData;

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, Statement, Value,
};
use tracing::debug;
use uuid::Uuid;

use crate::config::{DependentBehavior, HierarchyConfig};
use crate::error::HierarchyError;
use crate::lock::LockedTransaction;
use crate::node::Node;
use crate::store::{NodeStore, RecursiveNodeStore};
use crate::traits::AdjacencyModel;

/// SeaORM-backed node store for a given model.
#[derive(Debug, Clone)]
pub struct AdjacencyRepository<M>
where
    M: AdjacencyModel,
{
    conn: DatabaseConnection,
    _marker: PhantomData<fn() -> M>,
}

#[derive(Debug, FromQueryResult)]
struct SubtreeRow {
    node_id: Uuid,
    node_parent_id: Option<Uuid>,
    node_data: String,
    node_level: i64,
}

impl<M> AdjacencyRepository<M>
where
    M: AdjacencyModel,
{
    pub fn new(conn: DatabaseConnection) -> Self {
        Self {
            conn,
            _marker: PhantomData,
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    fn config(&self) -> &'static HierarchyConfig {
        M::adjacency_config()
    }

    fn ensure_supported(conn: &impl ConnectionTrait) -> Result<DbBackend, HierarchyError> {
        match conn.get_database_backend() {
            backend @ (DbBackend::Postgres | DbBackend::Sqlite) => Ok(backend),
            _ => Err(HierarchyError::UnsupportedBackend),
        }
    }

    /// Insert `node`. Its parent, if any, must already exist.
    pub async fn insert(&self, node: Node) -> Result<Node, HierarchyError> {
        Self::ensure_supported(&self.conn)?;
        let guard = self.lock().await?;
        let result = async { self.insert_on(guard.connection()?, &node).await }.await;
        finish(guard, result).await
    }

    /// Delete a node, applying the configured dependent behavior. Returns the
    /// number of deleted rows.
    pub async fn delete(&self, id: Uuid) -> Result<u64, HierarchyError> {
        Self::ensure_supported(&self.conn)?;
        let guard = self.lock().await?;
        let result = async { self.delete_on(guard.connection()?, id).await }.await;
        finish(guard, result).await
    }

    /// Reparent `id` under `new_parent`, or turn it into a root.
    pub async fn move_node(
        &self,
        id: Uuid,
        new_parent: Option<Uuid>,
    ) -> Result<Node, HierarchyError> {
        Self::ensure_supported(&self.conn)?;
        let guard = self.lock().await?;
        let result = async { self.move_on(guard.connection()?, id, new_parent).await }.await;
        finish(guard, result).await
    }

    async fn lock(&self) -> Result<LockedTransaction, HierarchyError> {
        LockedTransaction::acquire(self.config().advisory_lock_strategy(), &self.conn).await
    }

    async fn insert_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &Node,
    ) -> Result<Node, HierarchyError> {
        if self.find_model_on(conn, node.id).await?.is_some() {
            return Err(HierarchyError::DuplicateNode(node.id));
        }
        if let Some(parent_id) = node.parent_id {
            if self.find_model_on(conn, parent_id).await?.is_none() {
                return Err(HierarchyError::UnknownParent(parent_id));
            }
        }

        let model = M::active_model_from_node(node).insert(conn).await?;
        debug!(id = %node.id, parent = ?node.parent_id, "inserted node");
        Ok(model.into_node())
    }

    async fn delete_on<C: ConnectionTrait>(&self, conn: &C, id: Uuid) -> Result<u64, HierarchyError> {
        if self.find_model_on(conn, id).await?.is_none() {
            return Err(HierarchyError::NodeNotFound(id));
        }

        let removed = match self.config().dependent_behavior() {
            DependentBehavior::Destroy => {
                let levels = self.subtree_levels_on(conn, id).await?;
                let mut removed = 0;
                let batch_size = self.config().parent_batch_size();
                for level in levels.iter().rev() {
                    for chunk in level.chunks(batch_size) {
                        removed += M::Entity::delete_many()
                            .filter(M::id_column().is_in(chunk.iter().copied()))
                            .exec(conn)
                            .await?
                            .rows_affected;
                    }
                }
                removed
            }
            DependentBehavior::Restrict => {
                let child = M::Entity::find()
                    .filter(M::parent_column().eq(id))
                    .one(conn)
                    .await?;
                if child.is_some() {
                    return Err(HierarchyError::HasChildren(id));
                }
                self.delete_one_on(conn, id).await?
            }
            DependentBehavior::Nullify => {
                M::Entity::update_many()
                    .col_expr(M::parent_column(), Expr::value(Value::Uuid(None)))
                    .filter(M::parent_column().eq(id))
                    .exec(conn)
                    .await?;
                self.delete_one_on(conn, id).await?
            }
        };

        debug!(%id, removed, "deleted node");
        Ok(removed)
    }

    async fn delete_one_on<C: ConnectionTrait>(&self, conn: &C, id: Uuid) -> Result<u64, HierarchyError> {
        let result = M::Entity::delete_many()
            .filter(M::id_column().eq(id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn move_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: Uuid,
        new_parent: Option<Uuid>,
    ) -> Result<Node, HierarchyError> {
        let model = self
            .find_model_on(conn, id)
            .await?
            .ok_or(HierarchyError::NodeNotFound(id))?;

        if let Some(parent) = new_parent {
            if self.find_model_on(conn, parent).await?.is_none() {
                return Err(HierarchyError::UnknownParent(parent));
            }
            let subtree = self.subtree_levels_on(conn, id).await?;
            if subtree.iter().flatten().any(|d| *d == parent) {
                return Err(HierarchyError::WouldCreateCycle { node: id, parent });
            }
        }

        let mut active = model.into_active_model();
        M::set_parent(&mut active, new_parent);
        let updated = active.update(conn).await?;
        debug!(%id, parent = ?new_parent, "moved node");
        Ok(updated.into_node())
    }

    async fn find_model_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: Uuid,
    ) -> Result<Option<M>, HierarchyError> {
        let model = M::Entity::find()
            .filter(M::id_column().eq(id))
            .one(conn)
            .await?;
        Ok(model)
    }

    async fn find_by_parent_ids_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[Uuid],
    ) -> Result<Vec<Node>, HierarchyError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut nodes = Vec::new();
        for chunk in ids.chunks(self.config().parent_batch_size()) {
            let rows = M::Entity::find()
                .filter(M::parent_column().is_in(chunk.iter().copied()))
                .order_by_asc(M::id_column())
                .all(conn)
                .await?;
            nodes.extend(rows.into_iter().map(AdjacencyModel::into_node));
        }
        if ids.len() > self.config().parent_batch_size() {
            nodes.sort_by_key(|node| node.id);
        }
        Ok(nodes)
    }

    /// Ids of `root` and its descendants grouped by generation. Ids already
    /// collected are skipped, so a corrupted cyclic graph still terminates.
    async fn subtree_levels_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        root: Uuid,
    ) -> Result<Vec<Vec<Uuid>>, HierarchyError> {
        let mut visited = HashSet::from([root]);
        let mut levels = vec![vec![root]];

        loop {
            let frontier = match levels.last() {
                Some(frontier) => frontier.clone(),
                None => break,
            };
            let next: Vec<Uuid> = self
                .find_by_parent_ids_on(conn, &frontier)
                .await?
                .into_iter()
                .map(|node| node.id)
                .filter(|id| visited.insert(*id))
                .collect();
            if next.is_empty() {
                break;
            }
            levels.push(next);
        }

        Ok(levels)
    }

    fn subtree_statement(&self, backend: DbBackend, root_id: Uuid, max_levels: u32) -> Statement {
        let config = self.config();
        let table = quote_ident(config.table_name());
        let id = quote_ident(config.id_column());
        let parent = quote_ident(config.parent_column());
        let data = quote_ident(config.data_column());
        let (root_param, levels_param) = match backend {
            DbBackend::Postgres => ("$1", "$2"),
            _ => ("?", "?"),
        };

        let sql = format!(
            "WITH RECURSIVE subtree (node_id, node_parent_id, node_data, node_level) AS ( \
                SELECT t.{id}, t.{parent}, t.{data}, CAST(1 AS BIGINT) \
                FROM {table} t WHERE t.{id} = {root_param} \
                UNION ALL \
                SELECT c.{id}, c.{parent}, c.{data}, s.node_level + 1 \
                FROM {table} c INNER JOIN subtree s ON c.{parent} = s.node_id \
                WHERE s.node_level < {levels_param} \
            ) \
            SELECT node_id, node_parent_id, node_data, node_level FROM subtree"
        );

        Statement::from_sql_and_values(
            backend,
            sql,
            vec![Value::from(root_id), Value::from(i64::from(max_levels))],
        )
    }
}

async fn finish<T>(
    guard: LockedTransaction,
    result: Result<T, HierarchyError>,
) -> Result<T, HierarchyError> {
    match result {
        Ok(value) => {
            guard.commit().await?;
            Ok(value)
        }
        Err(err) => {
            let _ = guard.rollback().await;
            Err(err)
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl<M> NodeStore for AdjacencyRepository<M>
where
    M: AdjacencyModel,
{
    fn config(&self) -> &HierarchyConfig {
        M::adjacency_config()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Node>, HierarchyError> {
        Self::ensure_supported(&self.conn)?;
        let model = self.find_model_on(&self.conn, id).await?;
        Ok(model.map(AdjacencyModel::into_node))
    }

    async fn find_by_parent_ids(&self, ids: &[Uuid]) -> Result<Vec<Node>, HierarchyError> {
        Self::ensure_supported(&self.conn)?;
        self.find_by_parent_ids_on(&self.conn, ids).await
    }

    async fn find_roots(&self) -> Result<Vec<Node>, HierarchyError> {
        Self::ensure_supported(&self.conn)?;
        let rows = M::Entity::find()
            .filter(M::parent_column().is_null())
            .order_by_asc(M::id_column())
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(AdjacencyModel::into_node).collect())
    }
}

#[async_trait]
impl<M> RecursiveNodeStore for AdjacencyRepository<M>
where
    M: AdjacencyModel,
{
    async fn find_subtree(
        &self,
        root_id: Uuid,
        max_levels: u32,
    ) -> Result<Vec<(Node, u32)>, HierarchyError> {
        let backend = Self::ensure_supported(&self.conn)?;
        let statement = self.subtree_statement(backend, root_id, max_levels);
        let rows = SubtreeRow::find_by_statement(statement)
            .all(&self.conn)
            .await?;

        rows.into_iter()
            .map(|row| {
                let level = u32::try_from(row.node_level).map_err(|_| {
                    HierarchyError::invariant(format!("invalid level {}", row.node_level))
                })?;
                Ok((Node::with_id(row.node_id, row.node_parent_id, row.node_data), level))
            })
            .collect()
    }
}
