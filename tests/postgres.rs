use adjacency_tree::{AdjacencyRepository, HierarchyStore, Node, NodeStore};
use sea_orm::entity::prelude::*;
use sea_orm::{Database, DatabaseConnection, DbBackend, Statement};

mod entity {
    pub mod node {
        use adjacency_tree::AdjacencyModelDerive as AdjacencyModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, AdjacencyModel)]
        #[sea_orm(table_name = "adjacency_nodes")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: Uuid,
            pub parent_id: Option<Uuid>,
            pub data: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

#[tokio::test]
async fn hierarchy_round_trips_through_postgres() -> Result<(), Box<dyn std::error::Error>> {
    let Some(db) = setup_database().await? else {
        eprintln!("skipping: ADJACENCY_TREE_TEST_DATABASE_URL is not set");
        return Ok(());
    };
    truncate_tables(&db).await?;

    let repo = AdjacencyRepository::<entity::node::Model>::new(db);

    let root = repo.insert(Node::new("root")).await?;
    let child = repo.insert(Node::child_of(root.id, "child")).await?;
    let leaf = repo.insert(Node::child_of(child.id, "leaf")).await?;
    repo.insert(Node::child_of(root.id, "sibling")).await?;

    let hierarchy = HierarchyStore::new(repo);
    let iterative = hierarchy.fetch_hierarchy(root.id).await?;
    let recursive = hierarchy.fetch_hierarchy_recursive(root.id).await?;

    assert_eq!(iterative.len(), 4);
    assert_eq!(
        serde_json::to_value(&iterative)?,
        serde_json::to_value(&recursive)?
    );
    assert_eq!(iterative.last().map(|e| e.level), Some(3));
    assert!(iterative.last().is_some_and(|e| e.node.same_identity(&leaf)));

    assert_eq!(hierarchy.store().delete(child.id).await?, 2);
    assert!(hierarchy.store().find_by_id(leaf.id).await?.is_none());
    assert_eq!(hierarchy.fetch_hierarchy(root.id).await?.len(), 2);

    // A failed mutation still leaves no advisory lock behind.
    let missing = hierarchy.store().delete(Uuid::new_v4()).await;
    assert!(missing.is_err());
    let held = hierarchy
        .store()
        .connection()
        .query_one(Statement::from_string(
            DbBackend::Postgres,
            "SELECT COUNT(*)::BIGINT AS held FROM pg_locks WHERE locktype = 'advisory'",
        ))
        .await?
        .map(|row| row.try_get::<i64>("", "held"))
        .transpose()?;
    assert_eq!(held, Some(0));

    Ok(())
}

async fn setup_database() -> Result<Option<DatabaseConnection>, sea_orm::DbErr> {
    let url = match std::env::var("ADJACENCY_TREE_TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) if url.starts_with("postgres") => url,
        _ => return Ok(None),
    };

    Database::connect(url).await.map(Some)
}

async fn truncate_tables(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
    db.execute(Statement::from_string(
        DbBackend::Postgres,
        r#"
        CREATE TABLE IF NOT EXISTS adjacency_nodes (
            id UUID PRIMARY KEY,
            parent_id UUID REFERENCES adjacency_nodes(id),
            data VARCHAR(50) NOT NULL
        );
        "#,
    ))
    .await?;

    db.execute(Statement::from_string(
        DbBackend::Postgres,
        "TRUNCATE TABLE adjacency_nodes CASCADE;",
    ))
    .await?;

    Ok(())
}
