use sea_orm::{ActiveModelBehavior, ActiveModelTrait, EntityTrait, FromQueryResult, IntoActiveModel};
use uuid::Uuid;

use crate::config::HierarchyConfig;
use crate::node::Node;

/// Trait implemented by SeaORM `Model` types stored as an adjacency list.
///
/// Implementations are normally provided by the `#[derive(AdjacencyModel)]` macro.
pub trait AdjacencyModel:
    Clone + Send + Sync + 'static + IntoActiveModel<Self::ActiveModel> + FromQueryResult
{
    type Entity: EntityTrait<Model = Self>;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity> + ActiveModelBehavior + Send;

    fn adjacency_config() -> &'static HierarchyConfig;

    fn id(&self) -> Uuid;
    fn parent_id(&self) -> Option<Uuid>;
    fn data(&self) -> &str;

    fn active_model_from_node(node: &Node) -> Self::ActiveModel;
    fn set_parent(active: &mut Self::ActiveModel, parent: Option<Uuid>);

    fn id_column() -> <Self::Entity as EntityTrait>::Column;
    fn parent_column() -> <Self::Entity as EntityTrait>::Column;

    fn into_node(self) -> Node {
        Node::with_id(self.id(), self.parent_id(), self.data())
    }
}
