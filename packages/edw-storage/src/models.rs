use serde_json::Value;
use time::OffsetDateTime;

use edw_domain::{
	entity::Entity,
	relation::RelationDirection,
	term::{Term, TermId},
};

use crate::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
pub struct TermRow {
	pub id: i64,
	pub parent_id: Option<i64>,
	pub name: String,
	pub slug: String,
	pub position: i32,
	pub lft: i32,
	pub rght: i32,
	pub level: i32,
	pub active: bool,
	pub semantic_rule: String,
	pub specification_mode: String,
	pub system_flags: i32,
}
impl TryFrom<TermRow> for Term {
	type Error = Error;

	fn try_from(row: TermRow) -> Result<Self> {
		Ok(Self {
			id: row.id,
			parent_id: row.parent_id,
			name: row.name,
			slug: row.slug,
			position: row.position,
			lft: row.lft,
			rght: row.rght,
			level: row.level,
			active: row.active,
			semantic_rule: row.semantic_rule.parse()?,
			specification_mode: row.specification_mode.parse()?,
			system_flags: row.system_flags,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct EntityRow {
	pub id: i64,
	pub entity_model: String,
	pub name: String,
	pub active: bool,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl From<EntityRow> for Entity {
	fn from(row: EntityRow) -> Self {
		Self {
			id: row.id,
			entity_model: row.entity_model,
			name: row.name,
			active: row.active,
			created_at: row.created_at,
			updated_at: row.updated_at,
		}
	}
}

/// Entity row plus the summary values computed for it.
#[derive(Debug, sqlx::FromRow)]
pub struct AnnotatedEntityRow {
	#[sqlx(flatten)]
	pub entity: EntityRow,
	pub annotations: Value,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DataMartRow {
	pub id: i64,
	pub name: String,
	pub slug: String,
	pub active: bool,
	pub entities_model: String,
	pub ordering: Vec<String>,
	pub view_component: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DataMartRelationRow {
	pub term_id: i64,
	pub direction: String,
}

/// A data mart with its term and relation associations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMart {
	pub id: i64,
	pub name: String,
	pub slug: String,
	pub active: bool,
	pub entities_model: String,
	pub ordering: Vec<String>,
	pub view_component: Option<String>,
	pub term_ids: Vec<TermId>,
	pub relations: Vec<(TermId, RelationDirection)>,
}
impl DataMart {
	pub fn from_rows(
		row: DataMartRow,
		term_ids: Vec<TermId>,
		relations: Vec<DataMartRelationRow>,
	) -> Result<Self> {
		let relations = relations
			.into_iter()
			.map(|relation| {
				relation
					.direction
					.chars()
					.next()
					.and_then(RelationDirection::from_char)
					.map(|direction| (relation.term_id, direction))
					.ok_or_else(|| {
						Error::InvalidArgument(format!(
							"data mart {} relation {} has direction {:?}",
							row.id, relation.term_id, relation.direction
						))
					})
			})
			.collect::<Result<Vec<_>>>()?;

		Ok(Self {
			id: row.id,
			name: row.name,
			slug: row.slug,
			active: row.active,
			entities_model: row.entities_model,
			ordering: row.ordering,
			view_component: row.view_component,
			term_ids,
			relations,
		})
	}
}
