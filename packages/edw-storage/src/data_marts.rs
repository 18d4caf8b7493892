use sqlx::PgConnection;

use edw_domain::{relation::RelationDirection, term::TermId};

use crate::{
	Error, Result,
	models::{DataMart, DataMartRelationRow, DataMartRow},
};

#[derive(Debug, Clone)]
pub struct NewDataMart {
	pub name: String,
	pub slug: String,
	pub active: bool,
	pub entities_model: String,
	pub ordering: Vec<String>,
	pub view_component: Option<String>,
	pub term_ids: Vec<TermId>,
	pub relations: Vec<(TermId, RelationDirection)>,
}

/// Loads an active data mart with its associations; inactive marts read as absent.
pub async fn get_active_data_mart(
	executor: &mut PgConnection,
	data_mart_id: i64,
) -> Result<Option<DataMart>> {
	let row = sqlx::query_as::<_, DataMartRow>(
		"\
SELECT id, name, slug, active, entities_model, ordering, view_component
FROM data_marts
WHERE id = $1 AND active",
	)
	.bind(data_mart_id)
	.fetch_optional(&mut *executor)
	.await?;
	let Some(row) = row else {
		return Ok(None);
	};
	let term_ids: Vec<i64> = sqlx::query_scalar(
		"\
SELECT term_id
FROM data_mart_terms
WHERE data_mart_id = $1
ORDER BY term_id",
	)
	.bind(data_mart_id)
	.fetch_all(&mut *executor)
	.await?;
	let relations = sqlx::query_as::<_, DataMartRelationRow>(
		"\
SELECT term_id, direction
FROM data_mart_relations
WHERE data_mart_id = $1
ORDER BY term_id, direction",
	)
	.bind(data_mart_id)
	.fetch_all(&mut *executor)
	.await?;

	Ok(Some(DataMart::from_rows(row, term_ids, relations)?))
}

pub async fn insert_data_mart(executor: &mut PgConnection, new: &NewDataMart) -> Result<i64> {
	if new.name.trim().is_empty() || new.slug.trim().is_empty() {
		return Err(Error::InvalidArgument("data mart name and slug must not be empty".to_string()));
	}

	let data_mart_id: i64 = sqlx::query_scalar(
		"\
INSERT INTO data_marts (name, slug, active, entities_model, ordering, view_component)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING id",
	)
	.bind(new.name.trim())
	.bind(new.slug.trim())
	.bind(new.active)
	.bind(new.entities_model.trim())
	.bind(&new.ordering)
	.bind(new.view_component.as_deref())
	.fetch_one(&mut *executor)
	.await?;

	if !new.term_ids.is_empty() {
		sqlx::query(
			"\
INSERT INTO data_mart_terms (data_mart_id, term_id)
SELECT $1, term_id
FROM UNNEST($2::bigint[]) AS t(term_id)
ON CONFLICT DO NOTHING",
		)
		.bind(data_mart_id)
		.bind(&new.term_ids)
		.execute(&mut *executor)
		.await?;
	}

	for (term_id, direction) in &new.relations {
		sqlx::query(
			"\
INSERT INTO data_mart_relations (data_mart_id, term_id, direction)
VALUES ($1, $2, $3)
ON CONFLICT DO NOTHING",
		)
		.bind(data_mart_id)
		.bind(term_id)
		.bind(direction.as_char().to_string())
		.execute(&mut *executor)
		.await?;
	}

	Ok(data_mart_id)
}
