use std::collections::HashMap;

use serde_json::{Map, Value};
use sqlx::{PgConnection, Postgres, QueryBuilder};

use edw_domain::{
	entity::{
		AggregateFunction, Entity, OrderField, OrderTerm, SummaryAggregation, SummaryAnnotation,
		SummaryExpr,
	},
	query::{EntityId, EntityPredicate, EntityQuery},
	relation::RelationSpec,
	semantic::TermFilter,
	term::TermId,
};

use crate::{
	Error, Result,
	models::{AnnotatedEntityRow, EntityRow},
};

const ENTITY_COLUMNS: &str = "e.id, e.entity_model, e.name, e.active, e.created_at, e.updated_at";

#[derive(Debug, Clone)]
pub struct NewEntity {
	pub entity_model: String,
	pub name: String,
	pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListParams {
	pub ordering: Vec<OrderTerm>,
	pub limit: i64,
	pub offset: i64,
	pub annotations: Vec<SummaryAnnotation>,
}

#[derive(Debug, Clone)]
pub struct AnnotatedEntity {
	pub entity: Entity,
	pub annotations: Map<String, Value>,
}

/// Appends ` WHERE <predicates>` for `query`, with `e` as the entity alias.
pub fn push_entity_query(builder: &mut QueryBuilder<'_, Postgres>, query: &EntityQuery) {
	builder.push(" WHERE TRUE");

	for predicate in query.predicates() {
		builder.push(" AND ");

		push_predicate(builder, predicate);
	}
}

pub async fn list_entities(
	executor: &mut PgConnection,
	query: &EntityQuery,
	params: &ListParams,
) -> Result<Vec<AnnotatedEntity>> {
	if params.limit <= 0 || params.offset < 0 {
		return Err(Error::InvalidArgument("limit must be positive and offset non-negative".to_string()));
	}

	let mut builder = QueryBuilder::new("SELECT ");

	builder.push(ENTITY_COLUMNS);
	builder.push(", ");
	push_annotations(&mut builder, &params.annotations);
	builder.push(" AS annotations FROM entities e");
	push_entity_query(&mut builder, query);
	push_ordering(&mut builder, &params.ordering);
	builder.push(" LIMIT ");
	builder.push_bind(params.limit);
	builder.push(" OFFSET ");
	builder.push_bind(params.offset);

	let rows = builder.build_query_as::<AnnotatedEntityRow>().fetch_all(&mut *executor).await?;

	Ok(rows
		.into_iter()
		.map(|row| AnnotatedEntity {
			entity: row.entity.into(),
			annotations: match row.annotations {
				Value::Object(map) => map,
				_ => Map::new(),
			},
		})
		.collect())
}

pub async fn count_entities(executor: &mut PgConnection, query: &EntityQuery) -> Result<i64> {
	let mut builder = QueryBuilder::new("SELECT count(*) FROM entities e");

	push_entity_query(&mut builder, query);

	let count: i64 = builder.build_query_scalar().fetch_one(&mut *executor).await?;

	Ok(count)
}

/// Computes whole-result aggregates over every entity matching `query`.
pub async fn aggregate_entities(
	executor: &mut PgConnection,
	query: &EntityQuery,
	aggregations: &[SummaryAggregation],
) -> Result<Map<String, Value>> {
	if aggregations.is_empty() {
		return Ok(Map::new());
	}

	let mut builder = QueryBuilder::new("SELECT jsonb_build_object(");

	for (idx, aggregation) in aggregations.iter().enumerate() {
		if idx > 0 {
			builder.push(", ");
		}

		builder.push_bind(aggregation.key.clone());
		builder.push("::text, ");
		builder.push(aggregate_sql(aggregation.function, aggregation.column));
	}

	builder.push(") FROM entities e");
	push_entity_query(&mut builder, query);

	let value: Value = builder.build_query_scalar().fetch_one(&mut *executor).await?;

	Ok(match value {
		Value::Object(map) => map,
		_ => Map::new(),
	})
}

pub async fn get_entity(executor: &mut PgConnection, entity_id: EntityId) -> Result<Option<Entity>> {
	let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.id = $1");
	let row =
		sqlx::query_as::<_, EntityRow>(&sql).bind(entity_id).fetch_optional(&mut *executor).await?;

	Ok(row.map(Entity::from))
}

pub async fn insert_entity(executor: &mut PgConnection, new: &NewEntity) -> Result<Entity> {
	if new.name.trim().is_empty() {
		return Err(Error::InvalidArgument("entity name must not be empty".to_string()));
	}
	if new.entity_model.trim().is_empty() {
		return Err(Error::InvalidArgument("entity model must not be empty".to_string()));
	}

	let row = sqlx::query_as::<_, EntityRow>(
		"\
INSERT INTO entities AS e (entity_model, name, active)
VALUES ($1, $2, $3)
RETURNING e.id, e.entity_model, e.name, e.active, e.created_at, e.updated_at",
	)
	.bind(new.entity_model.trim())
	.bind(new.name.trim())
	.bind(new.active)
	.fetch_one(&mut *executor)
	.await?;

	Ok(row.into())
}

/// Replaces the entity's tags.
pub async fn set_entity_terms(
	executor: &mut PgConnection,
	entity_id: EntityId,
	term_ids: &[TermId],
) -> Result<()> {
	sqlx::query("DELETE FROM entity_terms WHERE entity_id = $1")
		.bind(entity_id)
		.execute(&mut *executor)
		.await?;

	if term_ids.is_empty() {
		return Ok(());
	}

	sqlx::query(
		"\
INSERT INTO entity_terms (entity_id, term_id)
SELECT $1, term_id
FROM UNNEST($2::bigint[]) AS t(term_id)
ON CONFLICT DO NOTHING",
	)
	.bind(entity_id)
	.bind(term_ids)
	.execute(&mut *executor)
	.await?;

	Ok(())
}

pub async fn add_relation(
	executor: &mut PgConnection,
	from_entity_id: EntityId,
	to_entity_id: EntityId,
	term_id: TermId,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO entity_relations (from_entity_id, to_entity_id, term_id)
VALUES ($1, $2, $3)
ON CONFLICT (from_entity_id, to_entity_id, term_id) DO NOTHING",
	)
	.bind(from_entity_id)
	.bind(to_entity_id)
	.bind(term_id)
	.execute(&mut *executor)
	.await?;

	Ok(())
}

/// Tag ids per entity, sorted.
pub async fn terms_for_entities(
	executor: &mut PgConnection,
	entity_ids: &[EntityId],
) -> Result<HashMap<EntityId, Vec<TermId>>> {
	if entity_ids.is_empty() {
		return Ok(HashMap::new());
	}

	let rows: Vec<(i64, i64)> = sqlx::query_as(
		"\
SELECT entity_id, term_id
FROM entity_terms
WHERE entity_id = ANY($1::bigint[])
ORDER BY entity_id, term_id",
	)
	.bind(entity_ids)
	.fetch_all(&mut *executor)
	.await?;
	let mut out: HashMap<EntityId, Vec<TermId>> = HashMap::new();

	for (entity_id, term_id) in rows {
		out.entry(entity_id).or_default().push(term_id);
	}

	Ok(out)
}

fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &EntityPredicate) {
	match predicate {
		EntityPredicate::Active(active) => {
			builder.push("e.active = ");
			builder.push_bind(*active);
		},
		EntityPredicate::Terms(filter) => push_term_filter(builder, filter),
		EntityPredicate::Relation(spec) => push_relation(builder, spec),
		EntityPredicate::Subject(subjects) => {
			builder.push("(EXISTS (SELECT 1 FROM entity_relations r WHERE r.to_entity_id = e.id AND r.from_entity_id = ANY(");
			builder.push_bind(subjects.clone());
			builder.push(")) OR EXISTS (SELECT 1 FROM entity_relations r WHERE r.from_entity_id = e.id AND r.to_entity_id = ANY(");
			builder.push_bind(subjects.clone());
			builder.push(")))");
		},
		EntityPredicate::SubjectRelation { subjects, relations } =>
			push_subject_relation(builder, subjects, relations),
	}
}

fn push_term_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &TermFilter) {
	match filter {
		TermFilter::Tagged(ids) if ids.is_empty() => {
			builder.push("FALSE");
		},
		TermFilter::Tagged(ids) => {
			builder.push(
				"EXISTS (SELECT 1 FROM entity_terms et WHERE et.entity_id = e.id AND et.term_id = ANY(",
			);
			builder.push_bind(ids.clone());
			builder.push("))");
		},
		TermFilter::All(children) => push_joined(builder, children, " AND ", "TRUE"),
		TermFilter::Any(children) => push_joined(builder, children, " OR ", "FALSE"),
		TermFilter::ExactlyOne(children) if children.is_empty() => {
			builder.push("FALSE");
		},
		TermFilter::ExactlyOne(children) => {
			builder.push("((");

			for (idx, child) in children.iter().enumerate() {
				if idx > 0 {
					builder.push(" + ");
				}

				builder.push("(CASE WHEN ");
				push_term_filter(builder, child);
				builder.push(" THEN 1 ELSE 0 END)");
			}

			builder.push(") = 1)");
		},
	}
}

fn push_joined(
	builder: &mut QueryBuilder<'_, Postgres>,
	children: &[TermFilter],
	separator: &str,
	empty: &str,
) {
	if children.is_empty() {
		builder.push(empty);

		return;
	}

	builder.push("(");

	for (idx, child) in children.iter().enumerate() {
		if idx > 0 {
			builder.push(separator);
		}

		push_term_filter(builder, child);
	}

	builder.push(")");
}

fn push_relation(builder: &mut QueryBuilder<'_, Postgres>, spec: &RelationSpec) {
	if spec.is_empty() {
		builder.push("FALSE");

		return;
	}

	let mut clauses = 0;

	builder.push("(");

	if !spec.forward.is_empty() {
		builder.push("EXISTS (SELECT 1 FROM entity_relations r WHERE r.from_entity_id = e.id AND r.term_id = ANY(");
		builder.push_bind(spec.forward.clone());
		builder.push("))");

		clauses += 1;
	}
	if !spec.reverse.is_empty() {
		if clauses > 0 {
			builder.push(" OR ");
		}

		builder.push("EXISTS (SELECT 1 FROM entity_relations r WHERE r.to_entity_id = e.id AND r.term_id = ANY(");
		builder.push_bind(spec.reverse.clone());
		builder.push("))");
	}

	builder.push(")");
}

fn push_subject_relation(
	builder: &mut QueryBuilder<'_, Postgres>,
	subjects: &[EntityId],
	relations: &RelationSpec,
) {
	if subjects.is_empty() || relations.is_empty() {
		builder.push("FALSE");

		return;
	}

	let mut clauses = 0;

	builder.push("(");

	if !relations.forward.is_empty() {
		builder.push("EXISTS (SELECT 1 FROM entity_relations r WHERE r.to_entity_id = e.id AND r.from_entity_id = ANY(");
		builder.push_bind(subjects.to_vec());
		builder.push(") AND r.term_id = ANY(");
		builder.push_bind(relations.forward.clone());
		builder.push("))");

		clauses += 1;
	}
	if !relations.reverse.is_empty() {
		if clauses > 0 {
			builder.push(" OR ");
		}

		builder.push("EXISTS (SELECT 1 FROM entity_relations r WHERE r.from_entity_id = e.id AND r.to_entity_id = ANY(");
		builder.push_bind(subjects.to_vec());
		builder.push(") AND r.term_id = ANY(");
		builder.push_bind(relations.reverse.clone());
		builder.push("))");
	}

	builder.push(")");
}

fn push_annotations(builder: &mut QueryBuilder<'_, Postgres>, annotations: &[SummaryAnnotation]) {
	if annotations.is_empty() {
		builder.push("'{}'::jsonb");

		return;
	}

	builder.push("jsonb_build_object(");

	for (idx, annotation) in annotations.iter().enumerate() {
		if idx > 0 {
			builder.push(", ");
		}

		builder.push_bind(annotation.key.clone());
		builder.push("::text, ");
		builder.push(annotation_sql(annotation.expr));
	}

	builder.push(")");
}

fn push_ordering(builder: &mut QueryBuilder<'_, Postgres>, ordering: &[OrderTerm]) {
	builder.push(" ORDER BY ");

	for term in ordering {
		builder.push(column(term.field));
		builder.push(if term.descending { " DESC, " } else { " ASC, " });
	}

	builder.push("e.id ASC");
}

fn annotation_sql(expr: SummaryExpr) -> &'static str {
	match expr {
		SummaryExpr::TermCount =>
			"(SELECT count(*) FROM entity_terms et WHERE et.entity_id = e.id)",
		SummaryExpr::ForwardRelationCount =>
			"(SELECT count(*) FROM entity_relations r WHERE r.from_entity_id = e.id)",
		SummaryExpr::BackwardRelationCount =>
			"(SELECT count(*) FROM entity_relations r WHERE r.to_entity_id = e.id)",
	}
}

fn aggregate_sql(function: AggregateFunction, field: OrderField) -> String {
	let column = column(field);

	match (function, field) {
		(AggregateFunction::Count, _) => format!("count({column})"),
		(AggregateFunction::Min, OrderField::Active) => format!("bool_and({column})"),
		(AggregateFunction::Max, OrderField::Active) => format!("bool_or({column})"),
		(AggregateFunction::Min, _) => format!("min({column})"),
		(AggregateFunction::Max, _) => format!("max({column})"),
	}
}

fn column(field: OrderField) -> &'static str {
	match field {
		OrderField::Id => "e.id",
		OrderField::Name => "e.name",
		OrderField::Active => "e.active",
		OrderField::CreatedAt => "e.created_at",
		OrderField::UpdatedAt => "e.updated_at",
	}
}
