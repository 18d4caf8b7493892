use sqlx::PgConnection;

use edw_domain::term::{
	self, SemanticRule, SpecificationMode, Term, TermId, TermTree, TreePlacement,
};

use crate::{Error, Result, models::TermRow};

const TREE_LOCK_ID: i64 = 4_380_222;

const TERM_COLUMNS: &str = "\
id, parent_id, name, slug, position, lft, rght, level, active, semantic_rule, specification_mode, system_flags";

#[derive(Debug, Clone)]
pub struct NewTerm {
	pub parent_id: Option<TermId>,
	pub name: String,
	pub slug: String,
	pub position: i32,
	pub active: bool,
	pub semantic_rule: SemanticRule,
	pub specification_mode: SpecificationMode,
	pub system_flags: i32,
}

/// Field-level changes; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct TermChanges {
	pub name: Option<String>,
	pub slug: Option<String>,
	pub active: Option<bool>,
	pub semantic_rule: Option<SemanticRule>,
	pub specification_mode: Option<SpecificationMode>,
	pub system_flags: Option<i32>,
	/// `Some(None)` moves the term to the top level.
	pub parent_id: Option<Option<TermId>>,
	pub position: Option<i32>,
}
impl TermChanges {
	pub fn moves(&self) -> bool {
		self.parent_id.is_some() || self.position.is_some()
	}
}

pub async fn list_terms(executor: &mut PgConnection) -> Result<Vec<Term>> {
	let sql = format!("SELECT {TERM_COLUMNS} FROM terms ORDER BY lft");
	let rows = sqlx::query_as::<_, TermRow>(&sql).fetch_all(&mut *executor).await?;

	rows.into_iter().map(Term::try_from).collect()
}

pub async fn load_tree(executor: &mut PgConnection) -> Result<TermTree> {
	let terms = list_terms(executor).await?;

	Ok(TermTree::new(terms)?)
}

pub async fn get_term(executor: &mut PgConnection, term_id: TermId) -> Result<Option<Term>> {
	let sql = format!("SELECT {TERM_COLUMNS} FROM terms WHERE id = $1");
	let row = sqlx::query_as::<_, TermRow>(&sql).bind(term_id).fetch_optional(&mut *executor).await?;

	row.map(Term::try_from).transpose()
}

/// Locks the row for the rest of the transaction.
pub async fn get_term_for_update(
	executor: &mut PgConnection,
	term_id: TermId,
) -> Result<Option<Term>> {
	let sql = format!("SELECT {TERM_COLUMNS} FROM terms WHERE id = $1 FOR UPDATE");
	let row = sqlx::query_as::<_, TermRow>(&sql).bind(term_id).fetch_optional(&mut *executor).await?;

	row.map(Term::try_from).transpose()
}

/// Serializes structural writes until the surrounding transaction ends. Taking it again in the
/// same transaction is harmless.
pub async fn lock_tree(executor: &mut PgConnection) -> Result<()> {
	sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(TREE_LOCK_ID).execute(&mut *executor).await?;

	Ok(())
}

pub async fn insert_term(executor: &mut PgConnection, new: &NewTerm) -> Result<Term> {
	validate_labels(&new.name, &new.slug)?;
	lock_tree(executor).await?;

	if let Some(parent_id) = new.parent_id
		&& get_term(executor, parent_id).await?.is_none()
	{
		return Err(Error::NotFound(format!("parent term {parent_id}")));
	}

	let term_id: i64 = sqlx::query_scalar(
		"\
INSERT INTO terms (
	parent_id,
	name,
	slug,
	position,
	active,
	semantic_rule,
	specification_mode,
	system_flags
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
RETURNING id",
	)
	.bind(new.parent_id)
	.bind(new.name.trim())
	.bind(new.slug.trim())
	.bind(new.position)
	.bind(new.active)
	.bind(new.semantic_rule.as_str())
	.bind(new.specification_mode.as_str())
	.bind(new.system_flags)
	.fetch_one(&mut *executor)
	.await?;

	renumber(executor).await?;

	require_term(executor, term_id).await
}

pub async fn update_term(
	executor: &mut PgConnection,
	term_id: TermId,
	changes: &TermChanges,
) -> Result<Term> {
	if let Some(name) = changes.name.as_deref()
		&& name.trim().is_empty()
	{
		return Err(Error::InvalidArgument("term name must not be empty".to_string()));
	}
	if let Some(slug) = changes.slug.as_deref()
		&& slug.trim().is_empty()
	{
		return Err(Error::InvalidArgument("term slug must not be empty".to_string()));
	}
	lock_tree(executor).await?;

	if let Some(Some(parent_id)) = changes.parent_id {
		ensure_valid_parent(executor, term_id, parent_id).await?;
	}

	let result = sqlx::query(
		"\
UPDATE terms
SET
	name = COALESCE($2, name),
	slug = COALESCE($3, slug),
	active = COALESCE($4, active),
	semantic_rule = COALESCE($5, semantic_rule),
	specification_mode = COALESCE($6, specification_mode),
	system_flags = COALESCE($7, system_flags),
	parent_id = CASE WHEN $8 THEN $9 ELSE parent_id END,
	position = COALESCE($10, position),
	updated_at = now()
WHERE id = $1",
	)
	.bind(term_id)
	.bind(changes.name.as_deref().map(str::trim))
	.bind(changes.slug.as_deref().map(str::trim))
	.bind(changes.active)
	.bind(changes.semantic_rule.map(|rule| rule.as_str()))
	.bind(changes.specification_mode.map(|mode| mode.as_str()))
	.bind(changes.system_flags)
	.bind(changes.parent_id.is_some())
	.bind(changes.parent_id.flatten())
	.bind(changes.position)
	.execute(&mut *executor)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("term {term_id}")));
	}
	if changes.moves() {
		renumber(executor).await?;
	}

	require_term(executor, term_id).await
}

/// Deletes the term and its subtree, returning the removed ids.
pub async fn delete_term(executor: &mut PgConnection, term_id: TermId) -> Result<Vec<TermId>> {
	lock_tree(executor).await?;

	let tree = load_tree(executor).await?;

	if !tree.contains(term_id) {
		return Err(Error::NotFound(format!("term {term_id}")));
	}

	let mut removed = vec![term_id];

	removed.extend(tree.descendants(term_id).iter().map(|term| term.id));

	sqlx::query("DELETE FROM terms WHERE id = $1").bind(term_id).execute(&mut *executor).await?;

	renumber(executor).await?;

	Ok(removed)
}

/// Rewrites `lft`/`rght`/`level` for the whole forest from parent links and positions.
pub async fn renumber(executor: &mut PgConnection) -> Result<()> {
	let rows: Vec<(i64, Option<i64>, i32)> =
		sqlx::query_as("SELECT id, parent_id, position FROM terms").fetch_all(&mut *executor).await?;
	let placements: Vec<TreePlacement> = rows
		.into_iter()
		.map(|(id, parent_id, position)| TreePlacement { id, parent_id, position })
		.collect();
	let numbered = term::number_nested_set(&placements)?;
	let ids: Vec<i64> = numbered.iter().map(|position| position.id).collect();
	let lfts: Vec<i32> = numbered.iter().map(|position| position.lft).collect();
	let rghts: Vec<i32> = numbered.iter().map(|position| position.rght).collect();
	let levels: Vec<i32> = numbered.iter().map(|position| position.level).collect();

	sqlx::query(
		"\
UPDATE terms AS t
SET lft = n.lft, rght = n.rght, level = n.level
FROM UNNEST($1::bigint[], $2::int4[], $3::int4[], $4::int4[]) AS n(id, lft, rght, level)
WHERE t.id = n.id
	AND (t.lft, t.rght, t.level) IS DISTINCT FROM (n.lft, n.rght, n.level)",
	)
	.bind(&ids)
	.bind(&lfts)
	.bind(&rghts)
	.bind(&levels)
	.execute(&mut *executor)
	.await?;

	tracing::debug!(terms = ids.len(), "Term tree renumbered.");

	Ok(())
}

async fn require_term(executor: &mut PgConnection, term_id: TermId) -> Result<Term> {
	get_term(executor, term_id).await?.ok_or_else(|| Error::NotFound(format!("term {term_id}")))
}

async fn ensure_valid_parent(
	executor: &mut PgConnection,
	term_id: TermId,
	parent_id: TermId,
) -> Result<()> {
	let tree = load_tree(executor).await?;

	if !tree.contains(parent_id) {
		return Err(Error::NotFound(format!("parent term {parent_id}")));
	}
	if parent_id == term_id || tree.descendants(term_id).iter().any(|term| term.id == parent_id) {
		return Err(Error::InvalidArgument(format!(
			"term {term_id} cannot be placed under itself or its descendant {parent_id}"
		)));
	}

	Ok(())
}

fn validate_labels(name: &str, slug: &str) -> Result<()> {
	if name.trim().is_empty() {
		return Err(Error::InvalidArgument("term name must not be empty".to_string()));
	}
	if slug.trim().is_empty() {
		return Err(Error::InvalidArgument("term slug must not be empty".to_string()));
	}

	Ok(())
}
