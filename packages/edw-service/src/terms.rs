use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use edw_domain::term::{SemanticRule, SpecificationMode, Term, TermId, TermTree};
use edw_storage::terms::{self, NewTerm, TermChanges};

use crate::{
	EdwService, Error, Result,
	cache::Decompressor,
	invalidation::{self, ChildrenEviction, InvalidationPlan},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TermItem {
	pub id: TermId,
	pub parent_id: Option<TermId>,
	pub name: String,
	pub slug: String,
	pub position: i32,
	pub level: i32,
	pub active: bool,
	pub semantic_rule: SemanticRule,
	pub specification_mode: SpecificationMode,
	pub is_leaf: bool,
	pub delete_restricted: bool,
}
impl From<&Term> for TermItem {
	fn from(term: &Term) -> Self {
		Self {
			id: term.id,
			parent_id: term.parent_id,
			name: term.name.clone(),
			slug: term.slug.clone(),
			position: term.position,
			level: term.level,
			active: term.active,
			semantic_rule: term.semantic_rule,
			specification_mode: term.specification_mode,
			is_leaf: term.is_leaf_node(),
			delete_restricted: term.delete_restricted(),
		}
	}
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChildrenRequest {
	#[serde(default)]
	pub parent_id: Option<TermId>,
	#[serde(default)]
	pub active_only: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecompressRequest {
	pub terms: Vec<TermId>,
	#[serde(default)]
	pub fix_it: bool,
	pub active_only: Option<bool>,
	#[serde(default = "default_true")]
	pub use_cached_decompress: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTermRequest {
	pub parent_id: Option<TermId>,
	pub name: String,
	pub slug: String,
	#[serde(default)]
	pub position: i32,
	#[serde(default = "default_true")]
	pub active: bool,
	#[serde(default = "default_semantic_rule")]
	pub semantic_rule: SemanticRule,
	#[serde(default = "default_specification_mode")]
	pub specification_mode: SpecificationMode,
	#[serde(default)]
	pub system_flags: i32,
}

/// Absent fields are left unchanged; `"parent_id": null` moves the term to the top level.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateTermRequest {
	pub name: Option<String>,
	pub slug: Option<String>,
	pub active: Option<bool>,
	pub semantic_rule: Option<SemanticRule>,
	pub specification_mode: Option<SpecificationMode>,
	pub system_flags: Option<i32>,
	#[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
	pub parent_id: Option<Option<TermId>>,
	pub position: Option<i32>,
}
impl UpdateTermRequest {
	fn into_changes(self) -> TermChanges {
		TermChanges {
			name: self.name,
			slug: self.slug,
			active: self.active,
			semantic_rule: self.semantic_rule,
			specification_mode: self.specification_mode,
			system_flags: self.system_flags,
			parent_id: self.parent_id,
			position: self.position,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MoveTermRequest {
	pub parent_id: Option<TermId>,
	#[serde(default)]
	pub position: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteTermResponse {
	pub removed: Vec<TermId>,
}

impl EdwService {
	/// The cached tree, loading it on a miss.
	pub async fn term_tree(&self) -> Result<Arc<TermTree>> {
		Ok(self.cached_tree().await?.0)
	}

	/// With `use_cached` unset the tree is read fresh and nothing is memoized.
	pub async fn decompressor(&self, use_cached: bool) -> Result<Decompressor<'_>> {
		let active_only = self.cfg.filter.active_terms_only;

		if use_cached {
			let (tree, generation) = self.cached_tree().await?;

			return Ok(Decompressor::cached(tree, &self.cache, generation, active_only));
		}

		Ok(Decompressor::uncached(self.load_tree().await?, active_only))
	}

	pub async fn decompress(&self, req: DecompressRequest) -> Result<Value> {
		let active_only = req.active_only.unwrap_or(self.cfg.filter.active_terms_only);
		let decompressor = if req.use_cached_decompress {
			let (tree, generation) = self.cached_tree().await?;

			Decompressor::cached(tree, &self.cache, generation, active_only)
		} else {
			Decompressor::uncached(self.load_tree().await?, active_only)
		};

		Ok(decompressor.decompress(&req.terms, req.fix_it)?.to_value())
	}

	/// Direct children of `parent_id`, memoized under the children key namespace.
	pub async fn children(&self, req: ChildrenRequest) -> Result<Vec<TermItem>> {
		let key = invalidation::children_key(&self.cfg.cache, req.parent_id, req.active_only);

		if let Some(hit) = self.cache.children(&key) {
			return Ok(hit.iter().map(TermItem::from).collect());
		}

		let (tree, generation) = self.cached_tree().await?;

		if let Some(parent_id) = req.parent_id
			&& !tree.contains(parent_id)
		{
			return Err(Error::NotFound { message: format!("Term {parent_id} not found.") });
		}

		let children: Vec<Term> =
			tree.children(req.parent_id, req.active_only).into_iter().cloned().collect();
		let items = children.iter().map(TermItem::from).collect();

		tracing::debug!(%key, children = children.len(), "Children cache miss.");

		self.cache.store_children(key, Arc::new(children), generation);

		Ok(items)
	}

	pub async fn create_term(&self, req: CreateTermRequest) -> Result<TermItem> {
		let new = NewTerm {
			parent_id: req.parent_id,
			name: req.name,
			slug: req.slug,
			position: req.position,
			active: req.active,
			semantic_rule: req.semantic_rule,
			specification_mode: req.specification_mode,
			system_flags: req.system_flags,
		};
		let mut tx = self.db.pool.begin().await?;
		let term = terms::insert_term(&mut tx, &new).await?;

		tx.commit().await?;

		self.after_save(InvalidationPlan::keep(), term.parent_id);

		tracing::info!(term_id = term.id, parent_id = ?term.parent_id, "Term created.");

		Ok(TermItem::from(&term))
	}

	pub async fn update_term(&self, term_id: TermId, req: UpdateTermRequest) -> Result<TermItem> {
		let changes = req.into_changes();
		let mut tx = self.db.pool.begin().await?;

		terms::lock_tree(&mut tx).await?;

		let original = terms::get_term_for_update(&mut tx, term_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Term {term_id} not found.") })?;
		let tree = terms::load_tree(&mut tx).await?;
		let plan = invalidation::plan_update(
			&self.cfg.cache,
			&tree,
			&original,
			changes.parent_id.unwrap_or(original.parent_id),
			changes.active.unwrap_or(original.active),
		);
		let term = terms::update_term(&mut tx, term_id, &changes).await?;

		tx.commit().await?;

		self.after_save(plan, term.parent_id);

		tracing::info!(term_id, parent_id = ?term.parent_id, active = term.active, "Term updated.");

		Ok(TermItem::from(&term))
	}

	pub async fn move_term(&self, term_id: TermId, req: MoveTermRequest) -> Result<TermItem> {
		let changes = TermChanges {
			parent_id: Some(req.parent_id),
			position: Some(req.position),
			..TermChanges::default()
		};
		let mut tx = self.db.pool.begin().await?;

		terms::lock_tree(&mut tx).await?;

		let original = terms::get_term_for_update(&mut tx, term_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Term {term_id} not found.") })?;
		let term = terms::update_term(&mut tx, term_id, &changes).await?;

		tx.commit().await?;

		let plan = InvalidationPlan {
			eviction: invalidation::post_save_eviction(&self.cfg.cache, original.parent_id, false),
			parent_validated: false,
		};

		self.after_save(plan, term.parent_id);

		tracing::info!(
			term_id,
			from = ?original.parent_id,
			to = ?term.parent_id,
			position = term.position,
			"Term moved."
		);

		Ok(TermItem::from(&term))
	}

	/// Removes the term and its subtree unless the term is delete-restricted.
	pub async fn delete_term(&self, term_id: TermId) -> Result<DeleteTermResponse> {
		let mut tx = self.db.pool.begin().await?;

		terms::lock_tree(&mut tx).await?;

		let term = terms::get_term_for_update(&mut tx, term_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Term {term_id} not found.") })?;

		if term.delete_restricted() {
			return Err(Error::Conflict { message: format!("Term {term_id} cannot be deleted.") });
		}

		let removed = terms::delete_term(&mut tx, term_id).await?;

		tx.commit().await?;

		self.after_save(invalidation::plan_delete(&self.cfg.cache, &removed), term.parent_id);

		tracing::info!(term_id, removed = removed.len(), "Term deleted.");

		Ok(DeleteTermResponse { removed })
	}

	/// Drops every decompressed snapshot and starts a new cache generation, then applies `plan`,
	/// then evicts `parent_id`'s keys unless the plan covered them.
	pub fn after_save(&self, plan: InvalidationPlan, parent_id: Option<TermId>) {
		self.cache.clear_decompress();
		self.evict_children(&plan.eviction);
		self.evict_children(&invalidation::post_save_eviction(
			&self.cfg.cache,
			parent_id,
			plan.parent_validated,
		));
	}

	fn evict_children(&self, eviction: &ChildrenEviction) {
		let removed = self.cache.evict_children(eviction);

		if removed > 0 {
			tracing::debug!(removed, ?eviction, "Children cache entries evicted.");
		}
	}

	/// The generation is read before the tree so a tree loaded across a write is never stored.
	async fn cached_tree(&self) -> Result<(Arc<TermTree>, u64)> {
		let generation = self.cache.generation();

		if let Some(tree) = self.cache.tree() {
			return Ok((tree, generation));
		}

		let tree = self.load_tree().await?;

		if !self.cache.store_tree(tree.clone(), generation) {
			tracing::debug!(generation, "Discarded a term tree loaded before the last write.");
		}

		Ok((tree, generation))
	}

	async fn load_tree(&self) -> Result<Arc<TermTree>> {
		let mut conn = self.db.pool.acquire().await?;
		let tree = terms::load_tree(&mut conn).await?;

		Ok(Arc::new(tree))
	}
}

fn double_option<'de, D>(deserializer: D) -> std::result::Result<Option<Option<TermId>>, D::Error>
where
	D: Deserializer<'de>,
{
	Option::<TermId>::deserialize(deserializer).map(Some)
}

fn default_true() -> bool {
	true
}

fn default_semantic_rule() -> SemanticRule {
	SemanticRule::Or
}

fn default_specification_mode() -> SpecificationMode {
	SpecificationMode::Standard
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn update_distinguishes_null_parent_from_absent_parent() {
		let absent: UpdateTermRequest =
			serde_json::from_value(serde_json::json!({ "name": "Parks" })).expect("request");
		let toplevel: UpdateTermRequest =
			serde_json::from_value(serde_json::json!({ "parent_id": null })).expect("request");
		let nested: UpdateTermRequest =
			serde_json::from_value(serde_json::json!({ "parent_id": 4 })).expect("request");

		assert_eq!(absent.parent_id, None);
		assert_eq!(toplevel.parent_id, Some(None));
		assert_eq!(nested.parent_id, Some(Some(4)));
		assert!(toplevel.into_changes().moves());
	}
}
