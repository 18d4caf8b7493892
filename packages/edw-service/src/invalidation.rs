//! Children-cache invalidation for term writes.
//!
//! A write computes an [`InvalidationPlan`] from the row as it was before the change, commits,
//! then applies the plan followed by [`post_save_eviction`].

use std::collections::BTreeSet;

use edw_domain::term::{Term, TermId, TermTree};

const TOPLEVEL_SEGMENT: &str = "toplevel";
const ACTIVE_SUFFIX: &str = "active";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildrenEviction {
	Keep,
	Keys(BTreeSet<String>),
	All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
	pub eviction: ChildrenEviction,
	/// Set when the plan already covers the parent the term ends up under.
	pub parent_validated: bool,
}
impl InvalidationPlan {
	pub fn keep() -> Self {
		Self { eviction: ChildrenEviction::Keep, parent_validated: false }
	}
}

/// `<entity_type_name>:<pattern>` and its `:active` variant; the top level uses `toplevel`.
pub fn children_keys(cfg: &edw_config::Cache, parent_id: Option<TermId>) -> [String; 2] {
	let segment = match parent_id {
		Some(parent_id) =>
			cfg.children_key_pattern.replace(edw_config::PARENT_ID_PLACEHOLDER, &parent_id.to_string()),
		None => TOPLEVEL_SEGMENT.to_string(),
	};
	let key = format!("{}:{segment}", cfg.entity_type_name);
	let active = format!("{key}:{ACTIVE_SUFFIX}");

	[key, active]
}

pub fn children_key(cfg: &edw_config::Cache, parent_id: Option<TermId>, active_only: bool) -> String {
	let [all, active] = children_keys(cfg, parent_id);

	if active_only { active } else { all }
}

/// Plans the eviction for changing `original` to `new_parent_id` / `new_active`.
///
/// `tree` must reflect the state before the write.
pub fn plan_update(
	cfg: &edw_config::Cache,
	tree: &TermTree,
	original: &Term,
	new_parent_id: Option<TermId>,
	new_active: bool,
) -> InvalidationPlan {
	let parent_changed = original.parent_id != new_parent_id;
	let active_changed = original.active != new_active;

	match (parent_changed, active_changed) {
		(true, true) => InvalidationPlan { eviction: ChildrenEviction::All, parent_validated: true },
		(true, false) => InvalidationPlan {
			eviction: ChildrenEviction::Keys(collect_keys(cfg, [original.parent_id])),
			parent_validated: false,
		},
		(false, true) => {
			let mut parents: Vec<Option<TermId>> = if new_active {
				tree.family(original.id)
					.into_iter()
					.filter(|term| !term.is_leaf_node())
					.map(|term| Some(term.id))
					.collect()
			} else {
				std::iter::once(original)
					.chain(tree.descendants(original.id))
					.filter(|term| !term.is_leaf_node())
					.map(|term| Some(term.id))
					.collect()
			};

			parents.push(if new_active { None } else { original.parent_id });

			InvalidationPlan {
				eviction: ChildrenEviction::Keys(collect_keys(cfg, parents)),
				parent_validated: true,
			}
		},
		(false, false) => InvalidationPlan::keep(),
	}
}

/// Keys of every removed term; the parent is left to the post-save eviction.
pub fn plan_delete(cfg: &edw_config::Cache, removed: &[TermId]) -> InvalidationPlan {
	InvalidationPlan {
		eviction: ChildrenEviction::Keys(collect_keys(cfg, removed.iter().copied().map(Some))),
		parent_validated: false,
	}
}

/// Keys evicted once a save lands under `parent_id`, unless the plan already covered them.
pub fn post_save_eviction(
	cfg: &edw_config::Cache,
	parent_id: Option<TermId>,
	parent_validated: bool,
) -> ChildrenEviction {
	if parent_validated {
		return ChildrenEviction::Keep;
	}

	ChildrenEviction::Keys(collect_keys(cfg, [parent_id]))
}

fn collect_keys<I>(cfg: &edw_config::Cache, parents: I) -> BTreeSet<String>
where
	I: IntoIterator<Item = Option<TermId>>,
{
	parents.into_iter().flat_map(|parent_id| children_keys(cfg, parent_id)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cache_cfg() -> edw_config::Cache {
		edw_config::Cache {
			entity_type_name: "term".to_string(),
			children_key_pattern: "children_for_{parent_id}".to_string(),
		}
	}

	#[test]
	fn keys_follow_the_namespace() {
		let cfg = cache_cfg();

		assert_eq!(
			children_keys(&cfg, Some(7)),
			["term:children_for_7".to_string(), "term:children_for_7:active".to_string()]
		);
		assert_eq!(children_key(&cfg, None, true), "term:toplevel:active");
	}

	#[test]
	fn deletion_evicts_the_removed_subtree() {
		let plan = plan_delete(&cache_cfg(), &[4, 6]);

		assert!(!plan.parent_validated);
		assert_eq!(
			plan.eviction,
			ChildrenEviction::Keys(BTreeSet::from([
				"term:children_for_4".to_string(),
				"term:children_for_4:active".to_string(),
				"term:children_for_6".to_string(),
				"term:children_for_6:active".to_string(),
			]))
		);
	}

	#[test]
	fn validated_plans_skip_the_post_save_eviction() {
		assert_eq!(post_save_eviction(&cache_cfg(), Some(3), true), ChildrenEviction::Keep);
		assert_eq!(
			post_save_eviction(&cache_cfg(), None, false),
			ChildrenEviction::Keys(BTreeSet::from([
				"term:toplevel".to_string(),
				"term:toplevel:active".to_string(),
			]))
		);
	}
}
