use std::collections::HashSet;

use crate::{
	snapshot::TermSnapshot,
	term::{SemanticRule, SpecificationMode, TermId, TermTree},
};

/// Predicate over an entity's tag set, compiled from a [`TermSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermFilter {
	/// Tagged with at least one of the listed terms. An empty list never matches.
	Tagged(Vec<TermId>),
	All(Vec<TermFilter>),
	Any(Vec<TermFilter>),
	ExactlyOne(Vec<TermFilter>),
}
impl TermFilter {
	/// Returns `None` for a root-only snapshot, which places no constraint on tags.
	pub fn from_snapshot(snapshot: &TermSnapshot, tree: &TermTree) -> Option<Self> {
		if snapshot.is_root_only() {
			return None;
		}

		let active_only = snapshot.key().active_only();

		Some(compile(snapshot, tree, 0, active_only))
	}

	pub fn matches(&self, tags: &HashSet<TermId>) -> bool {
		match self {
			Self::Tagged(ids) => ids.iter().any(|id| tags.contains(id)),
			Self::All(children) => children.iter().all(|child| child.matches(tags)),
			Self::Any(children) => children.iter().any(|child| child.matches(tags)),
			Self::ExactlyOne(children) =>
				children.iter().filter(|child| child.matches(tags)).count() == 1,
		}
	}

	/// Every term id referenced by a `Tagged` leaf.
	pub fn referenced_terms(&self) -> HashSet<TermId> {
		let mut out = HashSet::new();

		self.collect_terms(&mut out);

		out
	}

	fn collect_terms(&self, out: &mut HashSet<TermId>) {
		match self {
			Self::Tagged(ids) => out.extend(ids.iter().copied()),
			Self::All(children) | Self::Any(children) | Self::ExactlyOne(children) => {
				for child in children {
					child.collect_terms(out);
				}
			},
		}
	}
}

fn compile(snapshot: &TermSnapshot, tree: &TermTree, slot: usize, active_only: bool) -> TermFilter {
	let node = snapshot.node(slot);

	if node.children.is_empty() {
		let Some(term_id) = node.term_id else {
			return TermFilter::All(Vec::new());
		};

		return TermFilter::Tagged(expand_leaf(tree, term_id, node.specification_mode, active_only));
	}

	let mut children: Vec<TermFilter> = node
		.children
		.iter()
		.map(|&child| compile(snapshot, tree, child, active_only))
		.collect();

	if children.len() == 1 {
		return children.remove(0);
	}

	match node.semantic_rule {
		SemanticRule::And => TermFilter::All(children),
		SemanticRule::Or => TermFilter::Any(children),
		SemanticRule::Xor => TermFilter::ExactlyOne(children),
	}
}

fn expand_leaf(
	tree: &TermTree,
	term_id: TermId,
	mode: SpecificationMode,
	active_only: bool,
) -> Vec<TermId> {
	let mut ids = Vec::new();

	if mode == SpecificationMode::Standard {
		ids.push(term_id);
	}

	ids.extend(
		tree.descendants(term_id)
			.iter()
			.filter(|term| !active_only || tree.is_active(term.id))
			.map(|term| term.id),
	);

	ids
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		snapshot,
		term::{Term, TreePlacement},
	};

	fn tree(rows: &[(TermId, Option<TermId>, SemanticRule, SpecificationMode)]) -> TermTree {
		let placements: Vec<_> = rows
			.iter()
			.map(|&(id, parent_id, _, _)| TreePlacement { id, parent_id, position: 0 })
			.collect();
		let numbered = crate::term::number_nested_set(&placements).expect("numbering");
		let terms = numbered
			.iter()
			.map(|position| {
				let &(_, parent_id, semantic_rule, specification_mode) =
					rows.iter().find(|row| row.0 == position.id).expect("row");

				Term {
					id: position.id,
					parent_id,
					name: position.id.to_string(),
					slug: position.id.to_string(),
					position: 0,
					lft: position.lft,
					rght: position.rght,
					level: position.level,
					active: true,
					semantic_rule,
					specification_mode,
					system_flags: 0,
				}
			})
			.collect();

		TermTree::new(terms).expect("tree")
	}

	#[test]
	fn specific_leaf_is_not_satisfied_by_itself() {
		let tree = tree(&[
			(1, None, SemanticRule::And, SpecificationMode::Specific),
			(2, Some(1), SemanticRule::And, SpecificationMode::Standard),
		]);
		let snap = snapshot::decompress(&tree, &[1], false, true).expect("decompress");
		let filter = TermFilter::from_snapshot(&snap, &tree).expect("filter");

		assert_eq!(filter, TermFilter::Tagged(vec![2]));
		assert!(!filter.matches(&HashSet::from([1])));
		assert!(filter.matches(&HashSet::from([2])));
	}

	#[test]
	fn xor_requires_exactly_one_branch() {
		let tree = tree(&[
			(1, None, SemanticRule::Xor, SpecificationMode::Standard),
			(2, Some(1), SemanticRule::And, SpecificationMode::Standard),
			(3, Some(1), SemanticRule::And, SpecificationMode::Standard),
		]);
		let snap = snapshot::decompress(&tree, &[2, 3], false, true).expect("decompress");
		let filter = TermFilter::from_snapshot(&snap, &tree).expect("filter");

		assert!(filter.matches(&HashSet::from([2])));
		assert!(filter.matches(&HashSet::from([3])));
		assert!(!filter.matches(&HashSet::from([2, 3])));
		assert!(!filter.matches(&HashSet::new()));
	}

	#[test]
	fn root_only_snapshot_has_no_filter() {
		let tree = tree(&[(1, None, SemanticRule::And, SpecificationMode::Standard)]);
		let snap = snapshot::decompress(&tree, &[], false, false).expect("decompress");

		assert!(TermFilter::from_snapshot(&snap, &tree).is_none());
	}
}
