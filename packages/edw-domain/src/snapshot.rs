use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::{
	Error, Result,
	term::{SemanticRule, SpecificationMode, TermId, TermTree},
};

const ROOT_SLOT: usize = 0;

/// Cache identity of a decompressed tree: the sorted, de-duplicated input ids plus the
/// active-only flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
	term_ids: Vec<TermId>,
	active_only: bool,
}
impl SnapshotKey {
	pub fn new(term_ids: &[TermId], active_only: bool) -> Self {
		let mut term_ids = term_ids.to_vec();

		term_ids.sort_unstable();
		term_ids.dedup();

		Self { term_ids, active_only }
	}

	pub fn term_ids(&self) -> &[TermId] {
		&self.term_ids
	}

	pub fn active_only(&self) -> bool {
		self.active_only
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotNode {
	/// `None` only for the virtual root.
	pub term_id: Option<TermId>,
	pub semantic_rule: SemanticRule,
	pub specification_mode: SpecificationMode,
	pub selected: bool,
	pub children: Vec<usize>,
}

/// Pruned tree holding the selected terms and their ancestors; the "decompressed" form of a
/// term selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermSnapshot {
	key: SnapshotKey,
	nodes: Vec<SnapshotNode>,
	dropped: Vec<TermId>,
}
impl TermSnapshot {
	pub fn root_only(active_only: bool) -> Self {
		Self { key: SnapshotKey::new(&[], active_only), nodes: vec![root_node()], dropped: vec![] }
	}

	pub fn key(&self) -> &SnapshotKey {
		&self.key
	}

	pub fn root(&self) -> &SnapshotNode {
		&self.nodes[ROOT_SLOT]
	}

	pub fn node(&self, slot: usize) -> &SnapshotNode {
		&self.nodes[slot]
	}

	pub fn nodes(&self) -> &[SnapshotNode] {
		&self.nodes
	}

	pub fn is_root_only(&self) -> bool {
		self.root().children.is_empty()
	}

	/// Input ids that did not resolve and were dropped under `fix_it`.
	pub fn dropped(&self) -> &[TermId] {
		&self.dropped
	}

	pub fn term_ids(&self) -> BTreeSet<TermId> {
		self.nodes.iter().filter_map(|node| node.term_id).collect()
	}

	pub fn selected_ids(&self) -> BTreeSet<TermId> {
		self.nodes.iter().filter(|node| node.selected).filter_map(|node| node.term_id).collect()
	}

	pub fn to_value(&self) -> Value {
		let mut value = self.node_value(ROOT_SLOT);

		if let Some(object) = value.as_object_mut() {
			object.insert("active_only".to_string(), Value::Bool(self.key.active_only));
			object.insert("dropped".to_string(), serde_json::json!(self.dropped));
		}

		value
	}

	fn node_value(&self, slot: usize) -> Value {
		let node = &self.nodes[slot];
		let children: Vec<Value> = node.children.iter().map(|&child| self.node_value(child)).collect();

		serde_json::json!({
			"id": node.term_id,
			"semantic_rule": node.semantic_rule.as_str(),
			"specification_mode": node.specification_mode.as_str(),
			"selected": node.selected,
			"children": children,
		})
	}
}

/// Expands `term_ids` into the minimal subtree covering every selected term and its ancestors.
///
/// Ids that do not resolve (unknown, or inactive under `active_only`) fail the call unless
/// `fix_it` is set, in which case they are dropped and reported through
/// [`TermSnapshot::dropped`].
pub fn decompress(
	tree: &TermTree,
	term_ids: &[TermId],
	active_only: bool,
	fix_it: bool,
) -> Result<TermSnapshot> {
	let key = SnapshotKey::new(term_ids, active_only);
	let mut selected = BTreeSet::new();
	let mut dropped = Vec::new();

	for &id in key.term_ids() {
		let resolves = tree.contains(id) && (!active_only || tree.is_active(id));

		if resolves {
			selected.insert(id);
		} else if fix_it {
			dropped.push(id);
		} else {
			return Err(Error::UnknownTerm(id));
		}
	}

	let mut closure = BTreeSet::new();

	for &id in &selected {
		closure.insert(id);
		closure.extend(tree.ancestors(id).iter().map(|term| term.id));
	}

	let mut nodes = vec![root_node()];
	let mut slots: HashMap<TermId, usize> = HashMap::with_capacity(closure.len());

	// `lft` order guarantees a parent is placed before any of its children.
	for term in tree.iter().filter(|term| closure.contains(&term.id)) {
		let slot = nodes.len();
		let parent_slot =
			term.parent_id.and_then(|parent_id| slots.get(&parent_id).copied()).unwrap_or(ROOT_SLOT);

		nodes.push(SnapshotNode {
			term_id: Some(term.id),
			semantic_rule: term.semantic_rule,
			specification_mode: term.specification_mode,
			selected: selected.contains(&term.id),
			children: Vec::new(),
		});
		nodes[parent_slot].children.push(slot);
		slots.insert(term.id, slot);
	}

	Ok(TermSnapshot { key, nodes, dropped })
}

fn root_node() -> SnapshotNode {
	SnapshotNode {
		term_id: None,
		semantic_rule: SemanticRule::And,
		specification_mode: SpecificationMode::Standard,
		selected: false,
		children: Vec::new(),
	}
}
