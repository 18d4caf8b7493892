use std::{
	collections::{HashMap, HashSet},
	str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub type TermId = i64;

/// `system_flags` bit that forbids deleting a term.
pub const DELETE_RESTRICTION: i32 = 1;

/// How the selected children of a term combine when filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticRule {
	And,
	Or,
	Xor,
}
impl SemanticRule {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::And => "and",
			Self::Or => "or",
			Self::Xor => "xor",
		}
	}
}
impl FromStr for SemanticRule {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"and" => Ok(Self::And),
			"or" => Ok(Self::Or),
			"xor" => Ok(Self::Xor),
			_ => Err(Error::InvalidSemanticRule(raw.to_string())),
		}
	}
}

/// Whether tagging on the term itself satisfies a selection of that term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecificationMode {
	/// The term or any of its descendants.
	Standard,
	/// Strict descendants only.
	Specific,
}
impl SpecificationMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Standard => "standard",
			Self::Specific => "specific",
		}
	}
}
impl FromStr for SpecificationMode {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"standard" => Ok(Self::Standard),
			"specific" => Ok(Self::Specific),
			_ => Err(Error::InvalidSpecificationMode(raw.to_string())),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
	pub id: TermId,
	pub parent_id: Option<TermId>,
	pub name: String,
	pub slug: String,
	pub position: i32,
	pub lft: i32,
	pub rght: i32,
	pub level: i32,
	pub active: bool,
	pub semantic_rule: SemanticRule,
	pub specification_mode: SpecificationMode,
	pub system_flags: i32,
}
impl Term {
	pub fn is_leaf_node(&self) -> bool {
		self.rght == self.lft + 1
	}

	pub fn delete_restricted(&self) -> bool {
		self.system_flags & DELETE_RESTRICTION != 0
	}
}

/// Where a term sits among its siblings; input to [`number_nested_set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreePlacement {
	pub id: TermId,
	pub parent_id: Option<TermId>,
	pub position: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedSetPosition {
	pub id: TermId,
	pub lft: i32,
	pub rght: i32,
	pub level: i32,
}

/// Flat arena of terms ordered by `lft`.
///
/// Descendants of a node are the contiguous run of nodes after it whose `lft` is below the
/// node's `rght`, so subtree lookups are a binary search rather than a walk.
#[derive(Debug, Clone, Default)]
pub struct TermTree {
	nodes: Vec<Term>,
	index: HashMap<TermId, usize>,
}
impl TermTree {
	pub fn new(mut terms: Vec<Term>) -> Result<Self> {
		terms.sort_by_key(|term| term.lft);

		let mut index = HashMap::with_capacity(terms.len());

		for (slot, term) in terms.iter().enumerate() {
			if term.lft >= term.rght {
				return Err(inconsistent(format!(
					"term {} has lft {} not below rght {}",
					term.id, term.lft, term.rght
				)));
			}
			if index.insert(term.id, slot).is_some() {
				return Err(inconsistent(format!("term {} appears more than once", term.id)));
			}
		}

		let mut stack: Vec<usize> = Vec::new();

		for term in &terms {
			while let Some(&top) = stack.last() {
				if terms[top].rght < term.lft {
					stack.pop();
				} else {
					break;
				}
			}

			if let Some(&top) = stack.last()
				&& term.rght >= terms[top].rght
			{
				return Err(inconsistent(format!(
					"term {} overlaps the boundaries of term {}",
					term.id, terms[top].id
				)));
			}

			let enclosing = stack.last().map(|&top| terms[top].id);

			if enclosing != term.parent_id {
				return Err(inconsistent(format!(
					"term {} has parent {:?} but its boundaries place it under {:?}",
					term.id, term.parent_id, enclosing
				)));
			}

			stack.push(index[&term.id]);
		}

		Ok(Self { nodes: terms, index })
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Term> {
		self.nodes.iter()
	}

	pub fn get(&self, id: TermId) -> Option<&Term> {
		self.index.get(&id).map(|&slot| &self.nodes[slot])
	}

	pub fn contains(&self, id: TermId) -> bool {
		self.index.contains_key(&id)
	}

	/// Ancestors from the direct parent up to the root.
	pub fn ancestors(&self, id: TermId) -> Vec<&Term> {
		let mut out = Vec::new();
		let mut cursor = self.get(id).and_then(|term| term.parent_id);

		while let Some(parent_id) = cursor {
			let Some(parent) = self.get(parent_id) else {
				break;
			};

			out.push(parent);

			cursor = parent.parent_id;
		}

		out
	}

	pub fn descendants(&self, id: TermId) -> &[Term] {
		let Some(&slot) = self.index.get(&id) else {
			return &[];
		};
		let rght = self.nodes[slot].rght;
		let tail = &self.nodes[slot + 1..];
		let end = tail.partition_point(|term| term.lft < rght);

		&tail[..end]
	}

	/// Ancestors, the term itself, and its descendants.
	pub fn family(&self, id: TermId) -> Vec<&Term> {
		let Some(term) = self.get(id) else {
			return Vec::new();
		};
		let mut out = self.ancestors(id);

		out.reverse();
		out.push(term);
		out.extend(self.descendants(id));

		out
	}

	/// A term counts as active only when it and every ancestor are active.
	pub fn is_active(&self, id: TermId) -> bool {
		match self.get(id) {
			Some(term) => term.active && self.ancestors(id).iter().all(|ancestor| ancestor.active),
			None => false,
		}
	}

	pub fn children(&self, parent_id: Option<TermId>, active_only: bool) -> Vec<&Term> {
		if let Some(parent_id) = parent_id {
			if !self.contains(parent_id) || (active_only && !self.is_active(parent_id)) {
				return Vec::new();
			}

			return self
				.descendants(parent_id)
				.iter()
				.filter(|term| term.parent_id == Some(parent_id))
				.filter(|term| !active_only || term.active)
				.collect();
		}

		self.nodes
			.iter()
			.filter(|term| term.parent_id.is_none())
			.filter(|term| !active_only || term.active)
			.collect()
	}
}

/// Assigns `lft`/`rght`/`level` to a forest. Siblings are ordered by `(position, id)`.
pub fn number_nested_set(placements: &[TreePlacement]) -> Result<Vec<NestedSetPosition>> {
	let ids: HashSet<TermId> = placements.iter().map(|placement| placement.id).collect();

	if ids.len() != placements.len() {
		return Err(inconsistent("duplicate term ids in placement list".to_string()));
	}

	let mut children: HashMap<Option<TermId>, Vec<TreePlacement>> = HashMap::new();

	for placement in placements {
		if let Some(parent_id) = placement.parent_id
			&& !ids.contains(&parent_id)
		{
			return Err(inconsistent(format!(
				"term {} references missing parent {parent_id}",
				placement.id
			)));
		}

		children.entry(placement.parent_id).or_default().push(*placement);
	}
	for siblings in children.values_mut() {
		siblings.sort_by_key(|placement| (placement.position, placement.id));
	}

	let mut out = Vec::with_capacity(placements.len());
	let mut counter = 1;

	if let Some(roots) = children.get(&None) {
		for root in roots {
			visit(root.id, 0, &children, &mut counter, &mut out);
		}
	}

	if out.len() != placements.len() {
		return Err(inconsistent("parent links contain a cycle".to_string()));
	}

	Ok(out)
}

fn visit(
	id: TermId,
	level: i32,
	children: &HashMap<Option<TermId>, Vec<TreePlacement>>,
	counter: &mut i32,
	out: &mut Vec<NestedSetPosition>,
) {
	let slot = out.len();

	out.push(NestedSetPosition { id, lft: *counter, rght: 0, level });

	*counter += 1;

	if let Some(kids) = children.get(&Some(id)) {
		for kid in kids {
			visit(kid.id, level + 1, children, counter, out);
		}
	}

	out[slot].rght = *counter;

	*counter += 1;
}

fn inconsistent(message: String) -> Error {
	Error::InconsistentTree { message }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn placement(id: TermId, parent_id: Option<TermId>, position: i32) -> TreePlacement {
		TreePlacement { id, parent_id, position }
	}

	fn term(position: &NestedSetPosition, parent_id: Option<TermId>) -> Term {
		Term {
			id: position.id,
			parent_id,
			name: format!("term-{}", position.id),
			slug: format!("term-{}", position.id),
			position: 0,
			lft: position.lft,
			rght: position.rght,
			level: position.level,
			active: true,
			semantic_rule: SemanticRule::Or,
			specification_mode: SpecificationMode::Standard,
			system_flags: 0,
		}
	}

	#[test]
	fn numbers_siblings_by_position_then_id() {
		let numbered = number_nested_set(&[
			placement(1, None, 0),
			placement(3, Some(1), 1),
			placement(2, Some(1), 1),
			placement(4, Some(1), 0),
		])
		.expect("numbering failed");
		let order: Vec<_> = numbered.iter().map(|position| position.id).collect();

		assert_eq!(order, vec![1, 4, 2, 3]);
		assert_eq!((numbered[0].lft, numbered[0].rght), (1, 8));
		assert_eq!(numbered[1].level, 1);
	}

	#[test]
	fn numbering_rejects_cycles() {
		let err = number_nested_set(&[placement(1, Some(2), 0), placement(2, Some(1), 0)])
			.expect_err("cycle must be rejected");

		assert!(err.to_string().contains("cycle"));
	}

	#[test]
	fn tree_rejects_parent_disagreeing_with_boundaries() {
		let numbered =
			number_nested_set(&[placement(1, None, 0), placement(2, Some(1), 0)]).expect("numbering");
		let terms = vec![term(&numbered[0], None), term(&numbered[1], None)];

		assert!(TermTree::new(terms).is_err());
	}

	#[test]
	fn descendants_are_a_contiguous_slice() {
		let placements = [
			placement(1, None, 0),
			placement(2, Some(1), 0),
			placement(3, Some(2), 0),
			placement(4, Some(1), 1),
			placement(5, None, 1),
		];
		let numbered = number_nested_set(&placements).expect("numbering");
		let parents: HashMap<_, _> = placements.iter().map(|p| (p.id, p.parent_id)).collect();
		let tree = TermTree::new(
			numbered.iter().map(|position| term(position, parents[&position.id])).collect(),
		)
		.expect("tree");
		let ids: Vec<_> = tree.descendants(1).iter().map(|term| term.id).collect();

		assert_eq!(ids, vec![2, 3, 4]);
		assert!(tree.descendants(5).is_empty());
		assert_eq!(tree.children(None, false).len(), 2);
		assert_eq!(
			tree.ancestors(3).iter().map(|term| term.id).collect::<Vec<_>>(),
			vec![2, 1]
		);
	}
}
