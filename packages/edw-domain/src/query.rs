//! Entity query algebra.
//!
//! An [`EntityQuery`] is a conjunction of predicates. Storage renders it to SQL; [`EntityQuery::matches`]
//! evaluates the same semantics in memory.

use std::collections::HashSet;

use serde_json::Value;

use crate::{relation::RelationSpec, semantic::TermFilter, term::TermId};

pub type EntityId = i64;

/// Directed, term-typed edge between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelationEdge {
	pub from_entity_id: EntityId,
	pub to_entity_id: EntityId,
	pub term_id: TermId,
}

/// What the in-memory evaluator needs to know about one entity.
#[derive(Debug, Clone, Default)]
pub struct EntityFacts {
	pub id: EntityId,
	pub active: bool,
	pub terms: HashSet<TermId>,
	/// Edges where the entity is either endpoint.
	pub edges: Vec<RelationEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityPredicate {
	Active(bool),
	Terms(TermFilter),
	/// Forward ids: the entity is the edge source. Reverse ids: the entity is the edge target.
	Relation(RelationSpec),
	/// The entity has an edge to or from any subject.
	Subject(Vec<EntityId>),
	/// Forward ids: an edge `subject -> entity`. Reverse ids: an edge `entity -> subject`.
	SubjectRelation { subjects: Vec<EntityId>, relations: RelationSpec },
}
impl EntityPredicate {
	pub fn matches(&self, facts: &EntityFacts) -> bool {
		match self {
			Self::Active(active) => facts.active == *active,
			Self::Terms(filter) => filter.matches(&facts.terms),
			Self::Relation(spec) => facts.edges.iter().any(|edge| {
				(edge.from_entity_id == facts.id && spec.forward.contains(&edge.term_id))
					|| (edge.to_entity_id == facts.id && spec.reverse.contains(&edge.term_id))
			}),
			Self::Subject(subjects) => facts.edges.iter().any(|edge| {
				(edge.to_entity_id == facts.id && subjects.contains(&edge.from_entity_id))
					|| (edge.from_entity_id == facts.id && subjects.contains(&edge.to_entity_id))
			}),
			Self::SubjectRelation { subjects, relations } => facts.edges.iter().any(|edge| {
				let inbound = edge.to_entity_id == facts.id
					&& subjects.contains(&edge.from_entity_id)
					&& relations.forward.contains(&edge.term_id);
				let outbound = edge.from_entity_id == facts.id
					&& subjects.contains(&edge.to_entity_id)
					&& relations.reverse.contains(&edge.term_id);

				inbound || outbound
			}),
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::Active(_) => "active",
			Self::Terms(_) => "terms",
			Self::Relation(_) => "rel",
			Self::Subject(_) => "subj",
			Self::SubjectRelation { .. } => "subj_and_rel",
		}
	}

	pub fn to_value(&self) -> Value {
		match self {
			Self::Active(active) => serde_json::json!({ "active": active }),
			Self::Terms(filter) => {
				let mut terms: Vec<_> = filter.referenced_terms().into_iter().collect();

				terms.sort_unstable();

				serde_json::json!({ "terms": terms })
			},
			Self::Relation(spec) =>
				serde_json::json!({ "forward": spec.forward, "reverse": spec.reverse }),
			Self::Subject(subjects) => serde_json::json!({ "subjects": subjects }),
			Self::SubjectRelation { subjects, relations } => serde_json::json!({
				"subjects": subjects,
				"forward": relations.forward,
				"reverse": relations.reverse,
			}),
		}
	}
}

/// Conjunction of predicates; the empty query matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityQuery {
	predicates: Vec<EntityPredicate>,
}
impl EntityQuery {
	pub fn all() -> Self {
		Self::default()
	}

	pub fn predicates(&self) -> &[EntityPredicate] {
		&self.predicates
	}

	pub fn is_unfiltered(&self) -> bool {
		self.predicates.is_empty()
	}

	pub fn with(mut self, predicate: EntityPredicate) -> Self {
		self.predicates.push(predicate);

		self
	}

	pub fn active(self, active: bool) -> Self {
		self.with(EntityPredicate::Active(active))
	}

	pub fn terms(self, filter: TermFilter) -> Self {
		self.with(EntityPredicate::Terms(filter))
	}

	pub fn rel(self, relations: RelationSpec) -> Self {
		self.with(EntityPredicate::Relation(relations))
	}

	pub fn subj(self, subjects: Vec<EntityId>) -> Self {
		self.with(EntityPredicate::Subject(subjects))
	}

	pub fn subj_and_rel(self, subjects: Vec<EntityId>, relations: RelationSpec) -> Self {
		self.with(EntityPredicate::SubjectRelation { subjects, relations })
	}

	pub fn matches(&self, facts: &EntityFacts) -> bool {
		self.predicates.iter().all(|predicate| predicate.matches(facts))
	}
}
