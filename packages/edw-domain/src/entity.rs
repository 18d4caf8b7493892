use std::{collections::HashMap, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, Result, query::EntityId};

/// Model name of the built-in kind every unknown model falls back to.
pub const BASE_ENTITY_MODEL: &str = "entity";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
	pub id: EntityId,
	pub entity_model: String,
	pub name: String,
	pub active: bool,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}

/// Base entity columns a client may order by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderField {
	Id,
	Name,
	Active,
	CreatedAt,
	UpdatedAt,
}
impl OrderField {
	pub const ALL: [Self; 5] = [Self::Id, Self::Name, Self::Active, Self::CreatedAt, Self::UpdatedAt];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Id => "id",
			Self::Name => "name",
			Self::Active => "active",
			Self::CreatedAt => "created_at",
			Self::UpdatedAt => "updated_at",
		}
	}
}
impl FromStr for OrderField {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		Self::ALL.into_iter().find(|field| field.as_str() == raw).ok_or_else(|| {
			Error::ImproperlyConfigured { message: format!("{raw} is not an orderable field.") }
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderTerm {
	pub field: OrderField,
	pub descending: bool,
}
impl OrderTerm {
	/// Parses `field` or `-field`.
	pub fn parse(raw: &str) -> Option<Self> {
		let raw = raw.trim();
		let (name, descending) = match raw.strip_prefix('-') {
			Some(name) => (name, true),
			None => (raw, false),
		};

		name.parse().ok().map(|field| Self { field, descending })
	}

	pub fn render(&self) -> String {
		if self.descending {
			format!("-{}", self.field.as_str())
		} else {
			self.field.as_str().to_string()
		}
	}
}

/// A client-facing ordering name a kind offers on top of the base fields, e.g. `newest` for
/// `-created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingMode {
	pub key: String,
	pub ordering: String,
}
impl OrderingMode {
	pub fn order_term(&self) -> Option<OrderTerm> {
		OrderTerm::parse(&self.ordering)
	}
}

/// Per-row value a kind asks the list endpoint to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryExpr {
	TermCount,
	ForwardRelationCount,
	BackwardRelationCount,
}
impl SummaryExpr {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::TermCount => "term_count",
			Self::ForwardRelationCount => "forward_relation_count",
			Self::BackwardRelationCount => "backward_relation_count",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryAnnotation {
	pub key: String,
	pub expr: SummaryExpr,
	/// Serializer field name reported in `_annotation_meta`.
	pub field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
	Count,
	Min,
	Max,
}
impl AggregateFunction {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Count => "count",
			Self::Min => "min",
			Self::Max => "max",
		}
	}
}

/// Whole-result aggregate a kind asks the list endpoint to compute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryAggregation {
	pub key: String,
	pub function: AggregateFunction,
	pub column: OrderField,
	pub field: Option<String>,
	pub name: Option<String>,
}

/// Capabilities a concrete entity type provides.
pub trait EntityKind: Send + Sync {
	fn model(&self) -> &str;

	/// `None` for kinds placed directly under the abstract entity base.
	fn parent_model(&self) -> Option<&str> {
		None
	}

	fn lookup_fields(&self) -> &[&str];

	fn entity_name(&self, entity: &Entity) -> String {
		entity.name.clone()
	}

	fn absolute_url(&self, entity: &Entity) -> String;

	fn ordering_modes(&self) -> &[OrderingMode] {
		&[]
	}

	fn summary_annotation(&self) -> &[SummaryAnnotation] {
		&[]
	}

	fn summary_aggregation(&self) -> &[SummaryAggregation] {
		&[]
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BaseEntityKind;
impl EntityKind for BaseEntityKind {
	fn model(&self) -> &str {
		BASE_ENTITY_MODEL
	}

	fn lookup_fields(&self) -> &[&str] {
		&["name"]
	}

	fn absolute_url(&self, entity: &Entity) -> String {
		format!("/entities/{}/", entity.id)
	}
}

/// Entity kinds known to the process, checked once at startup.
#[derive(Clone)]
pub struct EntityRegistry {
	kinds: HashMap<String, Arc<dyn EntityKind>>,
	base: Arc<dyn EntityKind>,
}
impl EntityRegistry {
	pub fn new() -> Self {
		Self { kinds: HashMap::new(), base: Arc::new(BaseEntityKind) }
	}

	pub fn register(&mut self, kind: Arc<dyn EntityKind>) -> Result<()> {
		let model = kind.model().trim();

		if model.is_empty() {
			return Err(misconfigured("Entity kind model must be non-empty.".to_string()));
		}
		if model == BASE_ENTITY_MODEL || self.kinds.contains_key(model) {
			return Err(misconfigured(format!("Entity kind {model} is already registered.")));
		}
		if kind.lookup_fields().is_empty() {
			return Err(misconfigured(format!(
				"Entity kind {model} must provide lookup_fields so entities can be looked up."
			)));
		}
		if let Some(parent) = kind.parent_model()
			&& !self.kinds.contains_key(parent)
		{
			return Err(misconfigured(format!(
				"Entity kind {model} names unregistered parent {parent}."
			)));
		}

		for mode in kind.ordering_modes() {
			let key = mode.key.trim();

			if key.is_empty() || key.starts_with('-') || key.parse::<OrderField>().is_ok() {
				return Err(misconfigured(format!(
					"Entity kind {model} ordering mode key {key:?} must be a new, unsigned name."
				)));
			}
			if mode.order_term().is_none() {
				return Err(misconfigured(format!(
					"Entity kind {model} ordering mode {} must reference a base field.",
					mode.ordering
				)));
			}
		}

		let mut keys = Vec::new();

		for key in kind
			.summary_annotation()
			.iter()
			.map(|annotation| annotation.key.as_str())
			.chain(kind.summary_aggregation().iter().map(|aggregation| aggregation.key.as_str()))
		{
			if key.trim().is_empty() || keys.contains(&key) {
				return Err(misconfigured(format!(
					"Entity kind {model} summary keys must be non-empty and unique."
				)));
			}

			keys.push(key);
		}

		let model = model.to_string();

		self.kinds.insert(model, kind);

		Ok(())
	}

	pub fn get(&self, model: &str) -> Option<Arc<dyn EntityKind>> {
		if model == BASE_ENTITY_MODEL {
			return Some(self.base.clone());
		}

		self.kinds.get(model).cloned()
	}

	/// Kind for `model`, falling back to the base kind when it is unknown.
	pub fn kind_for(&self, model: &str) -> Arc<dyn EntityKind> {
		self.get(model).unwrap_or_else(|| self.base.clone())
	}

	/// Most general registered ancestor of `model`, or the base kind when `model` is unknown.
	pub fn materialized(&self, model: &str) -> Arc<dyn EntityKind> {
		let Some(mut current) = self.kinds.get(model).cloned() else {
			return self.base.clone();
		};

		// Bounded by the number of registered kinds.
		for _ in 0..self.kinds.len() {
			let Some(parent) = current.parent_model().and_then(|parent| self.kinds.get(parent))
			else {
				break;
			};

			current = parent.clone();
		}

		current
	}

	pub fn models(&self) -> Vec<String> {
		let mut models: Vec<String> = self.kinds.keys().cloned().collect();

		models.push(BASE_ENTITY_MODEL.to_string());
		models.sort();

		models
	}
}
impl Default for EntityRegistry {
	fn default() -> Self {
		Self::new()
	}
}

fn misconfigured(message: String) -> Error {
	Error::ImproperlyConfigured { message }
}
