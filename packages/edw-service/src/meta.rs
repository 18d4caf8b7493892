//! Response metadata derived from the request, the data mart, and the entity kind.

use serde_json::{Map, Value};

use edw_domain::entity::{EntityKind, OrderTerm};

use crate::data_mart::DataMartScope;

/// Ordering chosen for a list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrdering {
	/// Columns handed to storage; storage appends the id tiebreak.
	pub terms: Vec<OrderTerm>,
	/// The accepted tokens as the client names them, reported as `_ordering`.
	pub keys: Vec<String>,
}

/// Valid client tokens win, then the data mart's ordering, then the configured default.
///
/// A token is a base field or one of the kind's ordering mode keys, optionally prefixed with `-`
/// to flip its direction. Unknown tokens are ignored.
pub fn resolve_ordering(
	requested: Option<&[String]>,
	kind: &dyn EntityKind,
	data_mart: Option<&DataMartScope>,
	default: &[String],
) -> ResolvedOrdering {
	let candidates = [
		requested.unwrap_or_default(),
		data_mart.map(|data_mart| data_mart.ordering.as_slice()).unwrap_or_default(),
		default,
	];

	for tokens in candidates {
		let resolved = accept_tokens(tokens, kind);

		if !resolved.terms.is_empty() {
			return resolved;
		}
	}

	ResolvedOrdering { terms: Vec::new(), keys: Vec::new() }
}

/// A present, non-blank override wins over the data mart's component.
pub fn view_component(
	requested: Option<&str>,
	data_mart: Option<&DataMartScope>,
) -> Option<String> {
	match requested {
		Some(requested) => Some(requested.to_string()),
		None => data_mart.and_then(|data_mart| data_mart.view_component.clone()),
	}
}

/// One entry per annotation key, or null when the kind declares none.
pub fn annotation_meta(kind: &dyn EntityKind) -> Value {
	let annotations = kind.summary_annotation();

	if annotations.is_empty() {
		return Value::Null;
	}

	let meta: Map<String, Value> = annotations
		.iter()
		.map(|annotation| {
			(annotation.key.clone(), serde_json::json!({
				"expr": annotation.expr.as_str(),
				"field": annotation.field,
			}))
		})
		.collect();

	Value::Object(meta)
}

pub fn aggregation_meta(kind: &dyn EntityKind) -> Value {
	let aggregations = kind.summary_aggregation();

	if aggregations.is_empty() {
		return Value::Null;
	}

	let meta: Map<String, Value> = aggregations
		.iter()
		.map(|aggregation| {
			(aggregation.key.clone(), serde_json::json!({
				"aggregate": format!("{}({})", aggregation.function.as_str(), aggregation.column.as_str()),
				"field": aggregation.field,
				"name": aggregation.name,
			}))
		})
		.collect();

	Value::Object(meta)
}

fn accept_tokens(tokens: &[String], kind: &dyn EntityKind) -> ResolvedOrdering {
	let mut out = ResolvedOrdering { terms: Vec::new(), keys: Vec::new() };

	for token in tokens {
		let token = token.trim();
		let Some(term) = order_term(token, kind) else {
			continue;
		};

		if out.terms.iter().any(|seen| seen.field == term.field) {
			continue;
		}

		out.terms.push(term);
		out.keys.push(token.to_string());
	}

	out
}

fn order_term(token: &str, kind: &dyn EntityKind) -> Option<OrderTerm> {
	if let Some(term) = OrderTerm::parse(token) {
		return Some(term);
	}

	let (key, flip) = match token.strip_prefix('-') {
		Some(key) => (key, true),
		None => (token, false),
	};
	let mode = kind.ordering_modes().iter().find(|mode| mode.key == key)?;
	let mut term = mode.order_term()?;

	if flip {
		term.descending = !term.descending;
	}

	Some(term)
}

#[cfg(test)]
mod tests {
	use edw_domain::entity::{
		AggregateFunction, Entity, OrderField, OrderingMode, SummaryAggregation,
	};

	use super::*;

	struct Listing {
		modes: Vec<OrderingMode>,
		aggregations: Vec<SummaryAggregation>,
	}
	impl EntityKind for Listing {
		fn model(&self) -> &str {
			"listing"
		}

		fn lookup_fields(&self) -> &[&str] {
			&["name"]
		}

		fn absolute_url(&self, entity: &Entity) -> String {
			format!("/listings/{}/", entity.id)
		}

		fn ordering_modes(&self) -> &[OrderingMode] {
			&self.modes
		}

		fn summary_aggregation(&self) -> &[SummaryAggregation] {
			&self.aggregations
		}
	}

	fn listing() -> Listing {
		Listing {
			modes: vec![OrderingMode { key: "newest".to_string(), ordering: "-created_at".to_string() }],
			aggregations: vec![SummaryAggregation {
				key: "latest".to_string(),
				function: AggregateFunction::Max,
				column: OrderField::UpdatedAt,
				field: None,
				name: Some("Latest update".to_string()),
			}],
		}
	}

	fn strings(raw: &[&str]) -> Vec<String> {
		raw.iter().map(|value| value.to_string()).collect()
	}

	#[test]
	fn client_tokens_accept_base_fields_and_mode_keys() {
		let requested = strings(&["-newest", "bogus", "name"]);
		let resolved = resolve_ordering(Some(requested.as_slice()), &listing(), None, &strings(&["id"]));

		assert_eq!(resolved.keys, strings(&["-newest", "name"]));
		assert_eq!(
			resolved.terms,
			vec![
				OrderTerm { field: OrderField::CreatedAt, descending: false },
				OrderTerm { field: OrderField::Name, descending: false },
			]
		);
	}

	#[test]
	fn invalid_client_ordering_falls_back_to_the_default() {
		let requested = strings(&["bogus"]);
		let resolved =
			resolve_ordering(Some(requested.as_slice()), &listing(), None, &strings(&["-created_at"]));

		assert_eq!(resolved.keys, strings(&["-created_at"]));
	}

	#[test]
	fn aggregation_meta_is_null_without_aggregations() {
		let kind = Listing { modes: vec![], aggregations: vec![] };

		assert_eq!(aggregation_meta(&kind), Value::Null);
		assert_eq!(
			aggregation_meta(&listing())["latest"],
			serde_json::json!({ "aggregate": "max(updated_at)", "field": null, "name": "Latest update" })
		);
	}
}
