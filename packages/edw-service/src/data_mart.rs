use serde_json::Value;

use edw_domain::{
	relation::{self, RelationSpec},
	term::TermId,
};
use edw_storage::{data_marts, models::DataMart};

use crate::{EdwService, Error, Result};

/// What a data mart contributes to a filter request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMartScope {
	pub id: i64,
	pub name: String,
	pub slug: String,
	pub entities_model: String,
	pub term_ids: Vec<TermId>,
	/// `<term_id><direction>` tokens, in the same syntax clients send as `rel`.
	pub relation_tokens: Vec<String>,
	pub ordering: Vec<String>,
	pub view_component: Option<String>,
}
impl DataMartScope {
	pub fn relations(&self) -> Result<RelationSpec> {
		Ok(RelationSpec::parse(&self.relation_tokens)?)
	}

	pub fn to_value(&self) -> Value {
		serde_json::json!({
			"id": self.id,
			"name": self.name,
			"slug": self.slug,
			"entities_model": self.entities_model,
			"terms": self.term_ids,
			"relations": self.relation_tokens,
			"ordering": self.ordering,
			"view_component": self.view_component,
		})
	}
}
impl From<DataMart> for DataMartScope {
	fn from(data_mart: DataMart) -> Self {
		let relation_tokens = data_mart
			.relations
			.iter()
			.map(|(term_id, direction)| relation::relation_token(*term_id, *direction))
			.collect();

		Self {
			id: data_mart.id,
			name: data_mart.name,
			slug: data_mart.slug,
			entities_model: data_mart.entities_model,
			term_ids: data_mart.term_ids,
			relation_tokens,
			ordering: data_mart.ordering,
			view_component: data_mart.view_component,
		}
	}
}

impl EdwService {
	/// Unknown and inactive data marts are both reported as not found.
	pub async fn resolve_data_mart(&self, data_mart_pk: i64) -> Result<DataMartScope> {
		let mut conn = self.db.pool.acquire().await?;
		let data_mart = data_marts::get_active_data_mart(&mut conn, data_mart_pk)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Data mart {data_mart_pk} not found.") })?;

		tracing::debug!(
			data_mart_id = data_mart.id,
			terms = data_mart.term_ids.len(),
			relations = data_mart.relations.len(),
			"Data mart resolved."
		);

		Ok(data_mart.into())
	}
}

#[cfg(test)]
mod tests {
	use edw_domain::relation::RelationDirection;

	use super::*;

	#[test]
	fn stored_relations_become_client_tokens() {
		let scope = DataMartScope::from(DataMart {
			id: 3,
			name: "Schools".to_string(),
			slug: "schools".to_string(),
			active: true,
			entities_model: "entity".to_string(),
			ordering: vec![],
			view_component: None,
			term_ids: vec![1, 2],
			relations: vec![(12, RelationDirection::Forward), (7, RelationDirection::Bidirectional)],
		});

		assert_eq!(scope.relation_tokens, vec!["12f".to_string(), "7b".to_string()]);

		let spec = scope.relations().expect("stored tokens must parse");

		assert_eq!(spec.forward, vec![12, 7]);
		assert_eq!(spec.reverse, vec![7]);
	}
}
