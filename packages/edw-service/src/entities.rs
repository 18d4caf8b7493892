use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use edw_domain::{
	entity::{BASE_ENTITY_MODEL, Entity, EntityKind},
	query::{EntityId, EntityQuery},
	term::TermId,
};
use edw_storage::entities::{self, AnnotatedEntity, ListParams};

use crate::{
	EdwService, Error, Result,
	filter::{AppliedFilter, FilterContext, FilterParams, FilterPipeline},
	meta,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityItem {
	#[serde(flatten)]
	pub entity: Entity,
	pub entity_name: String,
	pub url: String,
	pub terms: Vec<TermId>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub annotations: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityListResponse {
	pub count: i64,
	/// Size of the facet universe: the data mart and client scope without the term selection.
	pub initial_count: i64,
	pub results: Vec<EntityItem>,
	pub meta: Map<String, Value>,
}

/// Owned outcome of the filter pipeline.
struct FilteredQuery {
	queryset: EntityQuery,
	initial_queryset: EntityQuery,
	initial_filter_meta: Value,
	terms_filter_meta: Value,
	subj_ids: Vec<EntityId>,
	applied: Vec<AppliedFilter>,
}

impl EdwService {
	pub async fn list_entities(&self, query: &HashMap<String, String>) -> Result<EntityListResponse> {
		let params = FilterParams::from_query(query)?;
		let data_mart = match params.data_mart_pk {
			Some(data_mart_pk) => Some(self.resolve_data_mart(data_mart_pk).await?),
			None => None,
		};
		let filtered = {
			let decompressor = self.decompressor(params.use_cached_decompress).await?;
			let mut ctx = FilterContext::new(&params, &decompressor, data_mart.as_ref())?;

			FilterPipeline::standard().run(&mut ctx)?;

			FilteredQuery {
				queryset: ctx.queryset,
				initial_queryset: ctx.initial_queryset,
				initial_filter_meta: ctx.initial_filter_meta,
				terms_filter_meta: ctx.terms_filter_meta,
				subj_ids: ctx.subj_ids,
				applied: ctx.applied,
			}
		};
		let kind = self.registry.materialized(
			data_mart.as_ref().map(|data_mart| data_mart.entities_model.as_str()).unwrap_or(BASE_ENTITY_MODEL),
		);
		let ordering = meta::resolve_ordering(
			params.ordering.as_deref(),
			kind.as_ref(),
			data_mart.as_ref(),
			&self.cfg.filter.default_ordering,
		);
		let limit = params
			.limit
			.unwrap_or(self.cfg.filter.default_limit)
			.clamp(1, self.cfg.filter.max_limit);
		let list_params = ListParams {
			ordering: ordering.terms.clone(),
			limit: i64::from(limit),
			offset: i64::from(params.offset.unwrap_or(0)),
			annotations: kind.summary_annotation().to_vec(),
		};
		let mut conn = self.db.pool.acquire().await?;
		let count = entities::count_entities(&mut conn, &filtered.queryset).await?;
		let initial_count = entities::count_entities(&mut conn, &filtered.initial_queryset).await?;
		let rows = entities::list_entities(&mut conn, &filtered.queryset, &list_params).await?;
		let aggregates =
			entities::aggregate_entities(&mut conn, &filtered.queryset, kind.summary_aggregation())
				.await?;
		let ids: Vec<EntityId> = rows.iter().map(|row| row.entity.id).collect();
		let mut terms = entities::terms_for_entities(&mut conn, &ids).await?;
		let results = rows
			.into_iter()
			.map(|row| {
				let entity_terms = terms.remove(&row.entity.id).unwrap_or_default();

				self.entity_item(row, entity_terms)
			})
			.collect();
		let mut aggregation_meta = meta::aggregation_meta(kind.as_ref());

		if let Some(object) = aggregation_meta.as_object_mut() {
			for (key, entry) in object.iter_mut() {
				entry["value"] = aggregates.get(key).cloned().unwrap_or(Value::Null);
			}
		}

		let mut response_meta = Map::new();

		response_meta.insert("_initial_filter_meta".to_string(), filtered.initial_filter_meta);
		response_meta.insert("_terms_filter_meta".to_string(), filtered.terms_filter_meta);
		response_meta.insert("_annotation_meta".to_string(), meta::annotation_meta(kind.as_ref()));
		response_meta.insert("_aggregation_meta".to_string(), aggregation_meta);
		response_meta.insert(
			"_view_component".to_string(),
			serde_json::json!(meta::view_component(params.view_component.as_deref(), data_mart.as_ref())),
		);
		response_meta.insert("_ordering".to_string(), serde_json::json!(ordering.keys));
		response_meta.insert(
			"_data_mart".to_string(),
			data_mart.as_ref().map(|data_mart| data_mart.to_value()).unwrap_or(Value::Null),
		);
		response_meta.insert("_subj_ids".to_string(), serde_json::json!(filtered.subj_ids));
		response_meta.insert("_applied_filters".to_string(), serde_json::json!(filtered.applied));

		tracing::debug!(count, initial_count, model = kind.model(), "Entities listed.");

		Ok(EntityListResponse { count, initial_count, results, meta: response_meta })
	}

	pub async fn get_entity(&self, entity_id: EntityId) -> Result<EntityItem> {
		let mut conn = self.db.pool.acquire().await?;
		let entity = entities::get_entity(&mut conn, entity_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Entity {entity_id} not found.") })?;
		let mut terms = entities::terms_for_entities(&mut conn, &[entity_id]).await?;
		let entity_terms = terms.remove(&entity_id).unwrap_or_default();

		Ok(self.entity_item(AnnotatedEntity { entity, annotations: Map::new() }, entity_terms))
	}

	fn entity_item(&self, row: AnnotatedEntity, terms: Vec<TermId>) -> EntityItem {
		let kind = self.registry.kind_for(&row.entity.entity_model);

		EntityItem {
			entity_name: kind.entity_name(&row.entity),
			url: kind.absolute_url(&row.entity),
			entity: row.entity,
			terms,
			annotations: row.annotations,
		}
	}
}
