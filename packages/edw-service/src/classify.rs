use serde::{Deserialize, Serialize};

use edw_domain::classify::{self, Category, SuggestionReport};
use edw_storage::entities;

use crate::{EdwService, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifyRequest {
	pub query: String,
	/// Restricts the search to documents of one entity model.
	#[serde(default)]
	pub model: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifyResult {
	pub category: Category,
	pub score: f64,
	pub words: Vec<String>,
	/// Set when the category id names an existing entity.
	pub entity_model: Option<String>,
	pub url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifyResponse {
	pub results: Vec<ClassifyResult>,
}

impl EdwService {
	/// Ranked category suggestions for `req.query`. A blank query ranks nothing and skips the
	/// index.
	pub async fn suggest(&self, req: &ClassifyRequest) -> Result<SuggestionReport> {
		let query = req.query.trim();

		if query.is_empty() {
			return Ok(SuggestionReport::default());
		}

		let model = req.model.as_deref().map(str::trim).filter(|model| !model.is_empty());
		let raw = self.search.more_like_this(&self.cfg.search, query, model).await?;
		let report = classify::analyze_suggestions(&raw);

		if report.skipped_payloads > 0 {
			tracing::warn!(
				skipped = report.skipped_payloads,
				"Skipped undecodable category payloads."
			);
		}

		Ok(report)
	}

	pub async fn classify(&self, req: ClassifyRequest) -> Result<ClassifyResponse> {
		let report = self.suggest(&req).await?;

		if report.suggestions.is_empty() {
			return Ok(ClassifyResponse { results: Vec::new() });
		}

		let mut conn = self.db.pool.acquire().await?;
		let mut results = Vec::with_capacity(report.suggestions.len());

		for suggestion in report.suggestions {
			let entity = match suggestion.category.id {
				Some(id) => entities::get_entity(&mut conn, id).await?,
				None => None,
			};
			let (entity_model, url) = match entity {
				Some(entity) => {
					let kind = self.registry.kind_for(&entity.entity_model);

					(Some(entity.entity_model.clone()), Some(kind.absolute_url(&entity)))
				},
				None => (None, None),
			};

			results.push(ClassifyResult {
				category: suggestion.category,
				score: suggestion.score,
				words: suggestion.words,
				entity_model,
				url,
			});
		}

		tracing::info!(results = results.len(), "Classification finished.");

		Ok(ClassifyResponse { results })
	}
}
