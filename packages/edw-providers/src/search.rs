use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Builds the `more_like_this` body: similar documents to `like`, minus documents resembling the
/// configured noise terms, optionally restricted to one entity model.
pub fn more_like_this_payload(cfg: &edw_config::Search, like: &str, model: Option<&str>) -> Value {
	let mut bool_query = serde_json::json!({
		"must": [{
			"more_like_this": {
				"fields": cfg.fields,
				"like": like,
				"min_term_freq": 1,
				"min_doc_freq": 1,
				"max_query_terms": cfg.max_query_terms,
				"minimum_should_match": "0%",
			}
		}]
	});

	if !cfg.noise_terms.is_empty() {
		let mut noise = serde_json::json!({
			"fields": cfg.fields,
			"like": cfg.noise_terms.join(" "),
			"min_term_freq": 1,
			"min_doc_freq": 1,
			"max_query_terms": cfg.noise_max_query_terms,
			"minimum_should_match": "0%",
		});

		if !cfg.noise_whitelist.is_empty() {
			noise["unlike"] = Value::String(cfg.noise_whitelist.join(" "));
		}

		bool_query["must_not"] = serde_json::json!([{ "more_like_this": noise }]);
	}
	if let Some(model) = model {
		bool_query["filter"] = serde_json::json!([{ "term": { "model": model } }]);
	}

	serde_json::json!({
		"query": { "bool": bool_query },
		"explain": true,
		"_source": true,
		"size": cfg.size,
	})
}

/// Runs the similarity query and returns the raw response, which must carry `hits.hits`.
pub async fn more_like_this(
	cfg: &edw_config::Search,
	like: &str,
	model: Option<&str>,
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}/{}/_search", cfg.api_base, cfg.index);
	let body = more_like_this_payload(cfg, like, model);
	let res = client
		.post(url)
		.headers(crate::auth_headers(cfg.api_key.as_deref(), &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	validate_response(&json)?;

	tracing::debug!(
		hits = json["hits"]["hits"].as_array().map(Vec::len).unwrap_or(0),
		"Search index responded."
	);

	Ok(json)
}

fn validate_response(json: &Value) -> Result<()> {
	if json.get("hits").and_then(|hits| hits.get("hits")).and_then(Value::as_array).is_none() {
		return Err(Error::InvalidResponse {
			message: "Search response is missing hits.hits array.".to_string(),
		});
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_responses_without_hits() {
		let err = validate_response(&serde_json::json!({ "took": 3 })).expect_err("must reject");

		assert!(matches!(err, Error::InvalidResponse { .. }));
		assert!(validate_response(&serde_json::json!({ "hits": { "hits": [] } })).is_ok());
	}
}
