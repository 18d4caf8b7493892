//! Category suggestions ranked from `more_like_this` hits and their score explanations.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
	#[serde(default)]
	pub id: Option<i64>,
	#[serde(default)]
	pub name: String,
	/// A dissimilar category subtracts the hit score instead of adding it.
	#[serde(default = "default_similar")]
	pub similar: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
	pub category: Category,
	pub score: f64,
	pub words: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuggestionReport {
	pub suggestions: Vec<Suggestion>,
	/// Category payloads that could not be decoded and were left out.
	pub skipped_payloads: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CategoryKey {
	Id(i64),
	Raw(String),
}

struct Accumulator {
	category: Category,
	score: f64,
	words: BTreeSet<String>,
}

/// Aggregates per-hit category scores into a ranking.
///
/// Hits contribute to every category they carry, keyed by category id (or the raw payload when
/// the id is missing). `similar` on the output reflects the sign of the net score. The result
/// is sorted by descending score; equal scores keep the order in
/// which the categories first appeared.
pub fn analyze_suggestions(search_result: &Value) -> SuggestionReport {
	let hits = search_result
		.get("hits")
		.and_then(|hits| hits.get("hits"))
		.and_then(Value::as_array)
		.map(Vec::as_slice)
		.unwrap_or_default();
	let mut order: Vec<Accumulator> = Vec::new();
	let mut slots: HashMap<CategoryKey, usize> = HashMap::new();
	let mut skipped_payloads = 0;

	for hit in hits {
		let Some(raw_categories) = hit
			.get("_source")
			.and_then(|source| source.get("categories"))
			.and_then(Value::as_array)
			.filter(|categories| !categories.is_empty())
		else {
			continue;
		};
		let hit_score = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0);
		let words = explanation_words(hit.get("_explanation"));

		for raw in raw_categories {
			let Some((key, category)) = decode_category(raw) else {
				skipped_payloads += 1;

				continue;
			};
			let score = if category.similar { hit_score } else { -hit_score };

			match slots.get(&key) {
				Some(&slot) => {
					let entry = &mut order[slot];

					entry.score += score;
					entry.words.extend(words.iter().cloned());
				},
				None => {
					slots.insert(key, order.len());
					order.push(Accumulator { category, score, words: words.clone() });
				},
			}
		}
	}

	let mut suggestions: Vec<Suggestion> = order
		.into_iter()
		.map(|entry| Suggestion {
			category: Category { similar: entry.score >= 0.0, ..entry.category },
			score: entry.score,
			words: entry.words.into_iter().collect(),
		})
		.collect();

	suggestions.sort_by(|a, b| b.score.total_cmp(&a.score));

	SuggestionReport { suggestions, skipped_payloads }
}

/// Words named by `weight(<field>:<word> ...` descriptions in the explanation's details and their
/// immediate sub-details.
pub fn explanation_words(explanation: Option<&Value>) -> BTreeSet<String> {
	let mut words = BTreeSet::new();
	let Some(details) = explanation.and_then(|value| value.get("details")).and_then(Value::as_array)
	else {
		return words;
	};

	for detail in details {
		let nested = detail.get("details").and_then(Value::as_array).map(Vec::as_slice);

		for candidate in nested.unwrap_or_default().iter().chain(std::iter::once(detail)) {
			if let Some(word) =
				candidate.get("description").and_then(Value::as_str).and_then(weighted_word)
			{
				words.insert(word.to_string());
			}
		}
	}

	words
}

fn weighted_word(description: &str) -> Option<&str> {
	let rest = description.strip_prefix("weight(")?;
	let clause = rest.split(' ').next()?;
	let (_, word) = clause.split_once(':')?;

	if word.is_empty() { None } else { Some(word) }
}

fn decode_category(raw: &Value) -> Option<(CategoryKey, Category)> {
	let (category, raw_key) = match raw {
		Value::String(payload) => (serde_json::from_str::<Category>(payload).ok()?, payload.clone()),
		Value::Object(_) => (serde_json::from_value::<Category>(raw.clone()).ok()?, raw.to_string()),
		_ => return None,
	};
	let key = match category.id {
		Some(id) => CategoryKey::Id(id),
		None => CategoryKey::Raw(raw_key),
	};

	Some((key, category))
}

fn default_similar() -> bool {
	true
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn words_come_from_weight_descriptions_only() {
		let explanation = serde_json::json!({
			"details": [
				{
					"description": "weight(title:парк in 4) [PerFieldSimilarity], result of:",
					"details": [{ "description": "score(doc=4,freq=1.0), product of:" }]
				},
				{
					"description": "sum of:",
					"details": [{ "description": "weight(description:школа in 4)" }]
				}
			]
		});
		let words: Vec<_> = explanation_words(Some(&explanation)).into_iter().collect();

		assert_eq!(words, vec!["парк".to_string(), "школа".to_string()]);
	}

	#[test]
	fn undecodable_payloads_are_counted_and_skipped() {
		let result = serde_json::json!({
			"hits": { "hits": [
				{ "_score": 1.5, "_source": { "categories": ["{not json", "{\"id\": 3, \"name\": \"Parks\"}"] } },
				{ "_score": 9.0, "_source": { "categories": [] } },
				{ "_score": 9.0, "_source": { "categories": null } }
			]}
		});
		let report = analyze_suggestions(&result);

		assert_eq!(report.skipped_payloads, 1);
		assert_eq!(report.suggestions.len(), 1);
		assert_eq!(report.suggestions[0].category.id, Some(3));
	}

	#[test]
	fn ties_keep_first_appearance_order() {
		let result = serde_json::json!({
			"hits": { "hits": [
				{ "_score": 2.0, "_source": { "categories": ["{\"id\": 7, \"name\": \"B\"}"] } },
				{ "_score": 2.0, "_source": { "categories": ["{\"id\": 5, \"name\": \"A\"}"] } }
			]}
		});
		let ids: Vec<_> = analyze_suggestions(&result)
			.suggestions
			.iter()
			.map(|suggestion| suggestion.category.id)
			.collect();

		assert_eq!(ids, vec![Some(7), Some(5)]);
	}
}
