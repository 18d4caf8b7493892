use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub search: Search,
	pub filter: Filter,
	pub cache: Cache,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

/// External text-search index queried for `more_like_this` classification.
#[derive(Debug, Deserialize)]
pub struct Search {
	pub api_base: String,
	pub index: String,
	pub api_key: Option<String>,
	pub timeout_ms: u64,
	pub size: u32,
	/// Document fields compared by the similarity query.
	pub fields: Vec<String>,
	pub max_query_terms: u32,
	pub noise_max_query_terms: u32,
	/// Boilerplate words excluded from every similarity query.
	#[serde(default)]
	pub noise_terms: Vec<String>,
	/// Noise words that must not count against a document.
	#[serde(default)]
	pub noise_whitelist: Vec<String>,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Filter {
	/// Decompress selected terms against active terms only.
	#[serde(default = "default_active_terms_only")]
	pub active_terms_only: bool,
	pub default_limit: u32,
	pub max_limit: u32,
	#[serde(default = "default_ordering")]
	pub default_ordering: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Cache {
	/// Leading segment of every children cache key, e.g. "term".
	pub entity_type_name: String,
	/// Must contain `{parent_id}`.
	pub children_key_pattern: String,
}

fn default_active_terms_only() -> bool {
	true
}

fn default_ordering() -> Vec<String> {
	vec!["-created_at".to_string()]
}
