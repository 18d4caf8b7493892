use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use edw_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let table = root
		.as_table_mut()
		.expect("Sample config must be a table.")
		.get_mut(section)
		.and_then(Value::as_table_mut)
		.expect("Sample config must include the requested section.");

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render sample config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("edw_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse test config.")
}

#[test]
fn sample_config_loads_and_normalizes() {
	let path = write_temp_config(SAMPLE_CONFIG_TOML.to_string());
	let result = edw_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Sample config must be valid.");

	assert_eq!(cfg.search.api_base, "http://127.0.0.1:9200");
	assert_eq!(cfg.search.api_key, None);
	assert_eq!(cfg.cache.entity_type_name, "term");
	assert_eq!(cfg.filter.default_ordering, vec!["-created_at".to_string()]);
	assert!(cfg.filter.active_terms_only);
}

#[test]
fn children_key_pattern_requires_parent_placeholder() {
	let payload =
		sample_toml_with("cache", "children_key_pattern", Value::String("children".to_string()));
	let path = write_temp_config(payload);
	let result = edw_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected children_key_pattern validation error.");

	assert!(
		err.to_string().contains("cache.children_key_pattern must contain {parent_id}."),
		"Unexpected error: {err}"
	);
}

#[test]
fn default_limit_must_not_exceed_max_limit() {
	let mut cfg = base_config();

	cfg.filter.default_limit = 500;

	let err = edw_config::validate(&cfg).expect_err("Expected limit validation error.");

	assert!(
		err.to_string().contains("filter.default_limit must not exceed filter.max_limit."),
		"Unexpected error: {err}"
	);
}

#[test]
fn search_fields_must_be_non_empty() {
	let mut cfg = base_config();

	cfg.search.fields.clear();

	let err = edw_config::validate(&cfg).expect_err("Expected search.fields validation error.");

	assert!(matches!(err, Error::Validation { .. }));
	assert!(err.to_string().contains("search.fields"), "Unexpected error: {err}");
}

#[test]
fn default_headers_must_be_strings() {
	let mut cfg = base_config();

	cfg.search.default_headers.insert("X-Retry".to_string(), serde_json::json!(3));

	let err = edw_config::validate(&cfg).expect_err("Expected default header validation error.");

	assert!(
		err.to_string().contains("search.default_headers.X-Retry must be a string."),
		"Unexpected error: {err}"
	);
}

#[test]
fn missing_file_reports_path() {
	let mut path = env::temp_dir();

	path.push("edw_config_test_missing.toml");

	let err = edw_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
}
