mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Cache, Config, Filter, Postgres, Search, Service, Storage};

use std::{fs, path::Path};

pub const PARENT_ID_PLACEHOLDER: &str = "{parent_id}";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("search.api_base", &cfg.search.api_base),
		("search.index", &cfg.search.index),
		("cache.entity_type_name", &cfg.cache.entity_type_name),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.search.size == 0 {
		return Err(Error::Validation {
			message: "search.size must be greater than zero.".to_string(),
		});
	}
	if cfg.search.fields.is_empty() || cfg.search.fields.iter().any(|field| field.trim().is_empty())
	{
		return Err(Error::Validation {
			message: "search.fields must be a non-empty list of field names.".to_string(),
		});
	}
	if cfg.search.max_query_terms == 0 {
		return Err(Error::Validation {
			message: "search.max_query_terms must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.noise_terms.is_empty() && cfg.search.noise_max_query_terms == 0 {
		return Err(Error::Validation {
			message: "search.noise_max_query_terms must be greater than zero when search.noise_terms is set."
				.to_string(),
		});
	}

	for (key, value) in &cfg.search.default_headers {
		if !value.is_string() {
			return Err(Error::Validation {
				message: format!("search.default_headers.{key} must be a string."),
			});
		}
	}

	if cfg.filter.default_limit == 0 {
		return Err(Error::Validation {
			message: "filter.default_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.filter.default_limit > cfg.filter.max_limit {
		return Err(Error::Validation {
			message: "filter.default_limit must not exceed filter.max_limit.".to_string(),
		});
	}
	if cfg.filter.default_ordering.iter().any(|field| field.trim_start_matches('-').is_empty()) {
		return Err(Error::Validation {
			message: "filter.default_ordering must not contain empty fields.".to_string(),
		});
	}
	if !cfg.cache.children_key_pattern.contains(PARENT_ID_PLACEHOLDER) {
		return Err(Error::Validation {
			message: format!("cache.children_key_pattern must contain {PARENT_ID_PLACEHOLDER}."),
		});
	}
	if cfg.cache.entity_type_name.contains(':') {
		return Err(Error::Validation {
			message: "cache.entity_type_name must not contain ':'.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.search.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.search.api_key = None;
	}

	cfg.search.api_base = cfg.search.api_base.trim_end_matches('/').to_string();
	cfg.search.noise_terms.retain(|term| !term.trim().is_empty());
	cfg.search.noise_whitelist.retain(|term| !term.trim().is_empty());
	cfg.cache.entity_type_name = cfg.cache.entity_type_name.trim().to_lowercase();
}
