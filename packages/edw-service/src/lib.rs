pub mod cache;
pub mod classify;
pub mod data_mart;
pub mod entities;
pub mod filter;
pub mod invalidation;
pub mod meta;
pub mod terms;

mod error;

pub use classify::{ClassifyRequest, ClassifyResponse, ClassifyResult};
pub use entities::{EntityItem, EntityListResponse};
pub use error::{Error, Result};
pub use filter::{FilterContext, FilterParams, FilterPipeline, FilterStage};
pub use terms::{
	ChildrenRequest, CreateTermRequest, DecompressRequest, DeleteTermResponse, MoveTermRequest,
	TermItem, UpdateTermRequest,
};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use edw_config::Config;
use edw_domain::entity::EntityRegistry;
use edw_providers::search;
use edw_storage::db::Db;

use crate::cache::TermCache;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Similarity search over indexed category documents.
pub trait SearchIndex
where
	Self: Send + Sync,
{
	fn more_like_this<'a>(
		&'a self,
		cfg: &'a edw_config::Search,
		like: &'a str,
		model: Option<&'a str>,
	) -> BoxFuture<'a, edw_providers::Result<Value>>;
}

pub struct EdwService {
	pub cfg: Config,
	pub db: Db,
	pub cache: TermCache,
	pub registry: EntityRegistry,
	pub search: Arc<dyn SearchIndex>,
}
impl EdwService {
	pub fn new(cfg: Config, db: Db, registry: EntityRegistry) -> Self {
		Self::with_search(cfg, db, registry, Arc::new(DefaultSearchIndex))
	}

	pub fn with_search(
		cfg: Config,
		db: Db,
		registry: EntityRegistry,
		search: Arc<dyn SearchIndex>,
	) -> Self {
		Self { cfg, db, cache: TermCache::new(), registry, search }
	}
}

struct DefaultSearchIndex;
impl SearchIndex for DefaultSearchIndex {
	fn more_like_this<'a>(
		&'a self,
		cfg: &'a edw_config::Search,
		like: &'a str,
		model: Option<&'a str>,
	) -> BoxFuture<'a, edw_providers::Result<Value>> {
		Box::pin(search::more_like_this(cfg, like, model))
	}
}
