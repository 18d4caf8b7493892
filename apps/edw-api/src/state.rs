use std::sync::Arc;

use edw_domain::entity::EntityRegistry;
use edw_service::EdwService;
use edw_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<EdwService>,
}
impl AppState {
	pub async fn new(config: edw_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		Ok(Self::from_service(EdwService::new(config, db, EntityRegistry::new())))
	}

	/// Skips connecting and schema setup; the pool connects on first query.
	pub fn lazy(config: edw_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect_lazy(&config.storage.postgres)?;

		Ok(Self::from_service(EdwService::new(config, db, EntityRegistry::new())))
	}

	pub fn from_service(service: EdwService) -> Self {
		Self { service: Arc::new(service) }
	}
}
