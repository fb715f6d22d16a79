use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod models;
mod policy;
mod routes;
mod schema;
mod services;
mod store;
#[cfg(test)]
mod testing;

use config::{AppConfig, StoreBackend};
use palaver_shared::clients::db::create_pool;
use palaver_shared::clients::storage::FileStorage;
use palaver_shared::errors::AppResult;
use palaver_shared::middleware::{init_metrics, init_tracing, SessionResolver};
use palaver_shared::types::auth::{Claims, Identity};
use store::{ChatStore, MemoryStore, PgStore};

pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub storage: FileStorage,
    pub config: AppConfig,
    pub metrics: PrometheusHandle,
}

#[axum::async_trait]
impl SessionResolver for AppState {
    fn jwt_secret(&self) -> &str {
        &self.config.jwt_secret
    }

    async fn resolve_session(&self, claims: &Claims) -> AppResult<Option<Identity>> {
        services::auth_service::resolve_session(self.store.as_ref(), claims.jti)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("palaver-chat");

    let config = AppConfig::load()?;
    let port = config.port;
    let metrics = init_metrics()?;

    let store: Arc<dyn ChatStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.db_pool_size)?;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let storage = FileStorage::new(PathBuf::from(&config.upload_dir)).await?;

    let state = Arc::new(AppState { store, storage, config, metrics });
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "palaver-chat starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
