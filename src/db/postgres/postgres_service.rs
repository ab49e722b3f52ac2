use crate::db::postgres::{
    connection::PostgresConnection,
    repository::health_check_repository::{StructHealthCheckRepository, TraitHealthCheckRepository},
    repository::symbol_repository::{PgSymbolUniverse, SymbolUniverse},
};
use crate::env_config::models::app_setting::AppSettings;
use std::sync::Arc;
use tracing::{error, info};

pub struct PostgresService {
    // Operational repositories (PostgreSQL)
    pub repository_health_check: Arc<dyn TraitHealthCheckRepository + Send + Sync>,
    pub repository_symbols: Arc<dyn SymbolUniverse>,
}

impl PostgresService {
    pub async fn new(settings: &Arc<AppSettings>) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing PostgreSQL service components");

        info!("Creating PostgreSQL connection");
        let postgres_connection = match PostgresConnection::new(settings.clone()).await {
            Ok(conn) => {
                info!("PostgreSQL connection established successfully");
                Arc::new(conn)
            }
            Err(e) => {
                error!("Failed to establish PostgreSQL connection: {}", e);
                return Err(Box::new(e));
            }
        };

        info!("Initializing repositories");

        let health_check_repository = Arc::new(StructHealthCheckRepository::new(
            postgres_connection.clone(),
        )) as Arc<dyn TraitHealthCheckRepository + Send + Sync>;

        let symbol_repository = Arc::new(PgSymbolUniverse::new(
            postgres_connection.clone(),
            &settings.app_config.universe,
        )) as Arc<dyn SymbolUniverse>;

        info!("PostgreSQL service initialized successfully");
        Ok(Self {
            repository_health_check: health_check_repository,
            repository_symbols: symbol_repository,
        })
    }
}
