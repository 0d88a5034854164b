use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::domain::metrics::PipelineMetrics;
use crate::infra::db::{DbOutboxStore, DbUserRepository};

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub token_ttl: chrono::Duration,
    pub metrics: Arc<dyn PipelineMetrics>,
}

impl AppState {
    pub fn user_repo(&self) -> DbUserRepository {
        DbUserRepository {
            db: self.db.clone(),
        }
    }

    pub fn outbox_store(&self) -> DbOutboxStore {
        DbOutboxStore {
            db: self.db.clone(),
        }
    }
}
