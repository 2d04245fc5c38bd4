use std::sync::Arc;

use sqlx::PgPool;

use modgate_engine::Engine;

use crate::store::PgSettingsStore;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub engine: Arc<Engine>,
    pub settings: PgSettingsStore,
    /// SHA-256 of the bearer token shared with the bridge and the CLI.
    pub api_token_hash: Arc<str>,
}
