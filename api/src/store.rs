//! Postgres-backed collaborators for the engine.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

use modgate_core::audit::AuditRecord;
use modgate_core::settings::GuildSettings;
use modgate_engine::audit::AuditLog;
use modgate_engine::error::StoreError;
use modgate_engine::memory::MemoryStore;

/// Platform ids are stored in BIGINT columns with their bit pattern intact.
fn db_id(id: u64) -> i64 {
    id as i64
}

fn store_error(err: sqlx::Error) -> StoreError {
    StoreError::new(err.to_string())
}

#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stored settings, or defaults for a guild that never changed them.
    pub async fn load(&self, guild_id: u64) -> Result<GuildSettings, sqlx::Error> {
        let stored: Option<Json<GuildSettings>> =
            sqlx::query_scalar("SELECT settings FROM guild_settings WHERE guild_id = $1")
                .bind(db_id(guild_id))
                .fetch_optional(&self.pool)
                .await?;
        Ok(stored.map(|Json(settings)| settings).unwrap_or_default())
    }

    /// Like `load`, but a failed read degrades to defaults.
    pub async fn load_or_default(&self, guild_id: u64) -> GuildSettings {
        match self.load(guild_id).await {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(error = %err, guild_id, "failed to load guild settings, using defaults");
                GuildSettings::default()
            }
        }
    }

    /// Write `settings` only if it is newer than what is stored.
    /// Returns `false` when a concurrent update won.
    pub async fn save(&self, guild_id: u64, settings: &GuildSettings) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO guild_settings (guild_id, version, settings, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (guild_id) DO UPDATE
               SET version = EXCLUDED.version,
                   settings = EXCLUDED.settings,
                   updated_at = NOW()
             WHERE guild_settings.version < EXCLUDED.version
            "#,
        )
        .bind(db_id(guild_id))
        .bind(settings.version as i64)
        .bind(Json(settings))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

pub struct PgMemoryStore {
    pool: PgPool,
}

impl PgMemoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemoryStore for PgMemoryStore {
    async fn load(&self, actor_id: u64) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar::<_, String>("SELECT memory FROM ai_memory WHERE actor_id = $1")
            .bind(db_id(actor_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)
    }

    async fn store(&self, actor_id: u64, memory: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ai_memory (actor_id, memory, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (actor_id) DO UPDATE
               SET memory = EXCLUDED.memory, updated_at = NOW()
            "#,
        )
        .bind(db_id(actor_id))
        .bind(memory)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO moderation_audit (
                id, created_at, guild_id, channel_id, action, actor_id, target_id,
                reason, extra, request_excerpt, request_sha256, decision
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(record.created_at)
        .bind(db_id(record.guild_id))
        .bind(db_id(record.channel_id))
        .bind(&record.action)
        .bind(db_id(record.actor_id))
        .bind(record.target_id.map(db_id))
        .bind(&record.reason)
        .bind(Json(&record.extra))
        .bind(&record.request.excerpt)
        .bind(&record.request.sha256)
        .bind(&record.decision)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_keep_their_bit_pattern() {
        let id = 1_234_567_890_123_456_789u64;
        assert_eq!(db_id(id) as u64, id);
        assert_eq!(db_id(u64::MAX) as u64, u64::MAX);
    }
}
