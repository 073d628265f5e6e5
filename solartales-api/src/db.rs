//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres and the
//! [`StoryStore`] implementation backed by it. The database is the store of
//! record; every cache in the process sits in front of it.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use solartales_core::{
    AgeGroup, GeneratedStory, HealthCheck, SpaceWeatherContext, StorageError, StoryOrigin,
    Subject, Timestamp,
};
use solartales_storage::StoryStore;
use tokio_postgres::{NoTls, Row};

use crate::error::{ApiError, ApiResult};

/// Schema applied at startup. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stories (
    id                TEXT PRIMARY KEY,
    subject           TEXT NOT NULL,
    age_group         TEXT,
    title             TEXT NOT NULL,
    body              TEXT NOT NULL,
    educational_facts JSONB NOT NULL DEFAULT '[]'::jsonb,
    context           JSONB NOT NULL,
    generated_at      TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS stories_subject_generated_at_idx
    ON stories (subject, generated_at DESC);
"#;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: SecretString,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection wait timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "solartales".to_string(),
            user: "postgres".to_string(),
            password: SecretString::from(String::new()),
            max_size: 8,
            timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Database configuration from environment variables, or `None` when
    /// `SOLARTALES_DB_HOST` is unset (stories are then kept in memory).
    ///
    /// Environment variables:
    /// - `SOLARTALES_DB_HOST`, `SOLARTALES_DB_PORT`, `SOLARTALES_DB_NAME`
    /// - `SOLARTALES_DB_USER`, `SOLARTALES_DB_PASSWORD`
    /// - `SOLARTALES_DB_POOL_SIZE` (default: 8)
    /// - `SOLARTALES_DB_TIMEOUT_SECS` (default: 5)
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SOLARTALES_DB_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())?;
        let defaults = Self::default();

        Some(Self {
            host,
            port: std::env::var("SOLARTALES_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("SOLARTALES_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("SOLARTALES_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("SOLARTALES_DB_PASSWORD")
                .map(SecretString::from)
                .unwrap_or(defaults.password),
            max_size: std::env::var("SOLARTALES_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: Duration::from_secs(
                std::env::var("SOLARTALES_DB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.expose_secret().to_string());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: self.max_size,
            timeouts: deadpool_postgres::Timeouts::wait_millis(self.timeout.as_millis() as u64),
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// POSTGRES STORY STORE
// ============================================================================

/// [`StoryStore`] over a Postgres `stories` table.
#[derive(Clone)]
pub struct PostgresStoryStore {
    pool: Pool,
}

impl PostgresStoryStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Apply [`SCHEMA`].
    pub async fn migrate(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA).await?;
        tracing::info!("Story schema ready");
        Ok(())
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn conn(&self) -> Result<deadpool_postgres::Object, StorageError> {
        self.pool.get().await.map_err(|e| StorageError::Unavailable {
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for PostgresStoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStoryStore")
            .field("pool_size", &self.pool.status().size)
            .finish()
    }
}

fn query_failed(e: impl std::fmt::Display) -> StorageError {
    StorageError::QueryFailed {
        reason: e.to_string(),
    }
}

/// Map a `stories` row back into a story record.
fn row_to_story(row: &Row) -> Result<GeneratedStory, StorageError> {
    let subject: String = row.try_get("subject").map_err(query_failed)?;
    let age_group: Option<String> = row.try_get("age_group").map_err(query_failed)?;
    let facts: JsonValue = row.try_get("educational_facts").map_err(query_failed)?;
    let context: JsonValue = row.try_get("context").map_err(query_failed)?;
    let generated_at: Timestamp = row.try_get("generated_at").map_err(query_failed)?;

    Ok(GeneratedStory {
        id: row.try_get("id").map_err(query_failed)?,
        subject: Subject::parse(&subject).map_err(query_failed)?,
        age_group: age_group
            .as_deref()
            .map(AgeGroup::from_str)
            .transpose()
            .map_err(query_failed)?,
        title: row.try_get("title").map_err(query_failed)?,
        body: row.try_get("body").map_err(query_failed)?,
        educational_facts: serde_json::from_value(facts).map_err(query_failed)?,
        context: serde_json::from_value::<SpaceWeatherContext>(context).map_err(query_failed)?,
        generated_at,
        origin: StoryOrigin::Cache,
    })
}

#[async_trait]
impl StoryStore for PostgresStoryStore {
    async fn insert(&self, story: &GeneratedStory) -> Result<(), StorageError> {
        let insert_failed = |reason: String| StorageError::InsertFailed {
            story_id: story.id.clone(),
            reason,
        };

        let facts = serde_json::to_value(&story.educational_facts)
            .map_err(|e| insert_failed(e.to_string()))?;
        let context =
            serde_json::to_value(&story.context).map_err(|e| insert_failed(e.to_string()))?;

        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO stories (id, subject, age_group, title, body, educational_facts, context, generated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &story.id,
                &story.subject.as_str(),
                &story.age_group.map(|a| a.as_str()),
                &story.title,
                &story.body,
                &facts,
                &context,
                &story.generated_at,
            ],
        )
        .await
        .map_err(|e| insert_failed(e.to_string()))?;

        Ok(())
    }

    async fn query_by_subject(
        &self,
        subject: &Subject,
        age_group: Option<AgeGroup>,
        limit: usize,
    ) -> Result<Vec<GeneratedStory>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn().await?;

        let rows = match age_group {
            Some(age_group) => {
                conn.query(
                    "SELECT * FROM stories WHERE subject = $1 AND age_group = $2 \
                     ORDER BY generated_at DESC LIMIT $3",
                    &[&subject.as_str(), &age_group.as_str(), &limit],
                )
                .await
            }
            None => {
                conn.query(
                    "SELECT * FROM stories WHERE subject = $1 ORDER BY generated_at DESC LIMIT $2",
                    &[&subject.as_str(), &limit],
                )
                .await
            }
        }
        .map_err(query_failed)?;

        rows.iter().map(row_to_story).collect()
    }

    async fn health_check(&self) -> HealthCheck {
        let start = Instant::now();
        let result = match self.conn().await {
            Ok(conn) => conn.simple_query("SELECT 1").await.map_err(query_failed),
            Err(e) => Err(e),
        };
        let elapsed = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheck::healthy("database")
                .with_response_time(elapsed)
                .with_metadata("pool_size", serde_json::json!(self.pool_size())),
            Err(e) => HealthCheck::unhealthy("database", e.to_string()).with_response_time(elapsed),
        }
    }
}
