//! Application state for the signing API

use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::time::Duration;

pub struct AppState {
    pub db: SqlitePool,
    /// Outbound client for the completion hook, bounded timeouts.
    pub http: reqwest::Client,
    pub service_key: Option<String>,
    pub completion_hook_url: Option<String>,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        // Get database path from env or use default
        let db_path = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            let data_dir = dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("signing-api");
            std::fs::create_dir_all(&data_dir).ok();
            format!("sqlite:{}/signing.db?mode=rwc", data_dir.display())
        });

        tracing::info!("Connecting to database: {}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_path)
            .await?;

        Self::with_pool(pool).await
    }

    /// Build state over an existing pool. Tests hand in-memory pools here.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        Self::run_migrations(&pool).await?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self {
            db: pool,
            http,
            service_key: std::env::var("SERVICE_KEY").ok(),
            completion_hook_url: std::env::var("COMPLETION_HOOK_URL").ok(),
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                file_url TEXT NOT NULL,
                file_format TEXT,
                declared_role TEXT,
                signature_status TEXT NOT NULL DEFAULT 'unsigned',
                signed_file_url TEXT,
                signer_roles_json TEXT NOT NULL DEFAULT '{}',
                fields_json TEXT NOT NULL DEFAULT '[]',
                anchors_json TEXT NOT NULL DEFAULT '{}',
                signature_token TEXT,
                signature_token_expires_at TEXT,
                agreement_id TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                path TEXT PRIMARY KEY,
                content_type TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                data BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signature_records (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                signer_name TEXT NOT NULL,
                signer_role TEXT NOT NULL,
                signer_ip TEXT,
                signer_user_agent TEXT,
                signed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Indexes for the completion hook and audit lookups
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_documents_agreement ON documents(agreement_id)
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_records_document ON signature_records(document_id)
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}

/// Get platform-specific data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}
