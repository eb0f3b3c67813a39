//! Artifact store backed by the `artifacts` table.
//!
//! The engine's file URLs are store paths like
//! `documents/{id}/original.pdf`. Paths keep their suffix so format
//! detection works on the URL alone.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

/// One stored artifact.
#[derive(Debug, Clone, FromRow)]
pub struct DbArtifact {
    pub path: String,
    pub content_type: String,
    pub sha256: String,
    pub data: Vec<u8>,
}

pub fn original_path(document_id: &str, ext: &str) -> String {
    format!("documents/{}/original.{}", document_id, ext)
}

pub fn signed_path(document_id: &str, ext: &str, millis: i64) -> String {
    format!("documents/{}/signed_{}.{}", document_id, millis, ext)
}

pub fn layout_path(document_id: &str, millis: i64) -> String {
    format!("documents/{}/layout_{}.pdf", document_id, millis)
}

/// Insert or replace the artifact at `path`. Accepts a pool or an open
/// transaction so artifact writes can share a commit with row updates.
pub async fn put<'e, E>(
    executor: E,
    path: &str,
    content_type: &str,
    data: &[u8],
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let digest = hex::encode(Sha256::digest(data));
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO artifacts (path, content_type, sha256, data, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(path)
    .bind(content_type)
    .bind(&digest)
    .bind(data)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get(db: &SqlitePool, path: &str) -> Result<Option<DbArtifact>, sqlx::Error> {
    sqlx::query_as("SELECT path, content_type, sha256, data FROM artifacts WHERE path = ?")
        .bind(path)
        .fetch_optional(db)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use pretty_assertions::assert_eq;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        AppState::with_pool(pool).await.unwrap().db
    }

    #[test]
    fn paths_carry_format_suffix() {
        assert_eq!(original_path("doc-1", "pdf"), "documents/doc-1/original.pdf");
        assert_eq!(
            signed_path("doc-1", "html", 1756137600000),
            "documents/doc-1/signed_1756137600000.html"
        );
        assert_eq!(
            layout_path("doc-1", 1756137600000),
            "documents/doc-1/layout_1756137600000.pdf"
        );
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let db = test_db().await;
        put(&db, "documents/d/original.pdf", "application/pdf", b"%PDF-1.5 test")
            .await
            .unwrap();

        let artifact = get(&db, "documents/d/original.pdf").await.unwrap().unwrap();
        assert_eq!(artifact.content_type, "application/pdf");
        assert_eq!(artifact.data, b"%PDF-1.5 test");
        assert_eq!(artifact.sha256.len(), 64);
    }

    #[tokio::test]
    async fn put_replaces_existing_path() {
        let db = test_db().await;
        put(&db, "documents/d/original.html", "text/html", b"<html>v1</html>")
            .await
            .unwrap();
        put(&db, "documents/d/original.html", "text/html", b"<html>v2</html>")
            .await
            .unwrap();

        let artifact = get(&db, "documents/d/original.html").await.unwrap().unwrap();
        assert_eq!(artifact.data, b"<html>v2</html>");
    }

    #[tokio::test]
    async fn missing_path_is_none() {
        let db = test_db().await;
        assert!(get(&db, "documents/nope/original.pdf")
            .await
            .unwrap()
            .is_none());
    }
}
