//! `DocumentStore` implementation on a single JSONB table.

use async_trait::async_trait;
use medlearn_storage::{DocumentStore, Page, Query, StorageError, StoredDocument};
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::instrument;

use crate::config::PostgresConfig;
use crate::error::map_query_error;
use crate::pool::create_pool;
use crate::schema::ensure_schema;

type DocumentTuple = (String, String, i64, Value, OffsetDateTime, OffsetDateTime);

fn from_tuple(row: DocumentTuple) -> StoredDocument {
    StoredDocument {
        collection: row.0,
        id: row.1,
        version: row.2.max(0) as u64,
        body: row.3,
        created_at: row.4,
        updated_at: row.5,
    }
}

/// PostgreSQL document store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects, and creates the schema when `run_migrations` is set.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = create_pool(&config).await?;
        if config.run_migrations {
            ensure_schema(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Wraps an existing pool. The schema must already exist.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    #[instrument(skip(self, body))]
    async fn insert(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<StoredDocument, StorageError> {
        let row: DocumentTuple = query_as(
            r#"
            INSERT INTO documents (collection, id, version, body)
            VALUES ($1, $2, 1, $3)
            RETURNING collection, id, version, body, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(body)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_query_error(e, collection, id))?;

        Ok(from_tuple(row))
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StorageError> {
        let row: Option<DocumentTuple> = query_as(
            r#"
            SELECT collection, id, version, body, created_at, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_query_error(e, collection, id))?;

        Ok(row.map(from_tuple))
    }

    #[instrument(skip(self, body))]
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> Result<StoredDocument, StorageError> {
        let expected = expected_version.map(|v| v as i64);
        let row: Option<DocumentTuple> = query_as(
            r#"
            UPDATE documents
            SET body = $3, version = version + 1, updated_at = clock_timestamp()
            WHERE collection = $1 AND id = $2
              AND ($4::BIGINT IS NULL OR version = $4)
            RETURNING collection, id, version, body, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(body)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_query_error(e, collection, id))?;

        if let Some(row) = row {
            return Ok(from_tuple(row));
        }

        // Nothing updated: either missing or a stale version
        let current: Option<i64> =
            query_scalar("SELECT version FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_query_error(e, collection, id))?;

        match (current, expected_version) {
            (Some(actual), Some(expected)) => {
                Err(StorageError::version_conflict(expected, actual as u64))
            }
            _ => Err(StorageError::not_found(collection, id)),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StorageError> {
        let result = query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_query_error(e, collection, id))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(collection, id));
        }
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        q: &Query,
    ) -> Result<Page<StoredDocument>, StorageError> {
        let direction = match &q.sort {
            Some(sort) if sort.descending => "DESC",
            _ => "ASC",
        };
        // An empty key yields NULL for every row, leaving the default order
        let sort_field = q.sort.as_ref().map(|s| s.field.as_str()).unwrap_or("");
        let sql = format!(
            r#"
            SELECT collection, id, version, body, created_at, updated_at
            FROM documents
            WHERE collection = $1 AND body @> $2
            ORDER BY body -> $3 {direction}, created_at ASC, id ASC
            LIMIT $4 OFFSET $5
            "#
        );

        let rows: Vec<DocumentTuple> = query_as(&sql)
            .bind(collection)
            .bind(q.filter_object())
            .bind(sort_field)
            .bind(q.effective_limit() as i64)
            .bind(q.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_query_error(e, collection, ""))?;

        let total = self.count(collection, q).await?;

        Ok(Page {
            items: rows.into_iter().map(from_tuple).collect(),
            total,
        })
    }

    async fn count(&self, collection: &str, q: &Query) -> Result<u64, StorageError> {
        let n: i64 =
            query_scalar("SELECT COUNT(*) FROM documents WHERE collection = $1 AND body @> $2")
                .bind(collection)
                .bind(q.filter_object())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_query_error(e, collection, ""))?;
        Ok(n.max(0) as u64)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::connection_error(e.to_string()))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
