//! Schema management for the PostgreSQL storage backend.
//!
//! All collections share one `documents` table; the collection name is part
//! of the primary key. A GIN index with `jsonb_path_ops` serves the
//! containment filters produced by [`medlearn_storage::Query`].

use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::{PostgresError, Result};

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        collection  TEXT        NOT NULL,
        id          TEXT        NOT NULL,
        version     BIGINT      NOT NULL,
        body        JSONB       NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
        PRIMARY KEY (collection, id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS documents_body_idx ON documents USING GIN (body jsonb_path_ops)",
    "CREATE INDEX IF NOT EXISTS documents_order_idx ON documents (collection, created_at, id)",
    // Email uniqueness backs up the check done at registration time
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS documents_user_email_idx
        ON documents ((body->>'email'))
        WHERE collection = 'users'
    "#,
];

/// Creates the documents table and its indexes if they do not exist.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx_core::query::query(statement)
            .execute(pool)
            .await
            .map_err(|e| PostgresError::Migration(e.to_string()))?;
    }
    info!("Document schema ready");
    Ok(())
}
