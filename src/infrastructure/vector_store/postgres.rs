use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{
    ports::{CollectionBackend, CollectionStatus},
    Document, DomainError, Embedding, Metadata,
};

/// `duplicate_table`, and the `pg_type` unique violation raised when two
/// sessions create the same table concurrently.
const ALREADY_EXISTS_CODES: [&str; 2] = ["42P07", "23505"];

/// pgvector table per collection: `(id, content, embedding, metadata)`.
pub struct PgVectorBackend {
    pool: PgPool,
    table: String,
}

impl PgVectorBackend {
    /// Connections are opened on first use.
    pub fn connect_lazy(url: &str, table: &str) -> Result<Self, DomainError> {
        validate_identifier(table)?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(|e| DomainError::configuration(format!("invalid database url: {e}")))?;

        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    fn create_table_sql(&self, dimension: usize) -> String {
        format!(
            r#"CREATE TABLE "{}" (
                id UUID PRIMARY KEY,
                content TEXT NOT NULL,
                embedding vector({dimension}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb
            )"#,
            self.table
        )
    }

    async fn existing_dimension(&self) -> Result<usize, DomainError> {
        let typmod: i32 = sqlx::query_scalar(
            "SELECT atttypmod FROM pg_attribute \
             WHERE attrelid = $1::text::regclass AND attname = 'embedding' AND NOT attisdropped",
        )
        .bind(format!(r#""{}""#, self.table))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::external(e.to_string()))?;

        dimension_from_typmod(&self.table, typmod)
    }
}

/// pgvector keeps the declared dimension of a `vector(n)` column as its typmod.
fn dimension_from_typmod(table: &str, typmod: i32) -> Result<usize, DomainError> {
    usize::try_from(typmod)
        .ok()
        .filter(|&dimension| dimension > 0)
        .ok_or_else(|| {
            DomainError::configuration(format!(
                "table {table} has an embedding column without a fixed dimension"
            ))
        })
}

/// Collection names are interpolated into SQL, so only plain identifiers pass.
fn validate_identifier(name: &str) -> Result<(), DomainError> {
    let mut chars = name.chars();
    let valid = name.len() <= 63
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(DomainError::configuration(format!(
            "invalid collection name for postgres: {name:?}"
        )))
    }
}

fn is_already_exists(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| ALREADY_EXISTS_CODES.contains(&code.as_ref())),
        _ => false,
    }
}

#[async_trait]
impl CollectionBackend for PgVectorBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn create_collection(&self, dimension: usize) -> Result<CollectionStatus, DomainError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        match sqlx::query(&self.create_table_sql(dimension))
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(CollectionStatus::Created),
            Err(e) if is_already_exists(&e) => Ok(CollectionStatus::AlreadyExists {
                dimension: self.existing_dimension().await?,
            }),
            Err(e) => Err(DomainError::external(e.to_string())),
        }
    }

    async fn drop_collection(&self) -> Result<(), DomainError> {
        sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{}""#, self.table))
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(())
    }

    async fn insert(&self, rows: Vec<(Document, Embedding)>) -> Result<(), DomainError> {
        let sql = format!(
            r#"INSERT INTO "{}" (id, content, embedding, metadata) VALUES ($1, $2, $3, $4)"#,
            self.table
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        for (document, embedding) in &rows {
            sqlx::query(&sql)
                .bind(Uuid::new_v4())
                .bind(&document.page_content)
                .bind(Vector::from(embedding.as_slice().to_vec()))
                .bind(Json(&document.metadata))
                .execute(&mut *tx)
                .await
                .map_err(|e| DomainError::external(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::external(e.to_string()))
    }

    async fn search(&self, query: &Embedding, k: usize) -> Result<Vec<Document>, DomainError> {
        let sql = format!(
            r#"SELECT content, metadata FROM "{}" ORDER BY embedding <=> $1 LIMIT $2"#,
            self.table
        );

        let rows = sqlx::query(&sql)
            .bind(Vector::from(query.as_slice().to_vec()))
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let content: String = row
                    .try_get("content")
                    .map_err(|e| DomainError::internal(e.to_string()))?;
                let Json(metadata): Json<Metadata> = row
                    .try_get("metadata")
                    .map_err(|e| DomainError::internal(e.to_string()))?;
                Ok(Document::new(content).with_metadata(metadata))
            })
            .collect()
    }
}
