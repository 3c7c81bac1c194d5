use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::schema::init_schema;
use super::store::{validate_batch, StoreError, VectorStore};
use super::{FunctionCard, IndexStats, StoredFunction};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

const SELECT_COLUMNS: &str = "id, file_path, name, line_start, line_end, signature, complexity_score,
     called_internals, summary, key_concepts, behavioral_profile, last_indexed, code_vector, nlp_vector";

const CODE_DIM_KEY: &str = "code_dimensions";
const NLP_DIM_KEY: &str = "nlp_dimensions";

/// SQLite-backed vector store
#[derive(Clone)]
pub struct IndexDatabase {
    pool: ConnectionPool,
}

impl IndexDatabase {
    /// Create or open a database
    pub fn new(db_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening index database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|c| c.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;"));

        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .context("Failed to create connection pool")?;

        {
            let conn = pool.get().context("Failed to get connection")?;
            init_schema(&conn).context("Failed to initialize schema")?;
        }

        Ok(Self { pool })
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    fn dimensions(conn: &Connection) -> Result<(Option<usize>, Option<usize>), StoreError> {
        let read = |key: &str| -> Result<Option<usize>, StoreError> {
            let value: Option<String> = conn
                .query_row("SELECT value FROM index_meta WHERE key = ?1", [key], |row| row.get(0))
                .optional()?;
            Ok(value.and_then(|v| v.parse().ok()))
        };
        Ok((read(CODE_DIM_KEY)?, read(NLP_DIM_KEY)?))
    }

    fn record_dimension(conn: &Connection, key: &str, dim: usize) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR IGNORE INTO index_meta (key, value) VALUES (?1, ?2)",
            params![key, dim.to_string()],
        )?;
        Ok(())
    }

    fn query_stored(&self, sql_tail: &str, param: Option<&str>) -> Result<Vec<StoredFunction>, StoreError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM functions {}", SELECT_COLUMNS, sql_tail))?;
        let rows = match param {
            Some(p) => stmt
                .query_map([p], row_to_stored)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], row_to_stored)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }
}

impl VectorStore for IndexDatabase {
    fn upsert(
        &self,
        cards: &[FunctionCard],
        code_vectors: &[Vec<f32>],
        nlp_vectors: Option<&[Vec<f32>]>,
    ) -> Result<usize, StoreError> {
        if cards.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let known = Self::dimensions(&conn)?;
        validate_batch(cards, code_vectors, nlp_vectors, known)?;

        let tx = conn.transaction()?;
        for (i, card) in cards.iter().enumerate() {
            debug!("Upserting function: {} ({})", card.name, card.id);

            let nlp_blob = nlp_vectors
                .and_then(|nlp| nlp.get(i))
                .filter(|v| !v.is_empty())
                .map(|v| embedding_to_blob(v));
            let called = serde_json::to_string(&card.called_internals)
                .map_err(|e| StoreError::Corrupt { id: card.id.clone(), reason: e.to_string() })?;
            let concepts = card
                .key_concepts
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| StoreError::Corrupt { id: card.id.clone(), reason: e.to_string() })?;

            tx.execute(
                "INSERT OR REPLACE INTO functions (
                    id, file_path, name, line_start, line_end, signature, complexity_score,
                    called_internals, summary, key_concepts, behavioral_profile, last_indexed,
                    code_vector, nlp_vector
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    card.id,
                    card.file_path,
                    card.name,
                    card.line_start as i64,
                    card.line_end as i64,
                    card.signature,
                    card.complexity_score as i64,
                    called,
                    card.summary,
                    concepts,
                    card.behavioral_profile,
                    card.last_indexed,
                    embedding_to_blob(&code_vectors[i]),
                    nlp_blob,
                ],
            )?;
        }

        if let Some(first) = code_vectors.first() {
            Self::record_dimension(&tx, CODE_DIM_KEY, first.len())?;
        }
        if let Some(first) = nlp_vectors.and_then(|nlp| nlp.iter().find(|v| !v.is_empty())) {
            Self::record_dimension(&tx, NLP_DIM_KEY, first.len())?;
        }
        tx.commit()?;

        Ok(cards.len())
    }

    fn delete_by_file(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let ids: Vec<String> = self.ids_for_file(path)?.into_iter().collect();
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM functions WHERE file_path = ?1", [path])?;
        Ok(ids)
    }

    fn delete_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in ids {
            removed += tx.execute("DELETE FROM functions WHERE id = ?1", [id])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn list_indexed_files(&self) -> Result<BTreeSet<String>, StoreError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT file_path FROM functions")?;
        let files = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(files)
    }

    fn ids_for_file(&self, path: &str) -> Result<BTreeSet<String>, StoreError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id FROM functions WHERE file_path = ?1")?;
        let ids = stmt
            .query_map([path], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    fn get(&self, id: &str) -> Result<Option<StoredFunction>, StoreError> {
        Ok(self.query_stored("WHERE id = ?1", Some(id))?.into_iter().next())
    }

    fn all(&self) -> Result<Vec<StoredFunction>, StoreError> {
        self.query_stored("ORDER BY id", None)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM functions", [])?;
        conn.execute("DELETE FROM index_meta", [])?;
        Ok(())
    }

    fn stats(&self) -> Result<IndexStats, StoreError> {
        let conn = self.get_conn()?;

        let total_functions: i64 = conn.query_row("SELECT COUNT(*) FROM functions", [], |row| row.get(0))?;
        let total_files: i64 =
            conn.query_row("SELECT COUNT(DISTINCT file_path) FROM functions", [], |row| row.get(0))?;
        let functions_with_nlp: i64 = conn.query_row(
            "SELECT COUNT(*) FROM functions WHERE nlp_vector IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        Ok(IndexStats {
            total_files: total_files as usize,
            total_functions: total_functions as usize,
            functions_with_nlp: functions_with_nlp as usize,
        })
    }
}

/// Convert an embedding to a little-endian blob
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert a little-endian blob back to an embedding
pub fn blob_to_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

fn conversion_error(column: usize, ty: Type, reason: impl Into<String>) -> rusqlite::Error {
    let reason: String = reason.into();
    rusqlite::Error::FromSqlConversionFailure(column, ty, reason.into())
}

/// Convert database row to StoredFunction
fn row_to_stored(row: &Row) -> rusqlite::Result<StoredFunction> {
    let called: String = row.get(7)?;
    let called_internals = serde_json::from_str(&called).map_err(|e| conversion_error(7, Type::Text, e.to_string()))?;

    let key_concepts = row
        .get::<_, Option<String>>(9)?
        .map(|s| serde_json::from_str::<Vec<String>>(&s))
        .transpose()
        .map_err(|e| conversion_error(9, Type::Text, e.to_string()))?;

    let code_blob: Vec<u8> = row.get(12)?;
    let code_vector = blob_to_embedding(&code_blob).ok_or_else(|| conversion_error(12, Type::Blob, "invalid f32 blob"))?;

    let nlp_vector = match row.get::<_, Option<Vec<u8>>>(13)? {
        Some(blob) => Some(blob_to_embedding(&blob).ok_or_else(|| conversion_error(13, Type::Blob, "invalid f32 blob"))?),
        None => None,
    };

    Ok(StoredFunction {
        card: FunctionCard {
            id: row.get(0)?,
            file_path: row.get(1)?,
            name: row.get(2)?,
            line_start: row.get::<_, i64>(3)? as usize,
            line_end: row.get::<_, i64>(4)? as usize,
            signature: row.get(5)?,
            complexity_score: row.get::<_, i64>(6)? as u8,
            called_internals,
            summary: row.get(8)?,
            key_concepts,
            behavioral_profile: row.get(10)?,
            last_indexed: row.get(11)?,
        },
        code_vector,
        nlp_vector,
    })
}
