//! Request fingerprints and the SQLite-backed result cache.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use fs2::FileExt;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::model::EditionResult;
use crate::request::ComputeRequest;

// =============================================================================
// Key
// =============================================================================

pub const CACHE_KEY_KIND: &str = "generic";

/// Deterministic fingerprint of a compute request.
///
/// `description` is the human-readable canonical form, `key_hash` its blake3
/// digest. Empty parameter, filter and facet groups are left out entirely so
/// that "not given" and "given but empty" share a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericCacheKey {
    pub question_id: String,
    pub description: String,
    pub key_hash: String,
}

impl GenericCacheKey {
    pub fn new(survey_id: &str, request: &ComputeRequest) -> Result<Self, CacheError> {
        let mut fields = Map::new();
        let edition = match &request.edition_id {
            Some(id) => id.clone(),
            None => format!("allEditions({survey_id})"),
        };
        fields.insert("editionId".into(), Value::String(edition));
        fields.insert(
            "questionId".into(),
            Value::String(request.question_id.clone()),
        );
        fields.insert(
            "subField".into(),
            Value::String(request.sub_field.as_str().to_string()),
        );

        let mut parameters = serde_json::to_value(&request.parameters)
            .map_err(|e| CacheError::Serde(e.to_string()))?;
        if let Value::Object(map) = &mut parameters {
            map.remove("enableCache");
        }
        if !is_empty_value(&parameters) {
            fields.insert("parameters".into(), parameters);
        }
        if let Some(filters) = request.filters.as_ref().filter(|f| !is_empty_value(f)) {
            fields.insert("filters".into(), filters.clone());
        }
        if let Some(facet) = request.facet.as_deref().filter(|f| !f.trim().is_empty()) {
            fields.insert("facet".into(), Value::String(facet.to_string()));
        }

        let canonical = canonical_json(&Value::Object(fields));
        let description = format!("{CACHE_KEY_KIND}{canonical}");
        Ok(Self {
            question_id: request.question_id.clone(),
            key_hash: hash_text(&description),
            description,
        })
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Serialize with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Value::Object(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k.clone(), sorted(v)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &GenericCacheKey) -> Result<Option<Vec<EditionResult>>, CacheError>;
    async fn put(&self, key: &GenericCacheKey, value: &[EditionResult]) -> Result<(), CacheError>;
}

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    CREATE TABLE IF NOT EXISTS result_cache (
        key_hash    TEXT PRIMARY KEY,
        question_id TEXT NOT NULL,
        description TEXT NOT NULL,
        payload     TEXT NOT NULL,
        created_at  INTEGER NOT NULL,
        updated_at  INTEGER NOT NULL,
        hit_count   INTEGER NOT NULL DEFAULT 0
    );
";

/// Result cache in a single SQLite file. All statements run on the blocking
/// pool against one shared connection.
#[derive(Clone)]
pub struct SqliteResultCache {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteResultCache {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "opened result cache");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// `SURVEY_TALLY_CACHE_PATH`, else a file in the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os("SURVEY_TALLY_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".survey_tally_cache.sqlite"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until this process holds the cache's advisory lock file.
    pub fn lock_exclusive(&self) -> Result<CacheLock, CacheError> {
        CacheLock::acquire(lock_path(&self.path))
    }

    async fn blocking<F, R>(&self, job: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Connection) -> Result<R, CacheError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| CacheError::Poisoned)?;
            job(&conn)
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

#[async_trait]
impl ResultCache for SqliteResultCache {
    async fn get(&self, key: &GenericCacheKey) -> Result<Option<Vec<EditionResult>>, CacheError> {
        let key_hash = key.key_hash.clone();
        self.blocking(move |conn| {
            let payload: Option<String> = conn
                .query_row(
                    "SELECT payload FROM result_cache WHERE key_hash = ?1",
                    params![key_hash],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(payload) = payload else {
                return Ok(None);
            };
            let editions = decode_payload(&payload)?;
            conn.execute(
                "UPDATE result_cache SET hit_count = hit_count + 1, updated_at = ?1 \
                 WHERE key_hash = ?2",
                params![Utc::now().timestamp(), key_hash],
            )?;
            Ok(Some(editions))
        })
        .await
    }

    async fn put(&self, key: &GenericCacheKey, value: &[EditionResult]) -> Result<(), CacheError> {
        let key = key.clone();
        let payload = serde_json::to_string(value).map_err(|e| CacheError::Serde(e.to_string()))?;
        self.blocking(move |conn| {
            let now = Utc::now().timestamp();
            conn.execute(
                "INSERT INTO result_cache \
                 (key_hash, question_id, description, payload, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
                 ON CONFLICT(key_hash) DO UPDATE SET \
                 payload = excluded.payload, updated_at = excluded.updated_at",
                params![key.key_hash, key.question_id, key.description, payload, now],
            )?;
            Ok(())
        })
        .await
    }
}

fn decode_payload(payload: &str) -> Result<Vec<EditionResult>, CacheError> {
    serde_json::from_str(payload).map_err(|e| CacheError::Serde(e.to_string()))
}

// =============================================================================
// Maintenance
// =============================================================================

/// `<db>.lock`, next to the database file.
fn lock_path(db_path: &Path) -> PathBuf {
    db_path.with_extension("lock")
}

/// Advisory exclusive lock on the cache, held until dropped. The lock file is
/// never truncated.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
    _file: std::fs::File,
}

impl CacheLock {
    fn acquire(path: PathBuf) -> Result<Self, CacheError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        file.lock_exclusive()?;
        debug!(path = %path.display(), "cache lock held");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Serialize)]
pub struct CacheExportRow {
    pub key_hash: String,
    pub question_id: String,
    pub description: String,
    pub buckets: usize,
    pub created_at: i64,
    pub updated_at: i64,
    pub hit_count: i64,
}

impl CacheExportRow {
    fn from_row(row: &Row<'_>) -> Result<Self, CacheError> {
        let editions = decode_payload(&row.get::<_, String>("payload")?)?;
        Ok(Self {
            key_hash: row.get("key_hash")?,
            question_id: row.get("question_id")?,
            description: row.get("description")?,
            buckets: editions.iter().map(|e| e.buckets.len()).sum(),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            hit_count: row.get("hit_count")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CachePruneStats {
    pub deleted: usize,
    pub remaining: usize,
}

impl SqliteResultCache {
    /// One line per entry, most recently used first. Payloads are summarized
    /// by their total bucket count.
    pub async fn export_jsonl(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let path = path.as_ref().to_path_buf();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare("SELECT * FROM result_cache ORDER BY updated_at DESC")?;
            let mut rows = stmt.query([])?;
            let mut out = BufWriter::new(std::fs::File::create(path)?);
            let mut written = 0usize;
            while let Some(row) = rows.next()? {
                let record = CacheExportRow::from_row(row)?;
                serde_json::to_writer(&mut out, &record)
                    .map_err(|e| CacheError::Serde(e.to_string()))?;
                out.write_all(b"\n")?;
                written += 1;
            }
            out.flush()?;
            Ok(written)
        })
        .await
    }

    /// Drops entries unused for more than `max_age_days`, then keeps only the
    /// `max_rows` most recently used. Both steps commit together.
    pub async fn prune(
        &self,
        max_age_days: Option<u64>,
        max_rows: Option<usize>,
    ) -> Result<CachePruneStats, CacheError> {
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let mut stats = CachePruneStats::default();

            if let Some(cutoff) = max_age_days.and_then(stale_before) {
                stats.deleted += tx.execute(
                    "DELETE FROM result_cache WHERE updated_at < ?1",
                    params![cutoff],
                )?;
            }
            if let Some(keep) = max_rows {
                let keep = i64::try_from(keep).unwrap_or(i64::MAX);
                stats.deleted += tx.execute(
                    "DELETE FROM result_cache WHERE key_hash NOT IN \
                     (SELECT key_hash FROM result_cache \
                      ORDER BY updated_at DESC, key_hash LIMIT ?1)",
                    params![keep],
                )?;
            }

            let remaining: i64 =
                tx.query_row("SELECT COUNT(*) FROM result_cache", [], |row| row.get(0))?;
            stats.remaining = usize::try_from(remaining).unwrap_or(0);
            tx.commit()?;
            debug!(deleted = stats.deleted, remaining = stats.remaining, "pruned result cache");
            Ok(stats)
        })
        .await
    }
}

/// Epoch second before which an entry counts as stale; `None` when the age
/// reaches past the representable range, so nothing is stale.
fn stale_before(max_age_days: u64) -> Option<i64> {
    let age = Duration::try_days(i64::try_from(max_age_days).ok()?)?;
    Utc::now().checked_sub_signed(age).map(|t| t.timestamp())
}

pub fn hash_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}
