use crate::model::{AssetRecord, CounterField, GallerySort, ImageAnalysis, SortKey, SortOrder};
use crate::{GalleriaError, Result};
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persistence for asset records and the id counter.
///
/// Records are addressed by `id` and by `path` (the object locator).
/// Every mutation of shared numeric state is a single store-level statement.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// `record.id` must already be allocated. `Conflict` on duplicate id or path.
    async fn insert(&self, record: &AssetRecord) -> Result<()>;

    async fn find_by_path(&self, path: &str) -> Result<Option<AssetRecord>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<AssetRecord>>;

    /// Returns the number of matched records.
    async fn update_path(&self, old_path: &str, new_path: &str) -> Result<usize>;

    /// Replace tags and description. Returns the number of matched records.
    async fn update_analysis(&self, path: &str, analysis: &ImageAnalysis) -> Result<usize>;

    /// Returns the number of removed records.
    async fn delete_by_path(&self, path: &str) -> Result<usize>;

    /// Atomic in-store increment. `NotFound` if no record has this id.
    async fn increment_field(&self, id: i64, field: CounterField, delta: i64) -> Result<()>;

    async fn query_by_paths(&self, paths: &[String], sort: GallerySort) -> Result<Vec<AssetRecord>>;

    /// Records with at least one tag containing `substring`, ordered by id.
    async fn query_tags_containing(
        &self,
        substring: &str,
        case_insensitive: bool,
    ) -> Result<Vec<AssetRecord>>;

    async fn list_all(&self) -> Result<Vec<AssetRecord>>;

    /// Increment the named counter, creating it on first use, and return the new value.
    async fn atomic_increment_counter(&self, counter_name: &str) -> Result<i64>;
}

const RECORD_COLUMNS: &str = "id, path, tags, description, search_count, created_at";

/// SQLite-backed metadata store. A connection is opened per call.
///
/// rusqlite is synchronous, so every call runs on tokio's blocking pool.
/// The returned future stays cancellable: a caller-side timeout fires even
/// while SQLite waits on a lock, and the abandoned statement finishes or
/// gives up after `busy_timeout` in the background.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    db_path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteMetadataStore {
    pub fn new(db_path: impl Into<PathBuf>, busy_timeout: Duration) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            db_path,
            busy_timeout,
        };
        let conn = open_conn(&store.db_path, store.busy_timeout)?;
        init_schema(&conn, &store.db_path)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        let busy_timeout = self.busy_timeout;
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path, busy_timeout)?;
            f(&conn)
        })
        .await
        .map_err(|e| GalleriaError::Internal(format!("metadata store task: {}", e)))?
    }
}

fn open_conn(db_path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

fn init_schema(conn: &Connection, db_path: &Path) -> Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!("Metadata store {:?} journal_mode={}", db_path, mode);

    conn.execute(
        "CREATE TABLE IF NOT EXISTS images (
            id INTEGER PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            tags TEXT NOT NULL DEFAULT '[]',
            description TEXT NOT NULL DEFAULT '',
            search_count INTEGER NOT NULL DEFAULT 0 CHECK (search_count >= 0),
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS counters (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn query_records<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<AssetRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, record_from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AssetRecord> {
    let tags_json: String = row.get(2)?;
    let created_at: String = row.get(5)?;

    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
        .with_timezone(&chrono::Utc);

    Ok(AssetRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        tags,
        description: row.get(3)?,
        search_count: row.get(4)?,
        created_at,
    })
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

fn order_clause(sort: GallerySort) -> &'static str {
    match (sort.key, sort.order) {
        (SortKey::Path, SortOrder::Asc) => "ORDER BY path ASC, id ASC",
        (SortKey::Path, SortOrder::Desc) => "ORDER BY path DESC, id DESC",
        (SortKey::SearchCount, SortOrder::Asc) => "ORDER BY search_count ASC, path ASC",
        (SortKey::SearchCount, SortOrder::Desc) => "ORDER BY search_count DESC, path ASC",
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert(&self, record: &AssetRecord) -> Result<()> {
        let record = record.clone();
        let tags_json = serde_json::to_string(&record.tags)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO images (id, path, tags, description, search_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.path,
                    tags_json,
                    record.description,
                    record.search_count,
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(|error| {
                if is_constraint_violation(&error) {
                    GalleriaError::Conflict(format!(
                        "record id={} path={} already exists",
                        record.id, record.path
                    ))
                } else {
                    error.into()
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<AssetRecord>> {
        let path = path.to_string();
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    &format!("SELECT {} FROM images WHERE path = ?1", RECORD_COLUMNS),
                    [path],
                    record_from_row,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<AssetRecord>> {
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    &format!("SELECT {} FROM images WHERE id = ?1", RECORD_COLUMNS),
                    [id],
                    record_from_row,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn update_path(&self, old_path: &str, new_path: &str) -> Result<usize> {
        let old_path = old_path.to_string();
        let new_path = new_path.to_string();
        self.with_conn(move |conn| {
            let matched = conn
                .execute(
                    "UPDATE images SET path = ?1 WHERE path = ?2",
                    params![new_path, old_path],
                )
                .map_err(|error| {
                    if is_constraint_violation(&error) {
                        GalleriaError::Conflict(format!("a record already uses {}", new_path))
                    } else {
                        error.into()
                    }
                })?;
            Ok(matched)
        })
        .await
    }

    async fn update_analysis(&self, path: &str, analysis: &ImageAnalysis) -> Result<usize> {
        let path = path.to_string();
        let tags_json = serde_json::to_string(&analysis.tags)?;
        let description = analysis.description.clone();
        self.with_conn(move |conn| {
            let matched = conn.execute(
                "UPDATE images SET tags = ?1, description = ?2 WHERE path = ?3",
                params![tags_json, description, path],
            )?;
            Ok(matched)
        })
        .await
    }

    async fn delete_by_path(&self, path: &str) -> Result<usize> {
        let path = path.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM images WHERE path = ?1", [path])?;
            Ok(removed)
        })
        .await
    }

    async fn increment_field(&self, id: i64, field: CounterField, delta: i64) -> Result<()> {
        if delta < 0 {
            return Err(GalleriaError::InvalidArgument(format!(
                "{} cannot decrease (delta={})",
                field.column(),
                delta
            )));
        }

        let column = field.column();
        let matched = self
            .with_conn(move |conn| {
                let matched = conn.execute(
                    &format!(
                        "UPDATE images SET {col} = {col} + ?1 WHERE id = ?2",
                        col = column
                    ),
                    params![delta, id],
                )?;
                Ok(matched)
            })
            .await?;

        if matched == 0 {
            return Err(GalleriaError::NotFound(format!("image id {}", id)));
        }
        Ok(())
    }

    async fn query_by_paths(&self, paths: &[String], sort: GallerySort) -> Result<Vec<AssetRecord>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let paths_json = serde_json::to_string(paths)?;
        let sql = format!(
            "SELECT {} FROM images
             WHERE path IN (SELECT value FROM json_each(?1))
             {}",
            RECORD_COLUMNS,
            order_clause(sort)
        );
        self.with_conn(move |conn| query_records(conn, &sql, [paths_json]))
            .await
    }

    async fn query_tags_containing(
        &self,
        substring: &str,
        case_insensitive: bool,
    ) -> Result<Vec<AssetRecord>> {
        let substring = substring.to_string();
        let predicate = if case_insensitive {
            "instr(lower(t.value), lower(?1)) > 0"
        } else {
            "instr(t.value, ?1) > 0"
        };
        let sql = format!(
            "SELECT {} FROM images
             WHERE EXISTS (SELECT 1 FROM json_each(images.tags) AS t WHERE {})
             ORDER BY id ASC",
            RECORD_COLUMNS, predicate
        );
        self.with_conn(move |conn| query_records(conn, &sql, [substring]))
            .await
    }

    async fn list_all(&self) -> Result<Vec<AssetRecord>> {
        let sql = format!("SELECT {} FROM images ORDER BY id ASC", RECORD_COLUMNS);
        self.with_conn(move |conn| query_records(conn, &sql, [])).await
    }

    async fn atomic_increment_counter(&self, counter_name: &str) -> Result<i64> {
        let counter_name = counter_name.to_string();
        self.with_conn(move |conn| {
            let value: i64 = conn.query_row(
                "INSERT INTO counters (name, value) VALUES (?1, 1)
                 ON CONFLICT(name) DO UPDATE SET value = value + 1
                 RETURNING value",
                [counter_name],
                |row| row.get(0),
            )?;
            Ok(value)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::sync::Arc;

    fn open_store(dir: &tempfile::TempDir) -> SqliteMetadataStore {
        SqliteMetadataStore::new(dir.path().join("meta.db"), Duration::from_secs(5)).unwrap()
    }

    fn record(id: i64, path: &str, tags: &[&str]) -> AssetRecord {
        AssetRecord::new(
            id,
            path,
            ImageAnalysis {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                description: format!("image {}", id),
            },
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let rec = record(1, "memory://g/a.png", &["dog"]);
        store.insert(&rec).await.unwrap();

        let by_path = store.find_by_path("memory://g/a.png").await.unwrap().unwrap();
        assert_eq!(by_path.id, 1);
        assert_eq!(by_path.tags, vec!["dog".to_string()]);
        assert_eq!(by_path.search_count, 0);

        let by_id = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(by_id.path, "memory://g/a.png");
        assert!(store.find_by_id(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_path_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.insert(&record(1, "p/a.png", &[])).await.unwrap();
        let error = store.insert(&record(2, "p/a.png", &[])).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_report_match_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.insert(&record(1, "p/a.png", &["cat"])).await.unwrap();

        assert_eq!(store.update_path("p/a.png", "p/b.png").await.unwrap(), 1);
        assert_eq!(store.update_path("p/a.png", "p/c.png").await.unwrap(), 0);

        let analysis = ImageAnalysis {
            tags: vec!["kitten".to_string()],
            description: "a kitten".to_string(),
        };
        assert_eq!(store.update_analysis("p/b.png", &analysis).await.unwrap(), 1);
        let updated = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(updated.tags, vec!["kitten".to_string()]);
        assert_eq!(updated.description, "a kitten");

        assert_eq!(store.delete_by_path("p/b.png").await.unwrap(), 1);
        assert_eq!(store.delete_by_path("p/b.png").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_increment_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.insert(&record(4, "p/a.png", &[])).await.unwrap();

        store
            .increment_field(4, CounterField::SearchCount, 1)
            .await
            .unwrap();
        store
            .increment_field(4, CounterField::SearchCount, 2)
            .await
            .unwrap();
        assert_eq!(store.find_by_id(4).await.unwrap().unwrap().search_count, 3);

        let error = store
            .increment_field(99, CounterField::SearchCount, 1)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);

        let error = store
            .increment_field(4, CounterField::SearchCount, -1)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_query_by_paths_sorting() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.insert(&record(1, "p/b.png", &[])).await.unwrap();
        store.insert(&record(2, "p/a.png", &[])).await.unwrap();
        store.insert(&record(3, "p/c.png", &[])).await.unwrap();
        store
            .increment_field(1, CounterField::SearchCount, 5)
            .await
            .unwrap();
        store
            .increment_field(3, CounterField::SearchCount, 2)
            .await
            .unwrap();

        let wanted = vec![
            "p/a.png".to_string(),
            "p/b.png".to_string(),
            "p/c.png".to_string(),
            "p/missing.png".to_string(),
        ];

        let by_path = store
            .query_by_paths(&wanted, GallerySort::default())
            .await
            .unwrap();
        let ids: Vec<i64> = by_path.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);

        let by_count = store
            .query_by_paths(
                &wanted,
                GallerySort::new(SortKey::SearchCount, SortOrder::Desc),
            )
            .await
            .unwrap();
        let ids: Vec<i64> = by_count.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);

        let subset = store
            .query_by_paths(&["p/c.png".to_string()], GallerySort::default())
            .await
            .unwrap();
        assert_eq!(subset.len(), 1);
        assert!(
            store
                .query_by_paths(&[], GallerySort::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_query_tags_substring_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store
            .insert(&record(1, "p/cake.png", &["Cake", "Dessert"]))
            .await
            .unwrap();
        store.insert(&record(2, "p/dog.png", &["dog"])).await.unwrap();

        let hits = store.query_tags_containing("cak", true).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);

        let hits = store.query_tags_containing("DESSERT", true).await.unwrap();
        assert_eq!(hits.len(), 1);

        assert!(store.query_tags_containing("cak", false).await.unwrap().is_empty());
        assert!(store.query_tags_containing("bird", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counter_starts_at_one_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir);
            assert_eq!(store.atomic_increment_counter("images").await.unwrap(), 1);
            assert_eq!(store.atomic_increment_counter("images").await.unwrap(), 2);
            assert_eq!(store.atomic_increment_counter("other").await.unwrap(), 1);
        }
        let reopened = open_store(&dir);
        assert_eq!(reopened.atomic_increment_counter("images").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_locked_database_does_not_block_caller_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMetadataStore::new(dir.path().join("meta.db"), Duration::from_secs(3))
            .unwrap();
        store.insert(&record(1, "p/a.png", &[])).await.unwrap();

        let writer = Connection::open(store.db_path()).unwrap();
        writer.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            store.increment_field(1, CounterField::SearchCount, 1),
        )
        .await;
        assert!(outcome.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));

        writer.execute_batch("ROLLBACK").unwrap();
        assert!(store.find_by_id(1).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_counter_is_unique_under_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(&dir));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.atomic_increment_counter("images").await.unwrap()
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, (1..=32).collect::<Vec<i64>>());
    }
}
