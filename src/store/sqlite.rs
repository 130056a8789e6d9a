//! SQLite 存储实现
//!
//! 表结构在进程内只初始化一次；每个写入句柄持有自己的连接，
//! 并发写入由 SQLite 的 WAL 和忙等待机制协调。

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::store::{ExceptionRecord, RecordStore, RecordWriter, ResultRecord};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteSynchronous};
use sqlx::Connection;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const CREATE_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    request_timestamp REAL NOT NULL,
    response_time REAL NOT NULL,
    response_code INTEGER NOT NULL,
    pattern_match TEXT
)"#;

const CREATE_EXCEPTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS exceptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    request_timestamp REAL NOT NULL,
    exc_txt TEXT NOT NULL
)"#;

/// 基于 SQLite 的记录存储
pub struct SqliteStore {
    /// 数据库文件路径
    path: PathBuf,
    /// 连接参数
    options: SqliteConnectOptions,
    /// 页缓存大小（KiB）
    cache_size_kib: u32,
    /// 表结构初始化状态
    schema: OnceCell<()>,
}

impl SqliteStore {
    /// 根据存储配置创建存储实例，此时不打开任何连接
    pub fn new(config: &StoreConfig) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_seconds));

        Self {
            path: config.database_path.clone(),
            options,
            cache_size_kib: config.cache_size_kib,
            schema: OnceCell::new(),
        }
    }

    /// 打开一条新连接并应用连接级参数
    async fn connect(&self) -> Result<SqliteConnection> {
        let mut conn = SqliteConnection::connect_with(&self.options)
            .await
            .map_err(|e| StoreError::Connect(format!("{}: {}", self.path.display(), e)))?;

        // 负数表示以 KiB 为单位
        let cache_pragma = format!("PRAGMA cache_size = -{}", self.cache_size_kib);
        sqlx::query(&cache_pragma)
            .execute(&mut conn)
            .await
            .map_err(|e| StoreError::Connect(format!("设置缓存大小失败: {}", e)))?;

        Ok(conn)
    }

    /// 实际执行建表语句
    async fn create_schema(&self) -> Result<()> {
        let mut conn = self.connect().await?;

        for statement in [CREATE_RESULTS_TABLE, CREATE_EXCEPTIONS_TABLE] {
            sqlx::query(statement)
                .execute(&mut conn)
                .await
                .map_err(|e| StoreError::Schema(e.to_string()))?;
        }

        conn.close()
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;

        info!("数据库表结构已就绪: {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn init_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| self.create_schema())
            .await?;
        Ok(())
    }

    async fn open_writer(&self) -> Result<Box<dyn RecordWriter>> {
        self.init_schema().await?;
        let conn = self.connect().await?;
        debug!("打开新的数据库写入连接: {}", self.path.display());
        Ok(Box::new(SqliteWriter { conn }))
    }
}

/// 持有独占连接的写入句柄
pub struct SqliteWriter {
    conn: SqliteConnection,
}

#[async_trait]
impl RecordWriter for SqliteWriter {
    async fn insert_result(&mut self, record: &ResultRecord) -> Result<i64> {
        let outcome = sqlx::query(
            "INSERT INTO results (url, request_timestamp, response_time, response_code, pattern_match) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.url)
        .bind(record.request_timestamp)
        .bind(record.response_time)
        .bind(i64::from(record.response_code))
        .bind(record.pattern_match.as_deref())
        .execute(&mut self.conn)
        .await
        .map_err(|e| StoreError::Write {
            table: "results",
            message: e.to_string(),
        })?;

        Ok(outcome.last_insert_rowid())
    }

    async fn insert_exception(&mut self, record: &ExceptionRecord) -> Result<i64> {
        let outcome = sqlx::query(
            "INSERT INTO exceptions (url, request_timestamp, exc_txt) VALUES (?, ?, ?)",
        )
        .bind(&record.url)
        .bind(record.request_timestamp)
        .bind(&record.error_text)
        .execute(&mut self.conn)
        .await
        .map_err(|e| StoreError::Write {
            table: "exceptions",
            message: e.to_string(),
        })?;

        Ok(outcome.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProbeRecord;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store(dir: &TempDir) -> SqliteStore {
        SqliteStore::new(&StoreConfig {
            database_path: dir.path().join("monitoring.db"),
            ..Default::default()
        })
    }

    async fn count_rows(store: &SqliteStore, table: &str) -> i64 {
        let mut conn = store.connect().await.unwrap();
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&mut conn)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_schema_initialization_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = create_test_store(&dir);

        store.init_schema().await.unwrap();
        let mut writer = store.open_writer().await.unwrap();
        writer
            .insert_exception(&ExceptionRecord::new("https://example.com", 1.0, "boom"))
            .await
            .unwrap();

        // 同一实例再次初始化
        store.init_schema().await.unwrap();
        // 另一个实例对同一文件初始化
        let second = create_test_store(&dir);
        second.init_schema().await.unwrap();

        assert_eq!(count_rows(&store, "exceptions").await, 1);
        assert_eq!(count_rows(&store, "results").await, 0);
    }

    #[tokio::test]
    async fn test_insert_result_roundtrip_columns() {
        let dir = TempDir::new().unwrap();
        let store = create_test_store(&dir);
        let mut writer = store.open_writer().await.unwrap();

        let record = ResultRecord::new("https://example.com", 1_700_000_000.25, Duration::from_millis(250), 200)
            .with_pattern_match(Some("token-42".to_string()));
        let id = writer.insert_result(&record).await.unwrap();
        assert_eq!(id, 1);

        let mut conn = store.connect().await.unwrap();
        let row: (String, f64, f64, i64, Option<String>) = sqlx::query_as(
            "SELECT url, request_timestamp, response_time, response_code, pattern_match FROM results WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&mut conn)
        .await
        .unwrap();

        assert_eq!(row.0, "https://example.com");
        assert_eq!(row.1, 1_700_000_000.25);
        assert_eq!(row.2, 0.25);
        assert_eq!(row.3, 200);
        assert_eq!(row.4.as_deref(), Some("token-42"));
    }

    #[tokio::test]
    async fn test_null_pattern_match_is_stored_as_null() {
        let dir = TempDir::new().unwrap();
        let store = create_test_store(&dir);
        let mut writer = store.open_writer().await.unwrap();

        let id = writer
            .insert(&ProbeRecord::Result(ResultRecord::new(
                "https://example.com/missing",
                1.0,
                Duration::from_millis(10),
                404,
            )))
            .await
            .unwrap();

        let mut conn = store.connect().await.unwrap();
        let pattern_match: Option<String> =
            sqlx::query_scalar("SELECT pattern_match FROM results WHERE id = ?")
                .bind(id)
                .fetch_one(&mut conn)
                .await
                .unwrap();
        assert!(pattern_match.is_none());
    }

    #[tokio::test]
    async fn test_ids_increase_per_table() {
        let dir = TempDir::new().unwrap();
        let store = create_test_store(&dir);
        let mut writer = store.open_writer().await.unwrap();

        let first = writer
            .insert_exception(&ExceptionRecord::new("a", 1.0, "x"))
            .await
            .unwrap();
        let second = writer
            .insert_exception(&ExceptionRecord::new("b", 2.0, "y"))
            .await
            .unwrap();
        let result_id = writer
            .insert_result(&ResultRecord::new("c", 3.0, Duration::ZERO, 500))
            .await
            .unwrap();

        assert!(second > first);
        assert_eq!(result_id, 1);
    }

    #[tokio::test]
    async fn test_connect_error_names_database_file() {
        let dir = TempDir::new().unwrap();
        let database_path = dir.path().join("missing-dir").join("monitoring.db");
        let store = SqliteStore::new(&StoreConfig {
            database_path: database_path.clone(),
            ..Default::default()
        });

        let err = store.init_schema().await.unwrap_err();
        assert!(err.to_string().contains(&database_path.display().to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(create_test_store(&dir));
        store.init_schema().await.unwrap();

        let mut handles = Vec::new();
        for writer_id in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut writer = store.open_writer().await.unwrap();
                let mut ids = Vec::new();
                for i in 0..25 {
                    let url = format!("https://example.com/{writer_id}/{i}");
                    let id = if i % 2 == 0 {
                        writer
                            .insert_result(&ResultRecord::new(url, 1.0, Duration::ZERO, 200))
                            .await
                            .unwrap()
                    } else {
                        writer
                            .insert_exception(&ExceptionRecord::new(url, 1.0, "err"))
                            .await
                            .unwrap()
                    };
                    ids.push((i % 2 == 0, id));
                }
                ids
            }));
        }

        let mut result_ids = Vec::new();
        let mut exception_ids = Vec::new();
        for handle in handles {
            for (is_result, id) in handle.await.unwrap() {
                if is_result {
                    result_ids.push(id);
                } else {
                    exception_ids.push(id);
                }
            }
        }

        result_ids.sort_unstable();
        result_ids.dedup();
        exception_ids.sort_unstable();
        exception_ids.dedup();

        assert_eq!(result_ids.len(), 52);
        assert_eq!(exception_ids.len(), 48);
        assert_eq!(count_rows(&store, "results").await, 52);
        assert_eq!(count_rows(&store, "exceptions").await, 48);
    }
}
