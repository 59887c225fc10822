//! SQLiteメタデータストア
//!
//! 画像メタデータの保存・一覧・ランダム取得・削除を提供する。
//! - 書き込み: 専用の単一接続（Arc<Mutex<Connection>>）
//! - 読み取り: deadpool-sqliteによるasync接続プール

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, Utc};
use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::{Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{ImageRecord, TableName};

/// last_updateカラムの保存形式
const TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// 読み取りプールの最大接続数
const READ_POOL_SIZE: usize = 4;

/// ストアエラー
#[derive(Debug, Error)]
pub enum StoreError {
    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(String),

    /// プール取得エラー
    #[error("プールエラー: {0}")]
    Pool(String),

    /// 接続構築エラー
    #[error("接続構築エラー: {0}")]
    Build(String),

    /// 対象レコードが存在しない
    #[error("レコードが見つかりません")]
    NotFound,

    /// 行の値を解釈できない
    #[error("不正な行です: {0}")]
    CorruptRow(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<deadpool_sqlite::BuildError> for StoreError {
    fn from(err: deadpool_sqlite::BuildError) -> Self {
        StoreError::Build(err.to_string())
    }
}

impl From<deadpool_sqlite::PoolError> for StoreError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        StoreError::Pool(err.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for StoreError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// SQLiteメタデータストア
///
/// テーブル名は検証済みの`TableName`のみをSQLに埋め込む。
pub struct SqliteMetadataStore {
    /// 書き込み専用接続
    write_conn: Arc<Mutex<Connection>>,
    /// 読み取り用async接続プール
    read_pool: Pool,
    /// メタデータテーブル名
    table: TableName,
}

/// SELECTで取得した生の行
struct RawRow {
    name: String,
    size: i64,
    extension: String,
    last_update: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            size: row.get(1)?,
            extension: row.get(2)?,
            last_update: row.get(3)?,
        })
    }

    fn into_record(self) -> Result<ImageRecord, StoreError> {
        let last_update = NaiveDateTime::parse_from_str(&self.last_update, TIME_LAYOUT)
            .map_err(|e| {
                StoreError::CorruptRow(format!(
                    "name={} last_update={}: {}",
                    self.name, self.last_update, e
                ))
            })?
            .and_utc();

        Ok(ImageRecord {
            name: self.name,
            size: self.size,
            extension: self.extension,
            last_update,
        })
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_LAYOUT).to_string()
}

impl SqliteMetadataStore {
    /// データベースを開く
    ///
    /// スキーマは作成しない。起動時に`ensure_schema`を呼ぶこと。
    ///
    /// # Arguments
    /// * `db_path` - データベースファイルのパス
    /// * `table` - メタデータテーブル名
    pub async fn open(db_path: &str, table: TableName) -> Result<Self, StoreError> {
        let write_conn = Connection::open(db_path)?;
        write_conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let read_pool = Config::new(db_path)
            .builder(Runtime::Tokio1)
            .map_err(|e| StoreError::Build(e.to_string()))?
            .max_size(READ_POOL_SIZE)
            .build()?;

        Ok(Self {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            table,
        })
    }

    /// テーブル名を取得
    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// 書き込み接続上でクロージャを実行する（内部用）
    async fn with_write_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.write_conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StoreError::Database("書き込み接続のロックが破損しています".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Database(format!("タスク実行エラー: {}", e)))?
    }

    /// テーブルが存在しなければ作成する
    ///
    /// 何度呼び出しても同じ結果になる。
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                extension TEXT NOT NULL,
                last_update TEXT NOT NULL
            )",
            self.table
        );

        self.with_write_conn(move |conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })
        .await?;

        info!(table = %self.table, "メタデータテーブルを作成または確認しました");
        Ok(())
    }

    /// レコードを追加する
    ///
    /// # Returns
    /// * `Ok(id)` - ストアが採番したID
    /// * `Err(StoreError)` - エラー
    pub async fn insert(&self, record: &ImageRecord) -> Result<i64, StoreError> {
        let sql = format!(
            "INSERT INTO {} (name, size, extension, last_update) VALUES (?1, ?2, ?3, ?4)",
            self.table
        );
        let record = record.clone();

        self.with_write_conn(move |conn| {
            conn.execute(
                &sql,
                rusqlite::params![
                    &record.name,
                    record.size,
                    &record.extension,
                    format_time(&record.last_update),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// 全レコードを取得する（順序は不定）
    ///
    /// last_updateを解釈できない行は警告を出してスキップする。
    pub async fn list_all(&self) -> Result<Vec<ImageRecord>, StoreError> {
        let sql = format!(
            "SELECT name, size, extension, last_update FROM {}",
            self.table
        );
        let conn = self.read_pool.get().await?;

        let rows = conn
            .interact(move |conn| -> Result<Vec<RawRow>, StoreError> {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], RawRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await??;

        let records = rows
            .into_iter()
            .filter_map(|row| match row.into_record() {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "解釈できない行をスキップ");
                    None
                }
            })
            .collect();

        Ok(records)
    }

    /// ランダムに1件取得する
    ///
    /// # Returns
    /// * `Ok(ImageRecord)` - 取得したレコード
    /// * `Err(StoreError::NotFound)` - テーブルが空
    /// * `Err(StoreError)` - その他のエラー
    pub async fn list_random(&self) -> Result<ImageRecord, StoreError> {
        let sql = format!(
            "SELECT name, size, extension, last_update FROM {} ORDER BY RANDOM() LIMIT 1",
            self.table
        );
        let conn = self.read_pool.get().await?;

        let row = conn
            .interact(move |conn| -> Result<Option<RawRow>, StoreError> {
                Ok(conn.query_row(&sql, [], RawRow::from_row).optional()?)
            })
            .await??;

        row.ok_or(StoreError::NotFound)?.into_record()
    }

    /// 名前が一致するレコードを全て削除する
    ///
    /// # Returns
    /// * `Ok(count)` - 削除した行数（0件でもエラーにしない）
    pub async fn delete_by_name(&self, name: &str) -> Result<usize, StoreError> {
        let sql = format!("DELETE FROM {} WHERE name = ?1", self.table);
        let name = name.to_string();

        self.with_write_conn(move |conn| Ok(conn.execute(&sql, [&name])?))
            .await
    }
}
