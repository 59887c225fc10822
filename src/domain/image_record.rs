//! 画像メタデータのドメインモデル
//!
//! アップロードされた画像1件分のメタデータと、
//! メタデータテーブル名の検証済み識別子を定義する。

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// テーブル名の最大長
const MAX_TABLE_NAME_LEN: usize = 64;

/// 画像メタデータ
///
/// `name`は業務上のキーだが一意制約はない（同名レコードが複数存在しうる）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// オブジェクトキー兼ファイル名
    pub name: String,
    /// サイズ（バイト）
    pub size: i64,
    /// 拡張子
    pub extension: String,
    /// 最終更新日時
    pub last_update: DateTime<Utc>,
}

impl ImageRecord {
    /// アップロードされたファイルからレコードを作成
    ///
    /// 拡張子はファイル名から導出する。
    /// 日時はストアの保存精度に合わせて秒単位に切り捨てる。
    pub fn new_upload(name: impl Into<String>, size: i64, now: DateTime<Utc>) -> Self {
        let name = name.into();
        let extension = file_extension(&name).to_string();
        Self {
            name,
            size,
            extension,
            last_update: now.trunc_subsecs(0),
        }
    }

    /// キューに送信するイベント本文（インデント付きJSON）を生成
    pub fn to_event_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// ファイル名の最後の`.`以降を拡張子として返す
///
/// `.`を含まない場合はファイル名全体を返す。
pub fn file_extension(filename: &str) -> &str {
    filename.rsplit('.').next().unwrap_or(filename)
}

/// テーブル名エラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableNameError {
    /// 空文字列
    #[error("テーブル名が空です")]
    Empty,

    /// 長すぎる
    #[error("テーブル名が長すぎます（最大{max}文字）: {name}")]
    TooLong { name: String, max: usize },

    /// 識別子として使えない文字を含む
    #[error("テーブル名に使用できない文字が含まれています: {0}")]
    InvalidCharacter(String),
}

/// 検証済みのテーブル名
///
/// SQL文字列に埋め込んでよいのはこの型の値のみ。
/// 英字またはアンダースコアで始まり、英数字とアンダースコアのみを含む。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    /// テーブル名を検証して作成
    pub fn new(name: impl Into<String>) -> Result<Self, TableNameError> {
        let name = name.into();

        if name.is_empty() {
            return Err(TableNameError::Empty);
        }
        if name.len() > MAX_TABLE_NAME_LEN {
            return Err(TableNameError::TooLong {
                name,
                max: MAX_TABLE_NAME_LEN,
            });
        }

        let mut chars = name.chars();
        let head_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !head_ok || !tail_ok {
            return Err(TableNameError::InvalidCharacter(name));
        }

        Ok(Self(name))
    }

    /// 文字列として取得
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    // ========================================
    // ImageRecord
    // ========================================

    #[test]
    fn test_new_upload_derives_extension() {
        let record = ImageRecord::new_upload("a.png", 10, fixed_time());

        assert_eq!(record.name, "a.png");
        assert_eq!(record.size, 10);
        assert_eq!(record.extension, "png");
        assert_eq!(record.last_update, fixed_time());
    }

    #[test]
    fn test_new_upload_truncates_subseconds() {
        let now = fixed_time() + chrono::Duration::nanoseconds(111_938_421);

        let record = ImageRecord::new_upload("a.png", 10, now);

        assert_eq!(record.last_update, fixed_time());
    }

    #[test]
    fn test_file_extension_uses_last_dot() {
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("photo.JPG"), "JPG");
    }

    /// `.`を含まない名前はそのまま返る
    #[test]
    fn test_file_extension_without_dot() {
        assert_eq!(file_extension("README"), "README");
    }

    #[test]
    fn test_file_extension_trailing_dot_is_empty() {
        assert_eq!(file_extension("image."), "");
    }

    #[test]
    fn test_serialize_uses_camel_case_keys() {
        let record = ImageRecord::new_upload("a.png", 10, fixed_time());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["name"], "a.png");
        assert_eq!(value["size"], 10);
        assert_eq!(value["extension"], "png");
        assert_eq!(value["lastUpdate"], "2024-05-01T12:30:00Z");
    }

    #[test]
    fn test_event_body_is_indented_json() {
        let record = ImageRecord::new_upload("a.png", 10, fixed_time());
        let body = record.to_event_body().unwrap();

        assert!(body.contains('\n'));
        assert!(body.contains("  \"name\": \"a.png\""));

        let parsed: ImageRecord = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed, record);
    }

    // ========================================
    // TableName
    // ========================================

    #[test]
    fn test_table_name_accepts_identifier() {
        let table = TableName::new("images_v2").unwrap();
        assert_eq!(table.as_str(), "images_v2");
        assert_eq!(table.to_string(), "images_v2");
    }

    #[test]
    fn test_table_name_accepts_leading_underscore() {
        assert!(TableName::new("_images").is_ok());
    }

    #[test]
    fn test_table_name_rejects_empty() {
        assert_eq!(TableName::new(""), Err(TableNameError::Empty));
    }

    #[test]
    fn test_table_name_rejects_leading_digit() {
        assert!(matches!(
            TableName::new("1images"),
            Err(TableNameError::InvalidCharacter(_))
        ));
    }

    #[test]
    fn test_table_name_rejects_sql_injection() {
        assert!(matches!(
            TableName::new("images; DROP TABLE images"),
            Err(TableNameError::InvalidCharacter(_))
        ));
        assert!(matches!(
            TableName::new("images--"),
            Err(TableNameError::InvalidCharacter(_))
        ));
    }

    #[test]
    fn test_table_name_rejects_too_long() {
        let name = "a".repeat(MAX_TABLE_NAME_LEN + 1);
        assert!(matches!(
            TableName::new(name),
            Err(TableNameError::TooLong { .. })
        ));
    }
}
