//! オブジェクトストレージ操作モジュール
//!
//! 画像バイト列のS3への保存・取得・削除を提供する。

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

/// 元ファイル名を保存するオブジェクトメタデータのキー
const FILENAME_METADATA_KEY: &str = "filename";

/// オブジェクトストレージ操作のエラー型
#[derive(Debug, Error)]
pub enum StorageError {
    /// オブジェクトが存在しない
    #[error("オブジェクトが見つかりません: {0}")]
    NotFound(String),

    /// AWS SDK エラー
    #[error("AWS S3 APIエラー: {0}")]
    AwsSdkError(String),

    /// 本文の読み取りエラー
    #[error("オブジェクト本文の読み取りエラー: {0}")]
    Body(String),
}

/// 取得したオブジェクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// 本文
    pub bytes: Bytes,
    /// Content-Type
    pub content_type: Option<String>,
    /// 保存時に記録した元ファイル名
    pub filename: Option<String>,
}

/// オブジェクトストレージ操作トレイト（テスト用の抽象化）
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// オブジェクトを保存する
    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> Result<(), StorageError>;

    /// オブジェクトを取得する
    async fn get(&self, key: &str) -> Result<StoredObject, StorageError>;

    /// オブジェクトを削除する
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// 実際のAWS S3 SDKを使用したオブジェクトストレージ実装
pub struct S3ObjectStorage {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStorage {
    /// 新しいS3ObjectStorageを作成
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// AWS設定からクライアントを作成
    pub fn from_sdk_config(config: &aws_config::SdkConfig, bucket: impl Into<String>) -> Self {
        Self::new(S3Client::new(config), bucket)
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> Result<(), StorageError> {
        let size = body.len();
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .metadata(FILENAME_METADATA_KEY, key)
            .body(ByteStream::from(body));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        match request.send().await {
            Ok(_) => {
                info!(bucket = %self.bucket, key = %key, size = size, "S3オブジェクトを保存");
                Ok(())
            }
            Err(err) => {
                warn!(bucket = %self.bucket, key = %key, error = %err, "S3 PutObjectエラー");
                Err(StorageError::AwsSdkError(err.to_string()))
            }
        }
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StorageError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                warn!(bucket = %self.bucket, key = %key, error = %service_err, "S3 GetObjectエラー");
                return Err(StorageError::AwsSdkError(service_err.to_string()));
            }
        };

        let content_type = output.content_type().map(|v| v.to_string());
        let filename = output
            .metadata()
            .and_then(|m| m.get(FILENAME_METADATA_KEY))
            .cloned();

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Body(e.to_string()))?
            .into_bytes();

        info!(bucket = %self.bucket, key = %key, size = bytes.len(), "S3オブジェクトを取得");

        Ok(StoredObject {
            bytes,
            content_type,
            filename,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => {
                info!(bucket = %self.bucket, key = %key, "S3オブジェクトを削除");
                Ok(())
            }
            Err(err) => {
                warn!(bucket = %self.bucket, key = %key, error = %err, "S3 DeleteObjectエラー");
                Err(StorageError::AwsSdkError(err.to_string()))
            }
        }
    }
}
