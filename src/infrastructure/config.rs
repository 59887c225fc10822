//! アプリケーション設定
//!
//! 起動時に一度だけ読み込み、各コンポーネントのコンストラクタへ渡す。
//! 値の取得元は環境変数またはSSM Parameter Storeを選択できる。

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{TableName, TableNameError};

/// 設定取得元を選択する環境変数名
pub const CONFIG_SOURCE_ENV: &str = "CONFIG_SOURCE";

/// デフォルトのデータベースパス
const DEFAULT_DB_PATH: &str = "/var/lib/image-service/images.db";

/// デフォルトのテーブル名
const DEFAULT_TABLE_NAME: &str = "images";

/// デフォルトのリレーポーリング間隔（秒）
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// デフォルトのリッスンアドレス
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// 設定エラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必須の設定値がない
    #[error("必須の設定値がありません: {0}")]
    Missing(String),

    /// 設定値の形式が不正
    #[error("設定値が不正です: {key}={value}")]
    InvalidValue { key: String, value: String },

    /// テーブル名が不正
    #[error("テーブル名が不正です: {0}")]
    InvalidTableName(#[from] TableNameError),

    /// キューとトピックの片方だけが設定されている
    #[error("メッセージング設定が不完全です（{0} のみ設定されています）")]
    IncompleteMessaging(String),

    /// パラメータストアの取得エラー
    #[error("パラメータ取得エラー: {0}")]
    Parameter(String),
}

/// 設定キー
///
/// 環境変数名とParameter Storeのパラメータ名の組。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigKey {
    /// 環境変数名
    pub env: &'static str,
    /// SSMパラメータ名
    pub parameter: &'static str,
}

impl ConfigKey {
    const fn new(env: &'static str, parameter: &'static str) -> Self {
        Self { env, parameter }
    }
}

pub const DB_PATH: ConfigKey = ConfigKey::new("DB_PATH", "dbPath");
pub const DB_TABLE_NAME: ConfigKey = ConfigKey::new("DB_TABLE_NAME", "dbTableName");
pub const S3_BUCKET: ConfigKey = ConfigKey::new("S3_BUCKET", "s3Bucket");
pub const TOPIC_ARN: ConfigKey = ConfigKey::new("TOPIC_ARN", "topicARN");
pub const QUEUE_URL: ConfigKey = ConfigKey::new("QUEUE_URL", "queueURL");
pub const RELAY_POLL_INTERVAL_SECS: ConfigKey =
    ConfigKey::new("RELAY_POLL_INTERVAL_SECS", "relayPollIntervalSecs");
pub const LISTEN_ADDR: ConfigKey = ConfigKey::new("LISTEN_ADDR", "listenAddr");

/// 設定値の取得元
#[async_trait]
pub trait ParameterSource: Send + Sync {
    /// 設定値を取得する
    ///
    /// # Returns
    /// * `Ok(Some(value))` - 値が存在する
    /// * `Ok(None)` - 値が存在しない
    /// * `Err(ConfigError)` - 取得元へのアクセスに失敗
    async fn get(&self, key: ConfigKey) -> Result<Option<String>, ConfigError>;
}

/// 環境変数から設定値を取得する
#[derive(Debug, Clone, Default)]
pub struct EnvParameterSource;

#[async_trait]
impl ParameterSource for EnvParameterSource {
    async fn get(&self, key: ConfigKey) -> Result<Option<String>, ConfigError> {
        Ok(std::env::var(key.env).ok().filter(|v| !v.is_empty()))
    }
}

/// 設定取得元の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// 環境変数
    Env,
    /// SSM Parameter Store
    Ssm,
}

impl ConfigSource {
    /// `CONFIG_SOURCE`環境変数から取得元を決定（未設定時は環境変数）
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_SOURCE_ENV) {
            Err(_) => Ok(Self::Env),
            Ok(value) => match value.as_str() {
                "" | "env" => Ok(Self::Env),
                "ssm" => Ok(Self::Ssm),
                _ => Err(ConfigError::InvalidValue {
                    key: CONFIG_SOURCE_ENV.to_string(),
                    value,
                }),
            },
        }
    }
}

/// キューとトピックの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingConfig {
    /// SNSトピックARN
    pub topic_arn: String,
    /// SQSキューURL
    pub queue_url: String,
}

/// アプリケーション設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLiteデータベースファイルのパス
    pub db_path: String,
    /// メタデータテーブル名
    pub table_name: TableName,
    /// 画像を保存するS3バケット
    pub s3_bucket: String,
    /// メッセージング設定（未設定ならキュー送信とリレーを無効化）
    pub messaging: Option<MessagingConfig>,
    /// リレーのポーリング間隔
    pub relay_poll_interval: Duration,
    /// HTTPサーバーのリッスンアドレス
    pub listen_addr: SocketAddr,
}

impl AppConfig {
    /// 取得元から設定を読み込む
    pub async fn load(source: &dyn ParameterSource) -> Result<Self, ConfigError> {
        let db_path = source
            .get(DB_PATH)
            .await?
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let table_name = source
            .get(DB_TABLE_NAME)
            .await?
            .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());
        let table_name = TableName::new(table_name)?;

        let s3_bucket = source
            .get(S3_BUCKET)
            .await?
            .ok_or_else(|| ConfigError::Missing(S3_BUCKET.env.to_string()))?;

        let topic_arn = source.get(TOPIC_ARN).await?;
        let queue_url = source.get(QUEUE_URL).await?;
        let messaging = match (topic_arn, queue_url) {
            (Some(topic_arn), Some(queue_url)) => Some(MessagingConfig {
                topic_arn,
                queue_url,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::IncompleteMessaging(TOPIC_ARN.env.to_string())),
            (None, Some(_)) => return Err(ConfigError::IncompleteMessaging(QUEUE_URL.env.to_string())),
        };

        let relay_poll_interval = match source.get(RELAY_POLL_INTERVAL_SECS).await? {
            None => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            Some(value) => value
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidValue {
                    key: RELAY_POLL_INTERVAL_SECS.env.to_string(),
                    value,
                })?,
        };

        let listen_addr = source
            .get(LISTEN_ADDR)
            .await?
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                key: LISTEN_ADDR.env.to_string(),
                value: listen_addr.clone(),
            })?;

        Ok(Self {
            db_path,
            table_name,
            s3_bucket,
            messaging,
            relay_poll_interval,
            listen_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    /// テスト用の固定値パラメータソース
    struct MapParameterSource(HashMap<&'static str, &'static str>);

    impl MapParameterSource {
        fn new(entries: &[(ConfigKey, &'static str)]) -> Self {
            Self(entries.iter().map(|(k, v)| (k.env, *v)).collect())
        }
    }

    #[async_trait]
    impl ParameterSource for MapParameterSource {
        async fn get(&self, key: ConfigKey) -> Result<Option<String>, ConfigError> {
            Ok(self.0.get(key.env).map(|v| v.to_string()))
        }
    }

    /// 常に失敗するパラメータソース
    struct FailingParameterSource;

    #[async_trait]
    impl ParameterSource for FailingParameterSource {
        async fn get(&self, key: ConfigKey) -> Result<Option<String>, ConfigError> {
            Err(ConfigError::Parameter(format!("{} にアクセスできません", key.parameter)))
        }
    }

    #[tokio::test]
    async fn test_load_applies_defaults() {
        let source = MapParameterSource::new(&[(S3_BUCKET, "bucket")]);

        let config = AppConfig::load(&source).await.unwrap();

        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert_eq!(config.table_name.as_str(), "images");
        assert_eq!(config.s3_bucket, "bucket");
        assert!(config.messaging.is_none());
        assert_eq!(config.relay_poll_interval, Duration::from_secs(60));
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
    }

    #[tokio::test]
    async fn test_load_full_config() {
        let source = MapParameterSource::new(&[
            (DB_PATH, "/tmp/test.db"),
            (DB_TABLE_NAME, "photos"),
            (S3_BUCKET, "bucket"),
            (TOPIC_ARN, "arn:aws:sns:us-east-1:123:topic"),
            (QUEUE_URL, "https://sqs.us-east-1.amazonaws.com/123/queue"),
            (RELAY_POLL_INTERVAL_SECS, "5"),
            (LISTEN_ADDR, "127.0.0.1:9000"),
        ]);

        let config = AppConfig::load(&source).await.unwrap();

        assert_eq!(config.db_path, "/tmp/test.db");
        assert_eq!(config.table_name.as_str(), "photos");
        assert_eq!(
            config.messaging,
            Some(MessagingConfig {
                topic_arn: "arn:aws:sns:us-east-1:123:topic".to_string(),
                queue_url: "https://sqs.us-east-1.amazonaws.com/123/queue".to_string(),
            })
        );
        assert_eq!(config.relay_poll_interval, Duration::from_secs(5));
        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
    }

    #[tokio::test]
    async fn test_load_missing_bucket() {
        let source = MapParameterSource::new(&[]);

        let err = AppConfig::load(&source).await.unwrap_err();

        assert!(matches!(err, ConfigError::Missing(key) if key == "S3_BUCKET"));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_table_name() {
        let source = MapParameterSource::new(&[
            (S3_BUCKET, "bucket"),
            (DB_TABLE_NAME, "images; DROP TABLE images"),
        ]);

        let err = AppConfig::load(&source).await.unwrap_err();

        assert!(matches!(err, ConfigError::InvalidTableName(_)));
    }

    #[tokio::test]
    async fn test_load_rejects_topic_without_queue() {
        let source = MapParameterSource::new(&[
            (S3_BUCKET, "bucket"),
            (TOPIC_ARN, "arn:aws:sns:us-east-1:123:topic"),
        ]);

        let err = AppConfig::load(&source).await.unwrap_err();

        assert!(matches!(err, ConfigError::IncompleteMessaging(key) if key == "TOPIC_ARN"));
    }

    #[tokio::test]
    async fn test_load_rejects_non_numeric_interval() {
        let source = MapParameterSource::new(&[
            (S3_BUCKET, "bucket"),
            (RELAY_POLL_INTERVAL_SECS, "soon"),
        ]);

        let err = AppConfig::load(&source).await.unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidValue { key, value } if key == "RELAY_POLL_INTERVAL_SECS" && value == "soon"
        ));
    }

    #[tokio::test]
    async fn test_load_propagates_source_error() {
        let err = AppConfig::load(&FailingParameterSource).await.unwrap_err();

        assert!(matches!(err, ConfigError::Parameter(_)));
    }

    #[tokio::test]
    #[serial]
    async fn test_env_parameter_source_reads_env() {
        unsafe {
            std::env::set_var("S3_BUCKET", "env-bucket");
            std::env::set_var("QUEUE_URL", "");
        }

        let source = EnvParameterSource;
        assert_eq!(source.get(S3_BUCKET).await.unwrap(), Some("env-bucket".to_string()));
        // 空文字列は未設定として扱う
        assert_eq!(source.get(QUEUE_URL).await.unwrap(), None);

        unsafe {
            std::env::remove_var("S3_BUCKET");
            std::env::remove_var("QUEUE_URL");
        }
    }

    #[test]
    #[serial]
    fn test_config_source_from_env() {
        unsafe { std::env::remove_var(CONFIG_SOURCE_ENV) };
        assert_eq!(ConfigSource::from_env().unwrap(), ConfigSource::Env);

        unsafe { std::env::set_var(CONFIG_SOURCE_ENV, "ssm") };
        assert_eq!(ConfigSource::from_env().unwrap(), ConfigSource::Ssm);

        unsafe { std::env::set_var(CONFIG_SOURCE_ENV, "vault") };
        assert!(matches!(
            ConfigSource::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));

        unsafe { std::env::remove_var(CONFIG_SOURCE_ENV) };
    }

    #[test]
    fn test_error_display() {
        let error = ConfigError::Missing("S3_BUCKET".to_string());
        assert!(error.to_string().contains("S3_BUCKET"));
    }
}
