//! 画像メタデータAPIサーバー
//!
//! 本バイナリは以下を1プロセスで実行する:
//! - HTTP API（画像の取得・アップロード・削除、メタデータ参照、通知購読）
//! - SQS→SNSリレー（メッセージング設定時のみ）
//!
//! # 環境変数
//! - `CONFIG_SOURCE`: 設定の取得元（`env` または `ssm`、デフォルト: env）
//! - `AWS_REGION`: AWSリージョン（デフォルト: us-east-1）
//! - `RUST_LOG`: ログレベル（デフォルト: info）
//! - その他の設定キーは`infrastructure::config`を参照

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, meta::region::RegionProviderChain};
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use image_service::api::{AppState, Messaging, create_router};
use image_service::application::{QueueRelay, RelayConfig, TokioSleeper};
use image_service::infrastructure::{
    AppConfig, ConfigError, ConfigSource, EnvParameterSource, ParameterSource, S3ObjectStorage,
    SnsNotificationTopic, SqliteMetadataStore, SqsMessageQueue, SsmParameterSource, StoreError,
    init_logging,
};

/// リージョン未設定時のデフォルト
const DEFAULT_REGION: &str = "us-east-1";

/// 起動エラー
#[derive(Debug, Error)]
enum StartupError {
    #[error("設定の読み込みに失敗しました: {0}")]
    Config(#[from] ConfigError),

    #[error("メタデータストアの初期化に失敗しました: {0}")]
    Store(#[from] StoreError),

    #[error("サーバーの実行に失敗しました: {0}")]
    Io(#[from] std::io::Error),
}

/// シャットダウンシグナルを待機し、トークンをキャンセルする
///
/// SIGTERMまたはCtrl+C (SIGINT) のいずれかを受信したらリターンする。
/// axum::serve の with_graceful_shutdown() と組み合わせて使用する。
///
/// # Panics
/// シグナルハンドラーの登録に失敗した場合はパニックする。
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Ctrl+C シグナルハンドラーの登録に失敗しました");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM シグナルハンドラーの登録に失敗しました")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C (SIGINT) を受信しました。graceful shutdownを開始します");
        }
        _ = terminate => {
            tracing::info!("SIGTERM を受信しました。graceful shutdownを開始します");
        }
    }

    token.cancel();
}

async fn run() -> Result<(), StartupError> {
    let region = RegionProviderChain::default_provider().or_else(Region::new(DEFAULT_REGION));
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .load()
        .await;

    let source: Box<dyn ParameterSource> = match ConfigSource::from_env()? {
        ConfigSource::Env => Box::new(EnvParameterSource),
        ConfigSource::Ssm => Box::new(SsmParameterSource::from_sdk_config(&sdk_config)),
    };
    let config = AppConfig::load(source.as_ref()).await?;
    tracing::info!(
        db_path = %config.db_path,
        table = %config.table_name,
        bucket = %config.s3_bucket,
        messaging = config.messaging.is_some(),
        "設定を読み込みました"
    );

    // テーブルがなければサービスは動作できないため、ここでの失敗は起動失敗とする
    let store = Arc::new(SqliteMetadataStore::open(&config.db_path, config.table_name.clone()).await?);
    store.ensure_schema().await?;

    let storage = Arc::new(S3ObjectStorage::from_sdk_config(&sdk_config, &config.s3_bucket));
    let shutdown = CancellationToken::new();

    let mut relay_handle = None;
    let messaging = match &config.messaging {
        Some(messaging_config) => {
            let queue = Arc::new(SqsMessageQueue::from_sdk_config(
                &sdk_config,
                &messaging_config.queue_url,
            ));
            let topic = Arc::new(SnsNotificationTopic::from_sdk_config(
                &sdk_config,
                &messaging_config.topic_arn,
            ));

            let relay = QueueRelay::new(
                queue.clone(),
                topic.clone(),
                Arc::new(TokioSleeper),
                RelayConfig::default().with_poll_interval(config.relay_poll_interval),
            );
            let token = shutdown.clone();
            relay_handle = Some(tokio::spawn(async move { relay.run(token).await }));

            Some(Messaging { queue, topic })
        }
        None => {
            tracing::warn!("キューURLとトピックARNが未設定のため、リレーを起動しません");
            None
        }
    };

    let app = create_router(AppState {
        store,
        storage,
        messaging,
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("リッスン開始: {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // サーバーが他の理由で終了した場合もリレーを止める
    shutdown.cancel();
    if let Some(handle) = relay_handle
        && let Err(e) = handle.await
    {
        tracing::error!(error = %e, "リレータスクが異常終了しました");
    }

    tracing::info!("サーバーが正常に停止しました");
    Ok(())
}

/// メイン関数
///
/// トレーシングを初期化し、HTTPサーバーとリレーを起動する。
/// 起動に失敗した場合はエラーをログに記録して終了コード1で終了する。
#[tokio::main]
async fn main() {
    init_logging();

    tracing::info!("画像メタデータサービスを起動します");

    if let Err(e) = run().await {
        tracing::error!(error = %e, "サービスを起動できませんでした");
        std::process::exit(1);
    }
}
