//! SQS操作モジュール
//!
//! アップロードイベントのキュー送信と、リレー用の受信・削除を提供する。

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::RelayMessage;

/// SQS操作のエラー型
#[derive(Debug, Error)]
pub enum QueueError {
    /// AWS SDK エラー
    #[error("AWS SQS APIエラー: {0}")]
    AwsSdkError(String),
}

/// メッセージキュー操作トレイト（テスト用の抽象化）
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 最大`max_messages`件のメッセージを受信する
    ///
    /// 少なくとも1件届くまで最大`wait`だけ待機する（ロングポーリング）。
    async fn receive_batch(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<RelayMessage>, QueueError>;

    /// 受信ハンドルを使ってメッセージを削除する
    async fn delete(&self, receipt_token: &str) -> Result<(), QueueError>;

    /// メッセージを送信する
    async fn send(&self, body: &str) -> Result<(), QueueError>;
}

/// 実際のAWS SQS SDKを使用したキュー実装
pub struct SqsMessageQueue {
    client: SqsClient,
    queue_url: String,
}

impl SqsMessageQueue {
    /// 新しいSqsMessageQueueを作成
    pub fn new(client: SqsClient, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// AWS設定からクライアントを作成
    pub fn from_sdk_config(config: &aws_config::SdkConfig, queue_url: impl Into<String>) -> Self {
        Self::new(SqsClient::new(config), queue_url)
    }
}

#[async_trait]
impl MessageQueue for SqsMessageQueue {
    async fn receive_batch(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<RelayMessage>, QueueError> {
        let wait_secs = i32::try_from(wait.as_secs()).unwrap_or(i32::MAX);

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_secs)
            .send()
            .await
            .map_err(|err| QueueError::AwsSdkError(err.into_service_error().to_string()))?;

        let messages: Vec<RelayMessage> = output
            .messages()
            .iter()
            .filter_map(|msg| match (msg.body(), msg.receipt_handle()) {
                (Some(body), Some(handle)) => Some(RelayMessage::new(body, handle)),
                _ => {
                    warn!(message_id = ?msg.message_id(), "本文または受信ハンドルのないメッセージを無視");
                    None
                }
            })
            .collect();

        debug!(queue_url = %self.queue_url, count = messages.len(), "SQSメッセージ受信");
        Ok(messages)
    }

    async fn delete(&self, receipt_token: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_token)
            .send()
            .await
            .map_err(|err| QueueError::AwsSdkError(err.into_service_error().to_string()))?;

        Ok(())
    }

    async fn send(&self, body: &str) -> Result<(), QueueError> {
        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|err| QueueError::AwsSdkError(err.into_service_error().to_string()))?;

        info!(
            queue_url = %self.queue_url,
            message_id = output.message_id().unwrap_or("unknown"),
            "SQSメッセージ送信"
        );
        Ok(())
    }
}
