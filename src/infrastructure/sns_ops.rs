//! SNS操作モジュール
//!
//! 通知トピックへのメッセージ発行とメール購読の管理を提供する。

use async_trait::async_trait;
use aws_sdk_sns::Client as SnsClient;
use thiserror::Error;
use tracing::{info, warn};

/// メール購読のプロトコル名
pub const EMAIL_PROTOCOL: &str = "email";

/// SNS操作のエラー型
#[derive(Debug, Error)]
pub enum TopicError {
    /// AWS SDK エラー
    #[error("AWS SNS APIエラー: {0}")]
    AwsSdkError(String),
}

/// トピックの購読情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// 購読ARN
    pub subscription_arn: String,
    /// プロトコル（"email"等）
    pub protocol: String,
    /// エンドポイント（メールアドレス等）
    pub endpoint: String,
}

/// メールアドレスに対応する購読を探す
pub fn find_email_subscription<'a>(
    subscriptions: &'a [Subscription],
    email: &str,
) -> Option<&'a Subscription> {
    subscriptions
        .iter()
        .find(|s| s.protocol == EMAIL_PROTOCOL && s.endpoint == email)
}

/// 通知トピック操作トレイト（テスト用の抽象化）
#[async_trait]
pub trait NotificationTopic: Send + Sync {
    /// メッセージをそのまま発行する
    ///
    /// # 戻り値
    /// * `Ok(message_id)` - 発行成功
    /// * `Err(TopicError)` - エラー
    async fn publish(&self, message: &str) -> Result<String, TopicError>;

    /// メールアドレスを購読登録する
    ///
    /// # 戻り値
    /// * `Ok(subscription_arn)` - 登録成功（確認待ちの場合は"pending confirmation"）
    async fn subscribe_email(&self, email: &str) -> Result<String, TopicError>;

    /// トピックの購読一覧を取得する
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, TopicError>;

    /// 購読を解除する
    async fn unsubscribe(&self, subscription_arn: &str) -> Result<(), TopicError>;
}

/// 実際のAWS SNS SDKを使用したトピック実装
pub struct SnsNotificationTopic {
    client: SnsClient,
    topic_arn: String,
}

impl SnsNotificationTopic {
    /// 新しいSnsNotificationTopicを作成
    pub fn new(client: SnsClient, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }

    /// AWS設定からクライアントを作成
    pub fn from_sdk_config(config: &aws_config::SdkConfig, topic_arn: impl Into<String>) -> Self {
        Self::new(SnsClient::new(config), topic_arn)
    }
}

#[async_trait]
impl NotificationTopic for SnsNotificationTopic {
    async fn publish(&self, message: &str) -> Result<String, TopicError> {
        let result = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(message)
            .send()
            .await;

        match result {
            Ok(response) => {
                let message_id = response.message_id().unwrap_or("unknown").to_string();
                info!(
                    topic_arn = %self.topic_arn,
                    message_id = %message_id,
                    "SNS Publish成功"
                );
                Ok(message_id)
            }
            Err(err) => {
                let err = err.into_service_error();
                warn!(topic_arn = %self.topic_arn, error = %err, "SNS Publishエラー");
                Err(TopicError::AwsSdkError(err.to_string()))
            }
        }
    }

    async fn subscribe_email(&self, email: &str) -> Result<String, TopicError> {
        let response = self
            .client
            .subscribe()
            .topic_arn(&self.topic_arn)
            .protocol(EMAIL_PROTOCOL)
            .endpoint(email)
            .send()
            .await
            .map_err(|err| TopicError::AwsSdkError(err.into_service_error().to_string()))?;

        let subscription_arn = response
            .subscription_arn()
            .unwrap_or("pending confirmation")
            .to_string();

        info!(topic_arn = %self.topic_arn, subscription_arn = %subscription_arn, "メール購読を登録");
        Ok(subscription_arn)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, TopicError> {
        let mut subscriptions = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_subscriptions_by_topic()
                .topic_arn(&self.topic_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|err| TopicError::AwsSdkError(err.into_service_error().to_string()))?;

            subscriptions.extend(response.subscriptions().iter().map(|s| Subscription {
                subscription_arn: s.subscription_arn().unwrap_or_default().to_string(),
                protocol: s.protocol().unwrap_or_default().to_string(),
                endpoint: s.endpoint().unwrap_or_default().to_string(),
            }));

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(subscriptions)
    }

    async fn unsubscribe(&self, subscription_arn: &str) -> Result<(), TopicError> {
        self.client
            .unsubscribe()
            .subscription_arn(subscription_arn)
            .send()
            .await
            .map_err(|err| TopicError::AwsSdkError(err.into_service_error().to_string()))?;

        info!(topic_arn = %self.topic_arn, subscription_arn = %subscription_arn, "購読を解除");
        Ok(())
    }
}
