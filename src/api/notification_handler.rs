//! 通知購読エンドポイント
//!
//! - GET /notification/subscription?email=    メールアドレスをトピックに購読登録
//! - GET /notification/unsubscription?email=  メールアドレスの購読を解除

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::image_handler::required_param;
use super::{ApiError, AppState, Messaging};
use crate::infrastructure::sns_ops::find_email_subscription;

/// `email`クエリパラメータ
#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

/// 購読登録のレスポンス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionResponse {
    #[serde(rename = "subscriptionARN")]
    pub subscription_arn: String,
}

/// メッセージのみのレスポンス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

fn required_email(query: EmailQuery) -> Result<String, ApiError> {
    required_param(query.email, "emailパラメータを指定してください")
}

fn messaging(state: &AppState) -> Result<&Messaging, ApiError> {
    state
        .messaging
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("通知トピックが設定されていません"))
}

/// 購読登録エンドポイント (GET /notification/subscription?email=)
pub async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let email = required_email(query)?;
    let messaging = messaging(&state)?;

    let subscription_arn = messaging.topic.subscribe_email(&email).await.map_err(|e| {
        error!(email = %email, error = %e, "メール購読の登録に失敗");
        ApiError::from(e)
    })?;

    info!(email = %email, "メール購読を登録");
    Ok(Json(SubscriptionResponse { subscription_arn }))
}

/// 購読解除エンドポイント (GET /notification/unsubscription?email=)
///
/// # Returns
/// - 200 OK: 解除成功
/// - 404 Not Found: メールアドレスが購読されていない
pub async fn unsubscribe(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = required_email(query)?;
    let messaging = messaging(&state)?;

    let subscriptions = messaging.topic.list_subscriptions().await.map_err(|e| {
        error!(error = %e, "購読一覧の取得に失敗");
        ApiError::from(e)
    })?;

    let subscription = find_email_subscription(&subscriptions, &email).ok_or_else(|| {
        warn!(email = %email, "購読されていないメールアドレス");
        ApiError::not_found(format!("メールアドレスは購読されていません: {}", email))
    })?;

    messaging
        .topic
        .unsubscribe(&subscription.subscription_arn)
        .await
        .map_err(|e| {
            error!(email = %email, error = %e, "購読の解除に失敗");
            ApiError::from(e)
        })?;

    info!(email = %email, "メール購読を解除");
    Ok(Json(MessageResponse {
        message: "Email unsubscribed successfully".to_string(),
    }))
}
