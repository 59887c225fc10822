//! HTTP API
//!
//! 画像とメタデータ、通知購読のエンドポイントを提供する。

mod error;
mod image_handler;
mod notification_handler;

pub use error::{ApiError, ApiErrorBody};
pub use image_handler::{IMAGE_FIELD, NameQuery};
pub use notification_handler::{EmailQuery, MessageResponse, SubscriptionResponse};

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};
use tower_http::trace::TraceLayer;

use crate::infrastructure::{MessageQueue, NotificationTopic, ObjectStorage, SqliteMetadataStore};

/// アップロードの最大サイズ（32MiB）
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// キューとトピック
///
/// 両方が設定されている場合のみ有効になる。
#[derive(Clone)]
pub struct Messaging {
    /// アップロードイベントの送信先キュー
    pub queue: Arc<dyn MessageQueue>,
    /// 通知トピック
    pub topic: Arc<dyn NotificationTopic>,
}

/// アプリケーション状態
///
/// ルーター全体で共有される状態を保持する。
#[derive(Clone)]
pub struct AppState {
    /// メタデータストア
    pub store: Arc<SqliteMetadataStore>,
    /// オブジェクトストレージ
    pub storage: Arc<dyn ObjectStorage>,
    /// メッセージング（未設定ならNone）
    pub messaging: Option<Messaging>,
}

/// ヘルスチェックエンドポイント
async fn health() -> &'static str {
    "OK"
}

/// ルーターを構築する
///
/// TraceLayerによりリクエスト/レスポンスの構造化ログを自動記録する。
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/image",
            get(image_handler::get_image)
                .post(image_handler::upload_image)
                .delete(image_handler::delete_image),
        )
        .route("/image/metadata", get(image_handler::get_all_metadata))
        .route("/image/random/metadata", get(image_handler::get_random_metadata))
        .route("/notification/subscription", get(notification_handler::subscribe))
        .route("/notification/unsubscription", get(notification_handler::unsubscribe))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        // リクエストトレーシングレイヤー（method, path, status, latencyを自動記録）
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
