//! 画像メタデータサービス
//!
//! - 画像オブジェクト（S3）とメタデータ（SQLite）を扱うHTTP API
//! - SQSキューのメッセージをSNSトピックへ中継するバックグラウンドリレー

// Domain layer modules
pub mod domain;

// Application layer modules
pub mod application;

// Infrastructure layer modules
pub mod infrastructure;

// HTTP layer
pub mod api;
