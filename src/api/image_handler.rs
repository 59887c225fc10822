//! 画像エンドポイント
//!
//! - GET /image?name=            画像の取得（添付ファイルとして返す）
//! - POST /image                 画像のアップロード（multipartフィールド`image`）
//! - DELETE /image?name=         画像とメタデータの削除
//! - GET /image/metadata         全メタデータの取得
//! - GET /image/random/metadata  ランダムに1件のメタデータを取得

use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::{ApiError, AppState};
use crate::domain::ImageRecord;

/// アップロードファイルのmultipartフィールド名
pub const IMAGE_FIELD: &str = "image";

/// Content-Typeが不明な場合の値
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// `name`クエリパラメータ
#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

/// 空文字列を含めて未指定のパラメータを400にする
pub(super) fn required_param(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}

fn required_name(query: NameQuery) -> Result<String, ApiError> {
    required_param(
        query.name,
        "画像名をクエリパラメータで指定してください: /image?name=imageName.png",
    )
}

/// 添付ファイルとして返すContent-Dispositionの値
///
/// quoted-stringの中で特別な意味を持つ`\`と`"`はエスケープする。
fn attachment_disposition(filename: &str) -> String {
    let mut escaped = String::with_capacity(filename.len());
    for c in filename.chars() {
        if matches!(c, '"' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("attachment; filename=\"{}\"", escaped)
}

/// 画像取得エンドポイント (GET /image?name=)
///
/// # Returns
/// - 200 OK: 画像本文（Content-Disposition: attachment）
/// - 400 Bad Request: nameが未指定
/// - 404 Not Found: オブジェクトが存在しない
/// - 500 Internal Server Error: ストレージエラー
pub async fn get_image(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Response, ApiError> {
    let name = required_name(query)?;

    let object = state.storage.get(&name).await.map_err(|e| {
        warn!(name = %name, error = %e, "画像の取得に失敗");
        ApiError::from(e)
    })?;

    let filename = object.filename.unwrap_or_else(|| name.clone());
    let content_type = object
        .content_type
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    info!(name = %name, size = object.bytes.len(), "画像をダウンロード");

    let headers = [
        (header::CONTENT_DISPOSITION, attachment_disposition(&filename)),
        (header::CONTENT_TYPE, content_type),
    ];
    Ok((headers, object.bytes).into_response())
}

/// multipartから取り出したアップロードファイル
struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    bytes: Bytes,
}

async fn read_image_field(multipart: &mut Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("multipartの読み取りに失敗しました: {}", e)))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .filter(|n| !n.is_empty())
            .map(|n| n.to_string())
            .ok_or_else(|| ApiError::bad_request("アップロードファイルにファイル名がありません"))?;
        let content_type = field.content_type().map(|c| c.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("ファイルの読み取りに失敗しました: {}", e)))?;

        return Ok(UploadedFile {
            filename,
            content_type,
            bytes,
        });
    }

    Err(ApiError::bad_request(format!(
        "multipartフィールド '{}' がありません",
        IMAGE_FIELD
    )))
}

/// 画像アップロードエンドポイント (POST /image)
///
/// オブジェクト保存 → メタデータ保存 → （メッセージング有効時）イベント送信 の順に行う。
///
/// # Returns
/// - 200 OK: アップロード成功
/// - 400 Bad Request: フィールド`image`がない
/// - 500 Internal Server Error: ストレージ・ストア・キューのエラー
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_image_field(&mut multipart).await?;
    let size = i64::try_from(upload.bytes.len()).unwrap_or(i64::MAX);

    state
        .storage
        .put(&upload.filename, upload.bytes, upload.content_type.as_deref())
        .await
        .map_err(|e| {
            error!(name = %upload.filename, error = %e, "画像の保存に失敗");
            ApiError::from(e)
        })?;

    let record = ImageRecord::new_upload(upload.filename, size, Utc::now());
    let id = state.store.insert(&record).await.map_err(|e| {
        error!(name = %record.name, error = %e, "メタデータの保存に失敗");
        ApiError::from(e)
    })?;
    info!(id = id, name = %record.name, size = record.size, "画像メタデータを保存");

    if let Some(messaging) = &state.messaging {
        let body = record.to_event_body().map_err(|e| {
            ApiError::internal_error(format!("イベントのシリアライズに失敗しました: {}", e))
        })?;
        messaging.queue.send(&body).await.map_err(|e| {
            error!(name = %record.name, error = %e, "アップロードイベントの送信に失敗");
            ApiError::from(e)
        })?;
        info!(name = %record.name, "アップロードイベントをキューに送信");
    }

    Ok("Image uploaded successfully".into_response())
}

/// 画像削除エンドポイント (DELETE /image?name=)
///
/// オブジェクトを削除してから、同名のメタデータを全て削除する。
pub async fn delete_image(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Response, ApiError> {
    let name = required_name(query)?;

    state.storage.delete(&name).await.map_err(|e| {
        error!(name = %name, error = %e, "画像の削除に失敗");
        ApiError::from(e)
    })?;

    let deleted = state.store.delete_by_name(&name).await.map_err(|e| {
        error!(name = %name, error = %e, "メタデータの削除に失敗");
        ApiError::from(e)
    })?;
    info!(name = %name, rows = deleted, "画像を削除");

    Ok(format!("Image '{}' deleted successfully", name).into_response())
}

/// 全メタデータ取得エンドポイント (GET /image/metadata)
pub async fn get_all_metadata(State(state): State<AppState>) -> Result<Json<Vec<ImageRecord>>, ApiError> {
    let records = state.store.list_all().await.map_err(|e| {
        error!(error = %e, "メタデータ一覧の取得に失敗");
        ApiError::from(e)
    })?;

    info!(count = records.len(), "メタデータ一覧を返却");
    Ok(Json(records))
}

/// ランダムメタデータ取得エンドポイント (GET /image/random/metadata)
///
/// # Returns
/// - 200 OK: メタデータ1件
/// - 404 Not Found: メタデータが1件もない
pub async fn get_random_metadata(State(state): State<AppState>) -> Result<Json<ImageRecord>, ApiError> {
    let record = state.store.list_random().await.map_err(|e| {
        warn!(error = %e, "ランダムメタデータの取得に失敗");
        ApiError::from(e)
    })?;

    info!(name = %record.name, "ランダムメタデータを返却");
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_disposition_plain_name() {
        assert_eq!(attachment_disposition("a.png"), "attachment; filename=\"a.png\"");
    }

    #[test]
    fn test_attachment_disposition_escapes_quote_and_backslash() {
        assert_eq!(
            attachment_disposition(r#"a"b\c.png"#),
            r#"attachment; filename="a\"b\\c.png""#
        );
    }

    #[test]
    fn test_required_param_rejects_empty() {
        assert!(required_param(Some(String::new()), "x").is_err());
        assert!(required_param(None, "x").is_err());
        assert_eq!(required_param(Some("a".to_string()), "x").unwrap(), "a");
    }
}
