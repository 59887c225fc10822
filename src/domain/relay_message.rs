/// リレーメッセージ
///
/// キューから受信してからトピックへの発行・削除が終わるまでだけ存在する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// メッセージ本文（そのままトピックへ発行する）
    pub body: String,
    /// 削除時に使用する受信ハンドル
    pub receipt_token: String,
}

impl RelayMessage {
    /// 新しいRelayMessageを作成
    pub fn new(body: impl Into<String>, receipt_token: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            receipt_token: receipt_token.into(),
        }
    }
}
