//! キューリレー
//!
//! メッセージキューをポーリングし、受信したメッセージを通知トピックへ
//! そのまま発行する。発行に成功したメッセージのみキューから削除する。
//!
//! # 状態遷移
//! - Polling: 最大`batch_size`件をロングポーリングで受信
//! - Draining: 受信順に 発行 → 削除 を1件ずつ実行
//!
//! 各サイクルの後（受信エラー・0件の場合も含む）は`poll_interval`だけ待機する。
//! キャンセルは受信待ちと待機中にのみ効き、発行と削除の間では中断しない。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::RelayMessage;
use crate::infrastructure::{MessageQueue, NotificationTopic};

/// 1回の受信で取得する最大件数
pub const DEFAULT_BATCH_SIZE: i32 = 10;

/// ロングポーリングの待機時間
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(20);

/// サイクル間の待機時間
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// リレー設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// 1回の受信で取得する最大件数
    pub batch_size: i32,
    /// ロングポーリングの待機時間
    pub wait_time: Duration,
    /// サイクル間の待機時間
    pub poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            wait_time: DEFAULT_WAIT_TIME,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RelayConfig {
    /// ポーリング間隔を設定
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// 待機処理の抽象化
///
/// テストでは実時間を待たずに遷移を確認するために差し替える。
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// tokio::time::sleepによる待機
#[derive(Debug, Clone, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// バッチ処理の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// 発行に成功した件数
    pub published: usize,
    /// 削除に成功した件数
    pub deleted: usize,
    /// 発行に失敗した件数（キューに残る）
    pub publish_failures: usize,
    /// 発行後の削除に失敗した件数（再配信で重複しうる）
    pub delete_failures: usize,
}

/// 1サイクルの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 受信に失敗した
    ReceiveFailed,
    /// メッセージがなかった
    Empty,
    /// バッチを処理した
    Drained(DrainReport),
}

/// キューリレー
pub struct QueueRelay {
    queue: Arc<dyn MessageQueue>,
    topic: Arc<dyn NotificationTopic>,
    sleeper: Arc<dyn Sleeper>,
    config: RelayConfig,
}

impl QueueRelay {
    /// 新しいQueueRelayを作成
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        topic: Arc<dyn NotificationTopic>,
        sleeper: Arc<dyn Sleeper>,
        config: RelayConfig,
    ) -> Self {
        Self {
            queue,
            topic,
            sleeper,
            config,
        }
    }

    /// 設定を取得
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// キャンセルされるまでポーリングを続ける
    ///
    /// 個々のメッセージや通信のエラーでは終了しない。
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "キューリレーを開始します"
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.receive() => received,
            };

            let outcome = match received {
                Some(messages) => self.handle_batch(messages).await,
                None => CycleOutcome::ReceiveFailed,
            };
            debug!(outcome = ?outcome, "リレーサイクル完了");

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = self.sleeper.sleep(self.config.poll_interval) => {}
            }
        }

        info!("キューリレーを停止しました");
    }

    /// 受信と処理を1回だけ実行する（待機なし）
    pub async fn poll_once(&self) -> CycleOutcome {
        match self.receive().await {
            Some(messages) => self.handle_batch(messages).await,
            None => CycleOutcome::ReceiveFailed,
        }
    }

    /// バッチを受信する（エラーはログに記録してNoneを返す）
    async fn receive(&self) -> Option<Vec<RelayMessage>> {
        match self
            .queue
            .receive_batch(self.config.batch_size, self.config.wait_time)
            .await
        {
            Ok(messages) => Some(messages),
            Err(e) => {
                error!(error = %e, "キューからの受信に失敗");
                None
            }
        }
    }

    async fn handle_batch(&self, messages: Vec<RelayMessage>) -> CycleOutcome {
        if messages.is_empty() {
            debug!("受信メッセージなし");
            return CycleOutcome::Empty;
        }
        CycleOutcome::Drained(self.drain(messages).await)
    }

    /// 受信順に1件ずつ 発行 → 削除 を行う
    ///
    /// 発行に失敗したメッセージは削除せず、キューの可視性タイムアウト後の再配信に任せる。
    pub async fn drain(&self, messages: Vec<RelayMessage>) -> DrainReport {
        info!(message_count = messages.len(), "バッチ処理開始");

        let mut report = DrainReport::default();

        for message in messages {
            match self.topic.publish(&message.body).await {
                Ok(message_id) => {
                    report.published += 1;
                    debug!(message_id = %message_id, body = %message.body, "トピックへ発行");
                }
                Err(e) => {
                    report.publish_failures += 1;
                    warn!(error = %e, body = %message.body, "トピックへの発行に失敗、メッセージを残します");
                    continue;
                }
            }

            match self.queue.delete(&message.receipt_token).await {
                Ok(()) => {
                    report.deleted += 1;
                    debug!(body = %message.body, "キューから削除");
                }
                Err(e) => {
                    report.delete_failures += 1;
                    warn!(error = %e, body = %message.body, "キューからの削除に失敗（再配信の可能性あり）");
                }
            }
        }

        info!(
            published = report.published,
            deleted = report.deleted,
            publish_failures = report.publish_failures,
            delete_failures = report.delete_failures,
            "バッチ処理完了"
        );

        report
    }
}
