use std::collections::HashMap;

use async_trait::async_trait;
use derive_more::{Deref, Display, Error, From};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::domain::{auth::UserId, ApiError, Entity, Id};

use super::{CourtId, ReservationId};

/// フィードバックリポジトリ
#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// コートに付いたフィードバックを取得する
    async fn find_by_court(&self, court_id: CourtId) -> Result<Vec<Feedback>, ApiError>;
    /// 予約に対するフィードバックを作成する
    async fn create(&self, feedback: &NewFeedback) -> Result<serde_json::Value, ApiError>;
    /// フィードバックを削除する
    async fn delete(&self, id: FeedbackId) -> Result<(), ApiError>;
}

/// フィードバックID
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct FeedbackId(u64);

impl Id for FeedbackId {
    type Inner = u64;
}

/// 1〜5 の評価
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, Deref)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, FeedbackError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(FeedbackError::RatingOutOfRange);
        }
        Ok(Self(value))
    }
}

impl TryFrom<u8> for Rating {
    type Error = FeedbackError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(value: Rating) -> Self {
        value.0
    }
}

/// フィードバックエンティティ
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: FeedbackId,
    pub reservation_id: ReservationId,
    pub user_id: UserId,
    pub court_id: CourtId,
    pub rating: u8,
    pub comment: Option<String>,
    pub date: String,
    pub user_name: Option<String>,
}

impl Entity for Feedback {
    type Id = FeedbackId;

    const ENTITY_NAME: &'static str = "feedback";

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// 新規フィードバック
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFeedback {
    pub reservation_id: ReservationId,
    pub user_id: UserId,
    pub rating: Rating,
    pub comment: Option<String>,
}

impl NewFeedback {
    /// 空のコメントは送らない
    pub fn new(
        reservation_id: ReservationId,
        user_id: UserId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Self, FeedbackError> {
        Ok(Self {
            reservation_id,
            user_id,
            rating: Rating::new(rating)?,
            comment: comment.filter(|c| !c.trim().is_empty()),
        })
    }
}

/// フィードバックエラー
#[derive(Debug, Display, Error)]
pub enum FeedbackError {
    /// 評価が範囲外
    #[display(fmt = "Rating must be between 1 and 5")]
    RatingOutOfRange,
    /// 送信に失敗した
    #[display(fmt = "{}", _0)]
    Api(#[error(source)] ApiError),
}

impl From<ApiError> for FeedbackError {
    fn from(value: ApiError) -> Self {
        FeedbackError::Api(value)
    }
}

/// 評価の平均。フィードバックが無ければ 0
pub fn average_rating(feedbacks: &[Feedback]) -> f64 {
    if feedbacks.is_empty() {
        return 0.0;
    }
    let sum: u32 = feedbacks.iter().map(|f| u32::from(f.rating)).sum();
    f64::from(sum) / feedbacks.len() as f64
}

/// フィードバックの参照・投稿と評価集計
pub struct FeedbackService<R> {
    repository: R,
}

impl<R: FeedbackRepository> FeedbackService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// 取得失敗時は空を返す
    pub async fn list_for_court(&self, court_id: CourtId) -> Vec<Feedback> {
        match self.repository.find_by_court(court_id).await {
            Ok(feedbacks) => feedbacks,
            Err(e) => {
                error!("フィードバックの取得に失敗 cancha={}: {}", court_id, e);
                Vec::new()
            }
        }
    }

    pub async fn average_for_court(&self, court_id: CourtId) -> f64 {
        let feedbacks = self.list_for_court(court_id).await;
        let average = average_rating(&feedbacks);
        debug!(
            "cancha={} feedbacks={} promedio={}",
            court_id,
            feedbacks.len(),
            average
        );
        average
    }

    /// 複数コートの平均評価を並行して取得する
    pub async fn averages_for_courts(&self, court_ids: &[CourtId]) -> HashMap<CourtId, f64> {
        let averages = join_all(court_ids.iter().map(|id| self.average_for_court(*id))).await;
        court_ids.iter().copied().zip(averages).collect()
    }

    pub async fn submit(&self, feedback: &NewFeedback) -> Result<serde_json::Value, FeedbackError> {
        info!(
            "フィードバックを送信 reserva={} calificacion={}",
            feedback.reservation_id, feedback.rating
        );
        Ok(self.repository.create(feedback).await?)
    }

    pub async fn delete(&self, id: FeedbackId) -> Result<(), ApiError> {
        info!("フィードバックを削除 id={}", id);
        self.repository.delete(id).await
    }
}
