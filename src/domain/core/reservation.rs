use std::fmt;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::domain::{auth::UserId, ApiError, Entity, Id};

use super::{hhmm, CourtId, Price};

/// 予約リポジトリ
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// 条件に合う予約を検索する（キャンセル済みを含む）
    async fn find(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, ApiError>;
    /// 予約を作成する
    async fn create(&self, reservation: &NewReservation) -> Result<serde_json::Value, ApiError>;
    /// 予約を削除する
    async fn delete(&self, id: ReservationId) -> Result<(), ApiError>;
}

/// 予約ID
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct ReservationId(u64);

impl Id for ReservationId {
    type Inner = u64;
}

/// 予約ステータス
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReservationStatus {
    #[default]
    Reserved,
    Cancelled,
    Other(String),
}

impl ReservationStatus {
    /// キャンセル済み以外はすべて有効とみなす
    pub fn is_active(&self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }
}

impl From<String> for ReservationStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Reservada" => ReservationStatus::Reserved,
            "Cancelada" => ReservationStatus::Cancelled,
            _ => ReservationStatus::Other(value),
        }
    }
}

impl From<ReservationStatus> for String {
    fn from(value: ReservationStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationStatus::Reserved => f.write_str("Reservada"),
            ReservationStatus::Cancelled => f.write_str("Cancelada"),
            ReservationStatus::Other(s) => f.write_str(s),
        }
    }
}

/// 予約エンティティ
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: Option<UserId>,
    pub court_id: CourtId,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub duration: Option<u32>,
    pub total_price: Option<Price>,
    pub status: ReservationStatus,
}

impl Entity for Reservation {
    type Id = ReservationId;

    const ENTITY_NAME: &'static str = "reserva";

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// 予約の検索条件
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub user_id: Option<UserId>,
    pub court_id: Option<CourtId>,
    pub date: Option<NaiveDate>,
}

impl ReservationFilter {
    pub fn by_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn by_court_and_date(court_id: CourtId, date: NaiveDate) -> Self {
        Self {
            court_id: Some(court_id),
            date: Some(date),
            ..Self::default()
        }
    }
}

/// 新規予約
#[derive(Clone, Debug, PartialEq)]
pub struct NewReservation {
    pub user_id: UserId,
    pub court_id: CourtId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration: u32,
    pub total_price: Price,
    pub status: ReservationStatus,
}

impl NewReservation {
    pub const DEFAULT_DURATION: u32 = 60;

    /// 料金は作成時点のコート料金をコピーする
    pub fn new(user_id: UserId, court_id: CourtId, date: NaiveDate, time: NaiveTime, price: Price) -> Self {
        Self {
            user_id,
            court_id,
            date,
            time,
            duration: Self::DEFAULT_DURATION,
            total_price: price,
            status: ReservationStatus::Reserved,
        }
    }
}

/// 予約の参照・作成・キャンセル
pub struct ReservationService<R> {
    repository: R,
}

impl<R: ReservationRepository> ReservationService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// ユーザーの有効な予約。取得失敗時は空を返す
    pub async fn list_for_user(&self, user_id: UserId) -> Vec<Reservation> {
        self.active(&ReservationFilter::by_user(user_id)).await
    }

    /// コートと日付で絞り込んだ有効な予約。取得失敗時は空を返す
    pub async fn list_for_court_and_date(
        &self,
        court_id: CourtId,
        date: NaiveDate,
    ) -> Vec<Reservation> {
        self.active(&ReservationFilter::by_court_and_date(court_id, date))
            .await
    }

    /// 予約済みの時刻
    pub async fn booked_times(&self, court_id: CourtId, date: NaiveDate) -> Vec<NaiveTime> {
        let times: Vec<NaiveTime> = self
            .list_for_court_and_date(court_id, date)
            .await
            .into_iter()
            .map(|r| r.time)
            .collect();
        info!("予約済み時刻 cancha={} fecha={}: {:?}", court_id, date, times);
        times
    }

    pub async fn create(&self, reservation: &NewReservation) -> Result<serde_json::Value, ApiError> {
        info!(
            "予約を作成 cancha={} fecha={} hora={}",
            reservation.court_id, reservation.date, reservation.time
        );
        self.repository.create(reservation).await
    }

    pub async fn cancel(&self, id: ReservationId) -> Result<(), ApiError> {
        info!("予約をキャンセル id={}", id);
        self.repository.delete(id).await
    }

    async fn active(&self, filter: &ReservationFilter) -> Vec<Reservation> {
        match self.repository.find(filter).await {
            Ok(reservations) => reservations
                .into_iter()
                .filter(|r| r.status.is_active())
                .collect(),
            Err(e) => {
                error!("予約の取得に失敗: {}", e);
                Vec::new()
            }
        }
    }
}
