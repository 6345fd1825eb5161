use std::fmt;

use async_trait::async_trait;
use derive_more::{Deref, Display, From};
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::{ApiError, Entity, Id};

/// コートのリポジトリ
#[async_trait]
pub trait CourtRepository: Send + Sync {
    /// 全コートを取得する（競技名は結合済み）
    async fn find_all(&self) -> Result<Vec<Court>, ApiError>;
    /// IDでコートを取得する
    async fn find_by_id(&self, id: CourtId) -> Result<Court, ApiError>;
}

/// コートID
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct CourtId(u64);

impl Id for CourtId {
    type Inner = u64;
}

/// 競技ID
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct SportId(u64);

impl Id for SportId {
    type Inner = u64;
}

/// 1時間あたりの料金
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Price(f64);

impl Price {
    pub fn new(amount: f64) -> Self {
        Self(amount)
    }

    pub fn amount(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Price {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cents = (self.0 * 100.0).round() as i64;
        let sign = if cents < 0 { "-" } else { "" };
        let whole = (cents.abs() / 100).to_formatted_string(&Locale::en);
        match cents.abs() % 100 {
            0 => write!(f, "{}${}", sign, whole),
            fraction => write!(f, "{}${}.{:02}", sign, whole, fraction),
        }
    }
}

/// コートエンティティ
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Court {
    pub id: CourtId,
    pub code: String,
    pub name: String,
    pub sport: String,
    pub image: String,
    pub color: String,
    pub price: Price,
}

impl Court {
    pub const UNKNOWN_SPORT: &'static str = "desconocido";
    pub const DEFAULT_COLOR: &'static str = "#000000";
}

impl Entity for Court {
    type Id = CourtId;

    const ENTITY_NAME: &'static str = "cancha";

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// 競技
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sport {
    pub id: SportId,
    pub name: String,
}

/// コート一覧・詳細の取得
pub struct CourtService<R> {
    repository: R,
}

impl<R: CourtRepository> CourtService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// 一覧の取得に失敗した場合は空のリストを返す
    pub async fn list(&self) -> Vec<Court> {
        match self.repository.find_all().await {
            Ok(courts) => courts,
            Err(e) => {
                error!("コート一覧の取得に失敗: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get(&self, id: CourtId) -> Result<Court, ApiError> {
        self.repository.find_by_id(id).await.map_err(|e| {
            error!("{} {} の取得に失敗: {}", Court::ENTITY_NAME, id, e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingRepository;

    #[async_trait]
    impl CourtRepository for FailingRepository {
        async fn find_all(&self) -> Result<Vec<Court>, ApiError> {
            Err(ApiError::Timeout)
        }

        async fn find_by_id(&self, _id: CourtId) -> Result<Court, ApiError> {
            Err(ApiError::Rejected {
                status: 404,
                detail: "Cancha no encontrada".to_owned(),
            })
        }
    }

    #[test]
    fn test_price_display() {
        assert_eq!(Price::new(15000.0).to_string(), "$15,000");
        assert_eq!(Price::new(1234.5).to_string(), "$1,234.50");
        assert_eq!(Price::new(0.0).to_string(), "$0");
    }

    #[tokio::test]
    async fn test_list_degrades_to_empty() {
        let service = CourtService::new(FailingRepository);
        assert!(service.list().await.is_empty());
        assert!(matches!(
            service.get(1.into()).await,
            Err(ApiError::Rejected { status: 404, .. })
        ));
    }
}
