use async_trait::async_trait;
use chrono::NaiveDate;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::ApiError;

/// 天気リポジトリ
#[async_trait]
pub trait WeatherRepository: Send + Sync {
    /// 指定日の天気予報を取得する
    async fn find_by_date(&self, date: NaiveDate) -> Result<WeatherReport, ApiError>;
}

/// 天気予報
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub date: String,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub precipitation_probability: f64,
    pub code: u16,
}

impl Weather {
    pub fn description(&self) -> &'static str {
        describe(self.code)
    }

    pub fn icon(&self) -> &'static str {
        icon(self.code)
    }
}

/// バックエンドの応答（成功フラグ付き）
#[derive(Clone, Debug, PartialEq)]
pub enum WeatherReport {
    Available(Weather),
    Unavailable(String),
}

/// 天気エラー
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum WeatherError {
    /// 日付が指定されていない
    #[display(fmt = "Fecha no válida")]
    InvalidDate,
    /// 天気を取得できなかった
    #[display(fmt = "{}", _0)]
    Unavailable(#[error(not(source))] String),
}

pub struct WeatherService<R> {
    repository: R,
}

impl<R: WeatherRepository> WeatherService<R> {
    pub const CONNECTION_ERROR: &'static str = "Error al conectar con el servicio de clima";

    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub async fn forecast(&self, date: Option<NaiveDate>) -> Result<Weather, WeatherError> {
        let date = date.ok_or(WeatherError::InvalidDate)?;
        match self.repository.find_by_date(date).await {
            Ok(WeatherReport::Available(weather)) => Ok(weather),
            Ok(WeatherReport::Unavailable(message)) if message.is_empty() => Err(
                WeatherError::Unavailable(Self::CONNECTION_ERROR.to_owned()),
            ),
            Ok(WeatherReport::Unavailable(message)) => Err(WeatherError::Unavailable(message)),
            Err(e) => {
                error!("天気の取得に失敗 fecha={}: {}", date, e);
                let message = match e {
                    ApiError::Rejected { detail, .. } if !detail.is_empty() => detail,
                    _ => Self::CONNECTION_ERROR.to_owned(),
                };
                Err(WeatherError::Unavailable(message))
            }
        }
    }
}

/// WMO 天気コードの説明
pub fn describe(code: u16) -> &'static str {
    match code {
        0 => "Despejado",
        1 => "Principalmente despejado",
        2 => "Parcialmente nublado",
        3 => "Nublado",
        45 => "Niebla",
        48 => "Niebla con escarcha",
        51 => "Llovizna ligera",
        53 => "Llovizna moderada",
        55 => "Llovizna intensa",
        61 => "Lluvia ligera",
        63 => "Lluvia moderada",
        65 => "Lluvia intensa",
        71 => "Nevada ligera",
        73 => "Nevada moderada",
        75 => "Nevada intensa",
        77 => "Granizo",
        80 => "Chubascos ligeros",
        81 => "Chubascos moderados",
        82 => "Chubascos intensos",
        85 => "Nevadas ligeras",
        86 => "Nevadas intensas",
        95 => "Tormenta",
        96 => "Tormenta con granizo ligero",
        99 => "Tormenta con granizo intenso",
        _ => "Desconocido",
    }
}

pub fn icon(code: u16) -> &'static str {
    match code {
        0 | 1 => "☀️",
        2 | 3 => "⛅",
        45 | 48 => "🌫️",
        51..=55 => "🌦️",
        61..=65 | 80..=82 => "🌧️",
        71..=77 | 85..=86 => "❄️",
        95..=99 => "⛈️",
        _ => "🌤️",
    }
}
