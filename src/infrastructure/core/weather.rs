use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::{
    core::{Weather, WeatherReport, WeatherRepository},
    ApiError,
};
use crate::infrastructure::ApiClient;

use super::API_PREFIX;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClimaDto {
    fecha: String,
    temperatura_max: f64,
    temperatura_min: f64,
    probabilidad_precipitacion: f64,
    codigo_clima: u16,
}

#[derive(Debug, Deserialize)]
struct ClimaResponseDto {
    #[serde(default)]
    success: bool,
    data: Option<ClimaDto>,
    error: Option<String>,
}

impl From<ClimaResponseDto> for WeatherReport {
    fn from(value: ClimaResponseDto) -> Self {
        match (value.success, value.data) {
            (true, Some(data)) => WeatherReport::Available(Weather {
                date: data.fecha,
                max_temperature: data.temperatura_max,
                min_temperature: data.temperatura_min,
                precipitation_probability: data.probabilidad_precipitacion,
                code: data.codigo_clima,
            }),
            _ => WeatherReport::Unavailable(value.error.unwrap_or_default()),
        }
    }
}

/// REST API 上の天気予報
#[derive(Clone)]
pub struct HttpWeatherRepository {
    client: ApiClient,
}

impl HttpWeatherRepository {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WeatherRepository for HttpWeatherRepository {
    async fn find_by_date(&self, date: NaiveDate) -> Result<WeatherReport, ApiError> {
        let response: ClimaResponseDto = self
            .client
            .get(
                &format!("{}/clima", API_PREFIX),
                &[("fecha", date.to_string())],
            )
            .await?;
        Ok(response.into())
    }
}
