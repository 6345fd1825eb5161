use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::domain::{
    auth::UserId,
    core::{
        hhmm, CourtId, NewReservation, Price, Reservation, ReservationFilter, ReservationId,
        ReservationRepository, ReservationStatus,
    },
    ApiError, Entity,
};
use crate::infrastructure::{decode_rows, ApiClient};

use super::API_PREFIX;

/// `GET /reservas/` の要素
#[serde_as]
#[derive(Debug, Deserialize)]
struct ReservaDto {
    id_reserva: ReservationId,
    id_usuario: Option<UserId>,
    id_cancha: CourtId,
    fecha: NaiveDate,
    #[serde(with = "hhmm")]
    hora: NaiveTime,
    duracion: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    precio_total: Option<f64>,
    #[serde(default)]
    estado: Option<String>,
}

impl From<ReservaDto> for Reservation {
    fn from(value: ReservaDto) -> Self {
        Reservation {
            id: value.id_reserva,
            user_id: value.id_usuario,
            court_id: value.id_cancha,
            date: value.fecha,
            time: value.hora,
            duration: value.duracion,
            total_price: value.precio_total.map(Price::new),
            status: value
                .estado
                .map(ReservationStatus::from)
                .unwrap_or_default(),
        }
    }
}

/// `POST /reservas/` の本文
#[derive(Debug, Serialize)]
struct CreateReservaDto {
    id_usuario: UserId,
    id_cancha: CourtId,
    fecha: NaiveDate,
    #[serde(with = "hhmm")]
    hora: NaiveTime,
    duracion: u32,
    precio_total: f64,
    estado: ReservationStatus,
}

impl From<&NewReservation> for CreateReservaDto {
    fn from(value: &NewReservation) -> Self {
        CreateReservaDto {
            id_usuario: value.user_id,
            id_cancha: value.court_id,
            fecha: value.date,
            hora: value.time,
            duracion: value.duration,
            precio_total: value.total_price.amount(),
            estado: value.status.clone(),
        }
    }
}

/// REST API 上の予約
#[derive(Clone)]
pub struct HttpReservationRepository {
    client: ApiClient,
}

impl HttpReservationRepository {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReservationRepository for HttpReservationRepository {
    async fn find(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, ApiError> {
        let mut query = Vec::new();
        if let Some(user_id) = filter.user_id {
            query.push(("usuario_id", user_id.to_string()));
        }
        if let Some(court_id) = filter.court_id {
            query.push(("cancha_id", court_id.to_string()));
        }
        if let Some(date) = filter.date {
            query.push(("fecha", date.to_string()));
        }
        let rows = self
            .client
            .get(&format!("{}/reservas/", API_PREFIX), &query)
            .await?;
        Ok(decode_rows::<ReservaDto>(rows, Reservation::ENTITY_NAME)
            .into_iter()
            .map(Reservation::from)
            .collect())
    }

    async fn create(&self, reservation: &NewReservation) -> Result<serde_json::Value, ApiError> {
        self.client
            .post_json(
                &format!("{}/reservas/", API_PREFIX),
                &[],
                &CreateReservaDto::from(reservation),
            )
            .await
    }

    async fn delete(&self, id: ReservationId) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/reservas/{}", API_PREFIX, id))
            .await?;
        Ok(())
    }
}
