use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::domain::{
    auth::UserId,
    core::{
        CourtId, Feedback, FeedbackId, FeedbackRepository, NewFeedback, Rating, ReservationId,
    },
    ApiError, Entity,
};
use crate::infrastructure::{decode_rows, ApiClient};

use super::API_PREFIX;

/// `GET /feedbacks/cancha/{id}` の要素
#[serde_as]
#[derive(Debug, Deserialize)]
struct FeedbackDto {
    id_feedback: FeedbackId,
    id_reserva: ReservationId,
    id_usuario: UserId,
    id_cancha: CourtId,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    calificacion: u8,
    comentario: Option<String>,
    #[serde(default)]
    fecha: String,
    usuario_nombre: Option<String>,
}

impl From<FeedbackDto> for Feedback {
    fn from(value: FeedbackDto) -> Self {
        Feedback {
            id: value.id_feedback,
            reservation_id: value.id_reserva,
            user_id: value.id_usuario,
            court_id: value.id_cancha,
            rating: value.calificacion,
            comment: value.comentario,
            date: value.fecha,
            user_name: value.usuario_nombre,
        }
    }
}

/// `POST /feedbacks/reserva/{id}` の本文
#[derive(Debug, Serialize)]
struct CreateFeedbackDto<'a> {
    calificacion: Rating,
    #[serde(skip_serializing_if = "Option::is_none")]
    comentario: Option<&'a str>,
}

/// REST API 上のフィードバック
#[derive(Clone)]
pub struct HttpFeedbackRepository {
    client: ApiClient,
}

impl HttpFeedbackRepository {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedbackRepository for HttpFeedbackRepository {
    async fn find_by_court(&self, court_id: CourtId) -> Result<Vec<Feedback>, ApiError> {
        let rows = self
            .client
            .get(&format!("{}/feedbacks/cancha/{}", API_PREFIX, court_id), &[])
            .await?;
        Ok(decode_rows::<FeedbackDto>(rows, Feedback::ENTITY_NAME)
            .into_iter()
            .map(Feedback::from)
            .collect())
    }

    async fn create(&self, feedback: &NewFeedback) -> Result<serde_json::Value, ApiError> {
        let body = CreateFeedbackDto {
            calificacion: feedback.rating,
            comentario: feedback.comment.as_deref(),
        };
        self.client
            .post_json(
                &format!("{}/feedbacks/reserva/{}", API_PREFIX, feedback.reservation_id),
                &[("usuario_id", feedback.user_id.to_string())],
                &body,
            )
            .await
    }

    async fn delete(&self, id: FeedbackId) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/feedbacks/{}", API_PREFIX, id))
            .await?;
        Ok(())
    }
}
