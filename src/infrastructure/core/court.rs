use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::domain::{
    core::{Court, CourtId, CourtRepository, Price, Sport, SportId},
    ApiError, Entity,
};
use crate::infrastructure::{decode_rows, ApiClient};

use super::API_PREFIX;

/// `GET /canchas/` の要素
#[serde_as]
#[derive(Debug, Deserialize)]
struct CanchaDto {
    id_cancha: CourtId,
    #[serde(default)]
    codigo: String,
    nombre: String,
    id_deporte: Option<SportId>,
    imagen_url: Option<String>,
    color: Option<String>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    precio_hora: f64,
}

/// `GET /deportes/` の要素
#[derive(Debug, Deserialize)]
struct DeporteDto {
    id_deporte: SportId,
    nombre: String,
}

impl From<DeporteDto> for Sport {
    fn from(value: DeporteDto) -> Self {
        Sport {
            id: value.id_deporte,
            name: value.nombre,
        }
    }
}

impl CanchaDto {
    fn into_court(self, sports: &HashMap<SportId, String>) -> Court {
        let sport = self
            .id_deporte
            .and_then(|id| sports.get(&id).cloned())
            .unwrap_or_else(|| Court::UNKNOWN_SPORT.to_owned());
        Court {
            id: self.id_cancha,
            code: self.codigo,
            name: self.nombre,
            sport,
            image: self.imagen_url.unwrap_or_default(),
            color: self
                .color
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| Court::DEFAULT_COLOR.to_owned()),
            price: Price::new(self.precio_hora),
        }
    }
}

/// REST API 上のコート
#[derive(Clone)]
pub struct HttpCourtRepository {
    client: ApiClient,
}

impl HttpCourtRepository {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn find_sports(&self) -> Result<Vec<Sport>, ApiError> {
        let rows = self
            .client
            .get(&format!("{}/deportes/", API_PREFIX), &[])
            .await?;
        Ok(decode_rows::<DeporteDto>(rows, "deporte")
            .into_iter()
            .map(Sport::from)
            .collect())
    }

    async fn sport_names(&self) -> Result<HashMap<SportId, String>, ApiError> {
        Ok(self
            .find_sports()
            .await?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect())
    }
}

#[async_trait]
impl CourtRepository for HttpCourtRepository {
    async fn find_all(&self) -> Result<Vec<Court>, ApiError> {
        let path = format!("{}/canchas/", API_PREFIX);
        let (rows, sports) = futures::try_join!(
            self.client.get::<Option<Vec<Value>>>(&path, &[]),
            self.sport_names()
        )?;
        Ok(decode_rows::<CanchaDto>(rows, Court::ENTITY_NAME)
            .into_iter()
            .map(|c| c.into_court(&sports))
            .collect())
    }

    async fn find_by_id(&self, id: CourtId) -> Result<Court, ApiError> {
        let path = format!("{}/canchas/{}", API_PREFIX, id);
        let (court, sports) = futures::try_join!(
            self.client.get::<CanchaDto>(&path, &[]),
            self.sport_names()
        )?;
        Ok(court.into_court(&sports))
    }
}
