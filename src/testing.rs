//! テスト用の共通フィクスチャと偽装実装

use std::{
    collections::VecDeque,
    net::{SocketAddr, TcpListener},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;

use crate::{
    domain::{
        auth::{
            AuthGateway, AuthResponse, Credentials, IdentityProvider, LoginEncoding,
            ProviderCredential, Registration, SessionStore,
        },
        core::{
            parse_time, Court, CourtId, Feedback, FeedbackId, FeedbackRepository, NewFeedback,
            NewReservation, Price, Reservation, ReservationFilter, ReservationId,
            ReservationRepository,
        },
        ApiError,
    },
    infrastructure::{ApiClient, MemorySessionStore},
};

pub fn court(id: u64, price: f64) -> Court {
    Court {
        id: id.into(),
        code: format!("C{}", id),
        name: format!("Cancha {}", id),
        sport: "Futbol".to_owned(),
        image: String::new(),
        color: Court::DEFAULT_COLOR.to_owned(),
        price: Price::new(price),
    }
}

pub fn reservation(id: u64, court: u64, date: &str, time: &str, status: &str) -> Reservation {
    Reservation {
        id: id.into(),
        user_id: Some(7.into()),
        court_id: court.into(),
        date: date.parse().unwrap(),
        time: parse_time(time).unwrap(),
        duration: Some(60),
        total_price: Some(Price::new(15000.0)),
        status: status.to_owned().into(),
    }
}

pub fn feedback(id: u64, court: u64, rating: u8) -> Feedback {
    Feedback {
        id: id.into(),
        reservation_id: id.into(),
        user_id: 7.into(),
        court_id: court.into(),
        rating,
        comment: None,
        date: "2026-10-01".to_owned(),
        user_name: None,
    }
}

/// メモリ上で動く予約リポジトリ
#[derive(Default)]
pub struct MemoryReservationRepository {
    pub reservations: Mutex<Vec<Reservation>>,
}

#[async_trait]
impl ReservationRepository for MemoryReservationRepository {
    async fn find(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, ApiError> {
        let reservations = self.reservations.lock().unwrap();
        Ok(reservations
            .iter()
            .filter(|r| filter.user_id.map_or(true, |id| r.user_id == Some(id)))
            .filter(|r| filter.court_id.map_or(true, |id| r.court_id == id))
            .filter(|r| filter.date.map_or(true, |date| r.date == date))
            .cloned()
            .collect())
    }

    async fn create(&self, new: &NewReservation) -> Result<serde_json::Value, ApiError> {
        let mut reservations = self.reservations.lock().unwrap();
        let id = ReservationId::from(reservations.len() as u64 + 1);
        reservations.push(Reservation {
            id,
            user_id: Some(new.user_id),
            court_id: new.court_id,
            date: new.date,
            time: new.time,
            duration: Some(new.duration),
            total_price: Some(new.total_price),
            status: new.status.clone(),
        });
        Ok(serde_json::json!({ "id_reserva": *id }))
    }

    async fn delete(&self, id: ReservationId) -> Result<(), ApiError> {
        let mut reservations = self.reservations.lock().unwrap();
        let before = reservations.len();
        reservations.retain(|r| r.id != id);
        if reservations.len() == before {
            return Err(ApiError::Rejected {
                status: 404,
                detail: "Reserva no encontrada".to_owned(),
            });
        }
        Ok(())
    }
}

/// メモリ上で動くフィードバックリポジトリ。`fail` で取得を失敗させる
#[derive(Default)]
pub struct MemoryFeedbackRepository {
    pub feedbacks: Mutex<Vec<Feedback>>,
    pub fail: Mutex<bool>,
}

#[async_trait]
impl FeedbackRepository for MemoryFeedbackRepository {
    async fn find_by_court(&self, court_id: CourtId) -> Result<Vec<Feedback>, ApiError> {
        if *self.fail.lock().unwrap() {
            return Err(ApiError::Network("connection refused".to_owned()));
        }
        Ok(self
            .feedbacks
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.court_id == court_id)
            .cloned()
            .collect())
    }

    async fn create(&self, new: &NewFeedback) -> Result<serde_json::Value, ApiError> {
        let mut feedbacks = self.feedbacks.lock().unwrap();
        let id = feedbacks.len() as u64 + 1;
        feedbacks.push(Feedback {
            id: id.into(),
            reservation_id: new.reservation_id,
            user_id: new.user_id,
            court_id: CourtId::default(),
            rating: *new.rating,
            comment: new.comment.clone(),
            date: "2026-10-01".to_owned(),
            user_name: None,
        });
        Ok(serde_json::json!({ "id_feedback": id }))
    }

    async fn delete(&self, id: FeedbackId) -> Result<(), ApiError> {
        self.feedbacks.lock().unwrap().retain(|f| f.id != id);
        Ok(())
    }
}

/// 応答を順番に返す認証ゲートウェイ
#[derive(Default)]
pub struct FakeAuthGateway {
    logins: Mutex<VecDeque<Result<AuthResponse, ApiError>>>,
    registers: Mutex<VecDeque<Result<AuthResponse, ApiError>>>,
    exchanges: Mutex<VecDeque<Result<AuthResponse, ApiError>>>,
    encodings: Mutex<Vec<LoginEncoding>>,
    registrations: Mutex<Vec<Registration>>,
    exchanged: Mutex<Vec<String>>,
}

impl FakeAuthGateway {
    pub fn push_login(&self, response: Result<AuthResponse, ApiError>) {
        self.logins.lock().unwrap().push_back(response);
    }

    pub fn push_register(&self, response: Result<AuthResponse, ApiError>) {
        self.registers.lock().unwrap().push_back(response);
    }

    pub fn push_exchange(&self, response: Result<AuthResponse, ApiError>) {
        self.exchanges.lock().unwrap().push_back(response);
    }

    pub fn encodings(&self) -> Vec<LoginEncoding> {
        self.encodings.lock().unwrap().clone()
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations.lock().unwrap().clone()
    }

    pub fn exchanged(&self) -> Vec<String> {
        self.exchanged.lock().unwrap().clone()
    }

    fn next(queue: &Mutex<VecDeque<Result<AuthResponse, ApiError>>>) -> Result<AuthResponse, ApiError> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ApiError::Network("no response queued".to_owned())))
    }
}

#[async_trait]
impl AuthGateway for FakeAuthGateway {
    async fn login(
        &self,
        _credentials: &Credentials,
        encoding: LoginEncoding,
    ) -> Result<AuthResponse, ApiError> {
        self.encodings.lock().unwrap().push(encoding);
        Self::next(&self.logins)
    }

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        self.registrations.lock().unwrap().push(registration.clone());
        Self::next(&self.registers)
    }

    async fn exchange(&self, credential: &ProviderCredential) -> Result<AuthResponse, ApiError> {
        self.exchanged
            .lock()
            .unwrap()
            .push(credential.id_token.clone());
        Self::next(&self.exchanges)
    }
}

/// Google のトークンに接頭辞を付けて返すIDプロバイダー
#[derive(Default)]
pub struct FakeIdentityProvider;

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn sign_in_with_google(
        &self,
        id_token: &str,
        _access_token: Option<&str>,
    ) -> Result<ProviderCredential, ApiError> {
        Ok(ProviderCredential {
            id_token: format!("firebase:{}", id_token),
            local_id: "firebase-uid".to_owned(),
            email: Some("ana@example.com".to_owned()),
            display_name: Some("Ana Pérez".to_owned()),
        })
    }
}

/// スタブのバックエンドを空きポートで起動し、ベースURLを返す
pub fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(router.into_make_service());
    tokio::spawn(server);
    format!("http://{}", addr)
}

/// スタブに接続する ApiClient と、その保存先
pub fn client(base_url: &str) -> (ApiClient, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::default());
    let client = ApiClient::new(base_url, Duration::from_secs(5), store.clone()).unwrap();
    (client, store)
}

/// トークン保存済みのクライアント
pub async fn authorized_client(base_url: &str, token: &str) -> (ApiClient, Arc<MemorySessionStore>) {
    let (client, store) = client(base_url);
    store
        .save(&crate::domain::auth::Session {
            token: token.to_owned(),
            user: None,
        })
        .await
        .unwrap();
    (client, store)
}
