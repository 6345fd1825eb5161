use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::{
    domain::{
        auth::{
            AuthGateway, AuthResponse, Credentials, IdentityProvider, LoginEncoding,
            ProviderCredential, Registration,
        },
        ApiError,
    },
    infrastructure::ApiClient,
    CanchaConfig,
};

use super::core::API_PREFIX;

#[derive(Debug, Serialize)]
struct LoginDto<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterDto<'a> {
    nombre: &'a str,
    email: &'a str,
    password: &'a str,
    telefono: &'a str,
}

#[derive(Debug, Serialize)]
struct FirebaseLoginDto<'a> {
    id_token: &'a str,
}

/// バックエンドの認証エンドポイント
#[derive(Clone)]
pub struct HttpAuthGateway {
    client: ApiClient,
}

impl HttpAuthGateway {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(
        &self,
        credentials: &Credentials,
        encoding: LoginEncoding,
    ) -> Result<AuthResponse, ApiError> {
        let path = format!("{}/auth/login", API_PREFIX);
        match encoding {
            LoginEncoding::Json => {
                let body = LoginDto {
                    email: &credentials.email,
                    password: &credentials.password,
                };
                self.client.post_json(&path, &[], &body).await
            }
            LoginEncoding::Form => {
                let form = [
                    ("username", credentials.email.as_str()),
                    ("password", credentials.password.as_str()),
                ];
                self.client.post_form(&path, &form).await
            }
        }
    }

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        let body = RegisterDto {
            nombre: &registration.name,
            email: &registration.email,
            password: &registration.password,
            telefono: registration.phone.as_deref().unwrap_or_default(),
        };
        self.client
            .post_json(&format!("{}/auth/register", API_PREFIX), &[], &body)
            .await
    }

    async fn exchange(&self, credential: &ProviderCredential) -> Result<AuthResponse, ApiError> {
        let body = FirebaseLoginDto {
            id_token: &credential.id_token,
        };
        self.client
            .post_json(&format!("{}/auth/firebase", API_PREFIX), &[], &body)
            .await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpDto<'a> {
    post_body: String,
    request_uri: &'a str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpResponseDto {
    id_token: String,
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
}

/// Firebase Authentication（Identity Toolkit REST API）
#[derive(Clone)]
pub struct FirebaseIdentityProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    request_uri: String,
}

impl FirebaseIdentityProvider {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        request_uri: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            request_uri: request_uri.to_owned(),
        })
    }

    pub fn from_config(config: &CanchaConfig) -> Result<Self, ApiError> {
        Self::new(
            &config.firebase.endpoint,
            &config.firebase.api_key,
            &config.firebase.request_uri,
            Duration::from_millis(config.api.timeout_ms),
        )
    }

    /// `id_token=...&providerId=google.com` をURLエンコードして作る
    fn post_body(id_token: &str, access_token: Option<&str>) -> Result<String, ApiError> {
        let mut params = vec![("id_token", id_token), ("providerId", "google.com")];
        if let Some(access_token) = access_token {
            params.push(("access_token", access_token));
        }
        let url = Url::parse_with_params("http://localhost/", &params)
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(url.query().unwrap_or_default().to_owned())
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn sign_in_with_google(
        &self,
        id_token: &str,
        access_token: Option<&str>,
    ) -> Result<ProviderCredential, ApiError> {
        let body = SignInWithIdpDto {
            post_body: Self::post_body(id_token, access_token)?,
            request_uri: &self.request_uri,
            return_idp_credential: true,
            return_secure_token: true,
        };
        debug!("Firebase signInWithIdp");
        let response = self
            .http
            .post(format!("{}/accounts:signInWithIdp", self.endpoint))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or_default();
            let detail = body["error"]["message"]
                .as_str()
                .unwrap_or_default()
                .to_owned();
            error!("Firebase Error Response: {} {}", status.as_u16(), detail);
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }
        let credential: SignInWithIdpResponseDto = response.json().await?;
        Ok(ProviderCredential {
            id_token: credential.id_token,
            local_id: credential.local_id,
            email: credential.email,
            display_name: credential.display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{
        body::Bytes,
        extract::{Query, State},
        http::{HeaderMap, StatusCode, Uri},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use serde_json::json;

    use super::*;
    use crate::domain::auth::{AuthService, AuthWatcher, SessionStore, User};
    use crate::domain::core::ReservationService;
    use crate::infrastructure::core::HttpReservationRepository;
    use crate::testing::{client, serve};

    type Log = Arc<Mutex<Vec<String>>>;

    /// JSON を 422 で拒否し、フォーム形式だけ受け付けるログイン
    async fn legacy_login(State(log): State<Log>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let body = String::from_utf8_lossy(&body).into_owned();
        log.lock().unwrap().push(format!("{} {}", content_type, body));
        if content_type.starts_with("application/x-www-form-urlencoded") {
            (
                StatusCode::OK,
                Json(json!({ "access_token": "jwt-form", "token_type": "bearer", "user_id": 42 })),
            )
        } else {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": [{ "loc": ["body", "username"], "msg": "field required" }] })),
            )
        }
    }

    #[tokio::test]
    async fn test_login_retries_with_form_encoding() {
        let log = Log::default();
        let router = Router::new()
            .route("/api/v1/auth/login", post(legacy_login))
            .with_state(log.clone());
        let base_url = serve(router);
        let (client, store) = client(&base_url);
        let provider = FirebaseIdentityProvider::new(
            &base_url,
            "key",
            "http://localhost",
            Duration::from_secs(1),
        )
        .unwrap();
        let service = AuthService::new(HttpAuthGateway::new(client), provider, store.clone());

        let session = service
            .login(&Credentials {
                email: "ana@example.com".to_owned(),
                password: "p@ss word".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(session.token, "jwt-form");
        assert_eq!(
            store.user().await.unwrap(),
            Some(User::basic(42.into(), "ana@example.com"))
        );

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[0].starts_with("application/json"));
        assert!(log[1].ends_with("username=ana%40example.com&password=p%40ss+word"));
    }

    #[tokio::test]
    async fn test_register_sends_empty_phone() {
        let router = Router::new().route(
            "/api/v1/auth/register",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["telefono"], "");
                Json(json!({
                    "access_token": "jwt-new",
                    "token_type": "bearer",
                    "user": {
                        "id_usuario": 5,
                        "nombre": body["nombre"],
                        "email": body["email"]
                    }
                }))
            }),
        );
        let base_url = serve(router);
        let (client, store) = client(&base_url);
        let gateway = HttpAuthGateway::new(client);
        let response = gateway
            .register(&Registration {
                name: "Luis".to_owned(),
                email: "luis@example.com".to_owned(),
                password: "secreto".to_owned(),
                phone: None,
            })
            .await
            .unwrap();
        assert_eq!(response.access_token.as_deref(), Some("jwt-new"));
        assert_eq!(response.user.unwrap().name, "Luis");
        assert_eq!(store.token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_google_login_through_firebase() {
        let firebase = Router::new().fallback(
            |uri: Uri, Query(query): Query<HashMap<String, String>>, Json(body): Json<Value>| async move {
                assert_eq!(uri.path(), "/accounts:signInWithIdp");
                assert_eq!(query.get("key").map(String::as_str), Some("api-key"));
                assert_eq!(body["postBody"], "id_token=google-jwt&providerId=google.com");
                assert_eq!(body["returnSecureToken"], true);
                Json(json!({
                    "idToken": "firebase-jwt",
                    "localId": "uid-1",
                    "email": "ana@example.com",
                    "displayName": "Ana Pérez"
                }))
            },
        );
        let backend = Router::new().route(
            "/api/v1/auth/firebase",
            post(|Json(body): Json<Value>| async move {
                if body["id_token"] != "firebase-jwt" {
                    return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "invalid" })));
                }
                (
                    StatusCode::OK,
                    Json(json!({ "access_token": "jwt-backend", "user_id": 9 })),
                )
            }),
        );
        let firebase_url = serve(firebase);
        let backend_url = serve(backend);
        let (client, store) = client(&backend_url);
        let provider =
            FirebaseIdentityProvider::new(&firebase_url, "api-key", "http://localhost", Duration::from_secs(5))
                .unwrap();
        let service = AuthService::new(HttpAuthGateway::new(client), provider, store.clone());

        let session = service.login_with_google("google-jwt", None).await.unwrap();
        assert_eq!(session.token, "jwt-backend");
        let user = store.user().await.unwrap().unwrap();
        assert_eq!(*user.id, 9);
        assert_eq!(user.name, "Ana Pérez");
        assert!(service.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_expired_token_logs_out_until_next_login() {
        let router = Router::new()
            .route(
                "/api/v1/auth/login",
                post(|| async {
                    Json(json!({ "access_token": "jwt", "token_type": "bearer", "user_id": 7 }))
                }),
            )
            .route(
                "/api/v1/reservas/:id",
                axum::routing::delete(|| async {
                    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Token expirado" })))
                }),
            );
        let base_url = serve(router);
        let (client, store) = client(&base_url);
        let provider = FirebaseIdentityProvider::new(
            &base_url,
            "key",
            "http://localhost",
            Duration::from_secs(1),
        )
        .unwrap();
        let service = AuthService::new(HttpAuthGateway::new(client.clone()), provider, store.clone());
        let reservations = ReservationService::new(HttpReservationRepository::new(client));
        let credentials = Credentials {
            email: "ana@example.com".to_owned(),
            password: "secreto".to_owned(),
        };

        service.login(&credentials).await.unwrap();
        assert!(service.is_authenticated().await);
        let watcher = AuthWatcher::spawn(store.clone(), Duration::from_millis(10)).await;
        assert!(watcher.is_authenticated());
        let mut receiver = watcher.subscribe();

        assert!(matches!(
            reservations.cancel(1.into()).await,
            Err(ApiError::Unauthorized)
        ));
        assert!(!service.is_authenticated().await);
        assert_eq!(service.current_user().await.unwrap(), None);
        tokio::time::timeout(Duration::from_secs(2), receiver.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(!*receiver.borrow());

        service.login(&credentials).await.unwrap();
        assert!(service.is_authenticated().await);
        tokio::time::timeout(Duration::from_secs(2), receiver.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*receiver.borrow());
    }

    #[tokio::test]
    async fn test_firebase_error_message() {
        let firebase = Router::new().fallback(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "code": 400, "message": "INVALID_IDP_RESPONSE" } })),
            )
        });
        let firebase_url = serve(firebase);
        let provider =
            FirebaseIdentityProvider::new(&firebase_url, "api-key", "http://localhost", Duration::from_secs(5))
                .unwrap();
        match provider.sign_in_with_google("bad", Some("ya29.token")).await {
            Err(ApiError::Rejected { status, detail }) => {
                assert_eq!(status, 400);
                assert_eq!(detail, "INVALID_IDP_RESPONSE");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_post_body_is_encoded() {
        assert_eq!(
            FirebaseIdentityProvider::post_body("a.b+c", Some("ya29/x")).unwrap(),
            "id_token=a.b%2Bc&providerId=google.com&access_token=ya29%2Fx"
        );
    }
}
