use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::domain::{ApiError, Entity, Id};

/// ユーザーID
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct UserId(u64);

impl Id for UserId {
    type Inner = u64;
}

/// ログイン中のユーザー（端末に保存する最小限の情報）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "id_usuario")]
    pub id: UserId,
    #[serde(rename = "nombre", default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "telefono", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl User {
    /// ログイン応答に `user_id` しか無い場合の簡易ユーザー
    pub fn basic(id: UserId, email: &str) -> Self {
        Self {
            id,
            name: email.split('@').next().unwrap_or_default().to_owned(),
            email: email.to_owned(),
            phone: None,
        }
    }
}

impl Entity for User {
    type Id = UserId;

    const ENTITY_NAME: &'static str = "usuario";

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// 認証セッション。トークンとユーザーは常に一緒に保存・破棄される
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: Option<User>,
}

/// メールアドレスとパスワード
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// 新規登録情報
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

/// ログイン送信形式
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoginEncoding {
    Json,
    Form,
}

/// バックエンドの認証応答
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// IDプロバイダーから受け取った資格情報
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderCredential {
    pub id_token: String,
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// 認証情報の保存先
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn token(&self) -> Result<Option<String>, ApiError>;
    async fn user(&self) -> Result<Option<User>, ApiError>;
    async fn save(&self, session: &Session) -> Result<(), ApiError>;
    async fn clear(&self) -> Result<(), ApiError>;
}

/// バックエンドの認証エンドポイント
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login(
        &self,
        credentials: &Credentials,
        encoding: LoginEncoding,
    ) -> Result<AuthResponse, ApiError>;
    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError>;
    /// プロバイダーのIDトークンをバックエンドのトークンと交換する
    async fn exchange(&self, credential: &ProviderCredential) -> Result<AuthResponse, ApiError>;
}

/// 外部IDプロバイダー（Google のトークンを Firebase の資格情報に交換する）
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_google(
        &self,
        id_token: &str,
        access_token: Option<&str>,
    ) -> Result<ProviderCredential, ApiError>;
}

/// ログイン・登録・ログアウト
pub struct AuthService<G, P> {
    gateway: G,
    provider: P,
    store: Arc<dyn SessionStore>,
}

impl<G: AuthGateway, P: IdentityProvider> AuthService<G, P> {
    pub fn new(gateway: G, provider: P, store: Arc<dyn SessionStore>) -> Self {
        Self {
            gateway,
            provider,
            store,
        }
    }

    /// JSON で送信し、422 で拒否された場合のみフォーム形式で再送する
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        info!("ログイン: {}", credentials.email);
        let response = match self.gateway.login(credentials, LoginEncoding::Json).await {
            Ok(response) => response,
            Err(e) if e.status() == Some(422) => {
                warn!("JSON でのログインが拒否されたためフォーム形式で再送: {}", e);
                match self.gateway.login(credentials, LoginEncoding::Form).await {
                    Ok(response) => response,
                    Err(retry) => {
                        error!("フォーム形式でのログインに失敗: {}", retry);
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                error!("ログインに失敗: {}", e);
                return Err(e);
            }
        };
        let user = response
            .user
            .clone()
            .or_else(|| response.user_id.map(|id| User::basic(id, &credentials.email)));
        self.persist(response, user).await
    }

    /// 応答にトークンが無ければ同じ資格情報でログインする
    pub async fn register(&self, registration: &Registration) -> Result<Session, ApiError> {
        let registration = Registration {
            phone: Some(registration.phone.clone().unwrap_or_default()),
            ..registration.clone()
        };
        info!("新規登録: {}", registration.email);
        let response = self.gateway.register(&registration).await.map_err(|e| {
            error!("登録に失敗: {}", e);
            e
        })?;
        if response.access_token.is_none() {
            info!("登録応答にトークンが無いため自動ログイン");
            return self
                .login(&Credentials {
                    email: registration.email,
                    password: registration.password,
                })
                .await;
        }
        let user = response.user.clone();
        self.persist(response, user).await
    }

    /// Google のIDトークンで Firebase 経由のログインを行う
    pub async fn login_with_google(
        &self,
        id_token: &str,
        access_token: Option<&str>,
    ) -> Result<Session, ApiError> {
        let credential = self
            .provider
            .sign_in_with_google(id_token, access_token)
            .await
            .map_err(|e| {
                error!("Firebase でのサインインに失敗: {}", e);
                e
            })?;
        info!("Firebase サインイン成功: {}", credential.local_id);
        let response = self.gateway.exchange(&credential).await.map_err(|e| {
            error!("バックエンドでのトークン交換に失敗: {}", e);
            e
        })?;
        let user = response.user.clone().or_else(|| {
            let id = response.user_id?;
            let email = credential.email.clone().unwrap_or_default();
            let mut user = User::basic(id, &email);
            if let Some(name) = &credential.display_name {
                user.name = name.clone();
            }
            Some(user)
        });
        self.persist(response, user).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        info!("ログアウト");
        self.store.clear().await
    }

    pub async fn current_user(&self) -> Result<Option<User>, ApiError> {
        self.store.user().await
    }

    pub async fn is_authenticated(&self) -> bool {
        is_authenticated(self.store.as_ref()).await
    }

    async fn persist(&self, response: AuthResponse, user: Option<User>) -> Result<Session, ApiError> {
        let token = response.access_token.ok_or(ApiError::MissingToken)?;
        let session = Session { token, user };
        self.store.save(&session).await?;
        info!("トークンとユーザーを保存しました");
        Ok(session)
    }
}

async fn is_authenticated(store: &dyn SessionStore) -> bool {
    match store.token().await {
        Ok(token) => token.is_some(),
        Err(e) => {
            error!("認証状態の確認に失敗: {}", e);
            false
        }
    }
}

/// 保存先を一定間隔で確認し、認証状態の変化を通知するタスク
#[derive(Clone)]
pub struct AuthWatcher {
    _handle: Arc<JoinHandle<()>>,
    receiver: watch::Receiver<bool>,
}

impl AuthWatcher {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    pub async fn spawn(store: Arc<dyn SessionStore>, interval: Duration) -> Self {
        let initial = is_authenticated(store.as_ref()).await;
        let (tx, rx) = watch::channel(initial);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        debug!("購読者がいないため認証状態の監視を終了");
                        break;
                    }
                    _ = ticker.tick() => {
                        let authenticated = is_authenticated(store.as_ref()).await;
                        if *tx.borrow() != authenticated {
                            info!("認証状態の変化を検出: {}", authenticated);
                            if tx.send(authenticated).is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });
        Self {
            _handle: Arc::new(handle),
            receiver: rx,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        *self.receiver.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.receiver.clone()
    }
}
