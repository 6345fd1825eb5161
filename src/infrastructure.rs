pub mod auth;
pub mod core;
mod store;

use std::{sync::Arc, time::Duration};

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    domain::{auth::SessionStore, ApiError},
    CanchaConfig,
};

pub use self::store::*;

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            ApiError::Timeout
        } else if value.is_decode() {
            ApiError::Decode(value.to_string())
        } else {
            ApiError::Network(value.to_string())
        }
    }
}

/// バックエンドの REST API クライアント
///
/// 保存済みのトークンがあれば `Authorization: Bearer` を付与する。
/// 401 を受けると保存済みのトークンとユーザーを破棄する。
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            store,
        })
    }

    pub fn from_config(
        config: &CanchaConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ApiError> {
        Self::new(
            &config.api.base_url,
            Duration::from_millis(config.api.timeout_ms),
            store,
        )
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    pub async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let request = self.request(Method::GET, path).query(query);
        decode(self.send(request, Method::GET, path).await?).await
    }

    pub async fn post_json<B, T>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path).query(query).json(body);
        decode(self.send(request, Method::POST, path).await?).await
    }

    pub async fn post_form<T>(&self, path: &str, form: &[(&str, &str)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path).form(form);
        decode(self.send(request, Method::POST, path).await?).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        let request = self.request(Method::DELETE, path);
        decode(self.send(request, Method::DELETE, path).await?).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(
        &self,
        mut request: RequestBuilder,
        method: Method,
        path: &str,
    ) -> Result<Response, ApiError> {
        debug!("API Request: {} {}", method, path);
        if let Some(token) = self.store.token().await? {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| {
            error!("API No Response: {} {}: {}", method, path, e);
            ApiError::from(e)
        })?;
        let status = response.status();
        debug!("API Response: {} {}", status.as_u16(), path);
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!("API Error Response: {} {}: {}", status.as_u16(), path, body);
        if status == StatusCode::UNAUTHORIZED {
            warn!("トークンが無効なため認証情報を破棄します");
            if let Err(e) = self.store.clear().await {
                error!("認証情報の破棄に失敗: {}", e);
            }
            return Err(ApiError::Unauthorized);
        }
        Err(ApiError::Rejected {
            status: status.as_u16(),
            detail: extract_detail(&body),
        })
    }
}

/// 空の本文は `null` として扱う
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// 一覧を1行ずつ変換する。変換できない行は警告を出して読み飛ばす
pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Option<Vec<Value>>, entity: &str) -> Vec<T> {
    rows.unwrap_or_default()
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("{} の行を読み飛ばします: {}: {}", entity, e, row);
                None
            }
        })
        .collect()
}

/// エラー応答の本文から表示用メッセージを取り出す
///
/// `detail` が文字列ならそのまま、項目エラーのリストなら各 `msg` を改行で連結する。
pub fn extract_detail(body: &str) -> String {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return String::new(),
    };
    match value.get("detail") {
        Some(Value::String(detail)) => return detail.clone(),
        Some(Value::Array(items)) => {
            return items
                .iter()
                .filter_map(|item| {
                    item.get("msg")
                        .or_else(|| item.get("message"))
                        .and_then(Value::as_str)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => {}
    }
    value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}
