pub mod auth;
pub mod booking;
pub mod core;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display},
    ops::Deref,
    str::FromStr,
};
use thiserror::Error;

pub trait Id:
    Copy
    + Eq
    + Deref<Target = Self::Inner>
    + From<Self::Inner>
    + Display
    + Debug
    + Serialize
    + for<'de> Deserialize<'de>
{
    type Inner: FromStr;
}

pub trait Entity {
    type Id: Id;

    const ENTITY_NAME: &'static str;

    fn id(&self) -> Self::Id;
}

/// バックエンド呼び出しのエラー
#[derive(Error, Debug)]
pub enum ApiError {
    /// 接続できなかった
    #[error("Network error: {0}")]
    Network(String),
    /// 応答が時間内に返らなかった
    #[error("Request timed out")]
    Timeout,
    /// 認証が無効（保存済みの認証情報は破棄済み）
    #[error("Unauthorized")]
    Unauthorized,
    /// バックエンドがリクエストを拒否した
    #[error("Request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    /// 応答の形式が不正
    #[error("Failed to decode response: {0}")]
    Decode(String),
    /// 応答にアクセストークンが含まれていない
    #[error("No se recibió token de acceso")]
    MissingToken,
    /// 認証情報の保存に失敗した
    #[error("Session storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 利用者に表示するメッセージ
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Rejected { detail, .. } if !detail.is_empty() => detail.clone(),
            ApiError::MissingToken => self.to_string(),
            _ => fallback.to_owned(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::Decode(value.to_string())
    }
}
