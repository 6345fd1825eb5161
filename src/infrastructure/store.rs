use std::{
    collections::BTreeMap,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{
    auth::{Session, SessionStore, User},
    ApiError,
};

pub const AUTH_TOKEN_KEY: &str = "@CasoCanchas:token";
pub const USER_DATA_KEY: &str = "@CasoCanchas:user";

/// キーと値の組。ユーザーはJSON文字列で保存する
type Entries = BTreeMap<String, String>;

fn user_from(entries: &Entries) -> Result<Option<User>, ApiError> {
    entries
        .get(USER_DATA_KEY)
        .map(|json| serde_json::from_str(json))
        .transpose()
        .map_err(|e| ApiError::Storage(e.to_string()))
}

fn write_session(entries: &mut Entries, session: &Session) -> Result<(), ApiError> {
    entries.insert(AUTH_TOKEN_KEY.to_owned(), session.token.clone());
    match &session.user {
        Some(user) => {
            let json = serde_json::to_string(user).map_err(|e| ApiError::Storage(e.to_string()))?;
            entries.insert(USER_DATA_KEY.to_owned(), json);
        }
        None => {
            entries.remove(USER_DATA_KEY);
        }
    }
    Ok(())
}

fn clear_session(entries: &mut Entries) {
    entries.remove(AUTH_TOKEN_KEY);
    entries.remove(USER_DATA_KEY);
}

/// プロセス内だけで保持する保存先
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<Entries>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn token(&self) -> Result<Option<String>, ApiError> {
        Ok(self.entries.read().await.get(AUTH_TOKEN_KEY).cloned())
    }

    async fn user(&self) -> Result<Option<User>, ApiError> {
        user_from(&*self.entries.read().await)
    }

    async fn save(&self, session: &Session) -> Result<(), ApiError> {
        write_session(&mut *self.entries.write().await, session)
    }

    async fn clear(&self) -> Result<(), ApiError> {
        clear_session(&mut *self.entries.write().await);
        Ok(())
    }
}

/// JSON ファイルに保存する保存先。別プロセスの変更も読み取りのたびに反映される
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Entries, ApiError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Entries::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| ApiError::Storage(e.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(ApiError::Storage(e.to_string())),
        }
    }

    /// 同じディレクトリの一時ファイルに書いてから置き換える
    async fn store(&self, entries: &Entries) -> Result<(), ApiError> {
        let json =
            serde_json::to_vec_pretty(entries).map_err(|e| ApiError::Storage(e.to_string()))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, &json))
            .await
            .map_err(|e| ApiError::Storage(e.to_string()))??;
        debug!("認証情報を保存: {}", self.path.display());
        Ok(())
    }
}

fn replace_file(path: &Path, contents: &[u8]) -> Result<(), ApiError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(|e| ApiError::Storage(e.to_string()))?;
    file.write_all(contents)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| ApiError::Storage(e.to_string()))?;
    file.persist(path)
        .map_err(|e| ApiError::Storage(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn token(&self) -> Result<Option<String>, ApiError> {
        let _guard = self.lock.read().await;
        Ok(self.load().await?.get(AUTH_TOKEN_KEY).cloned())
    }

    async fn user(&self) -> Result<Option<User>, ApiError> {
        let _guard = self.lock.read().await;
        user_from(&self.load().await?)
    }

    async fn save(&self, session: &Session) -> Result<(), ApiError> {
        let _guard = self.lock.write().await;
        let mut entries = self.load().await?;
        write_session(&mut entries, session)?;
        self.store(&entries).await
    }

    async fn clear(&self) -> Result<(), ApiError> {
        let _guard = self.lock.write().await;
        let mut entries = self.load().await?;
        clear_session(&mut entries);
        self.store(&entries).await
    }
}
