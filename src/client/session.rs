use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use super::error::{ClientError, ClientResult};
use crate::models::{Role, TokenPairResponse};

/// Tokens and identity kept between requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access: String,
    pub refresh: Option<String>,
    pub role: Option<Role>,
    pub user_id: Option<i64>,
}

impl From<TokenPairResponse> for Session {
    fn from(pair: TokenPairResponse) -> Self {
        Self {
            access: pair.access,
            refresh: Some(pair.refresh),
            role: Some(pair.role),
            user_id: Some(pair.user_id),
        }
    }
}

pub trait SessionStore: Send + Sync {
    fn load(&self) -> ClientResult<Option<Session>>;
    fn save(&self, session: &Session) -> ClientResult<()>;
    fn clear(&self) -> ClientResult<()>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }

    fn lock(&self) -> ClientResult<std::sync::MutexGuard<'_, Option<Session>>> {
        self.session
            .lock()
            .map_err(|_| ClientError::Store("session lock poisoned".to_string()))
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> ClientResult<Option<Session>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, session: &Session) -> ClientResult<()> {
        *self.lock()? = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        *self.lock()? = None;
        Ok(())
    }
}

/// Session persisted as a JSON file. A missing file means no session.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> ClientResult<Option<Session>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClientError::Store(e.to_string())),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ClientError::Store(format!("{}: {}", self.path.display(), e)))
    }

    fn save(&self, session: &Session) -> ClientResult<()> {
        let raw = serde_json::to_string_pretty(session)
            .map_err(|e| ClientError::Store(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| ClientError::Store(e.to_string()))
    }

    fn clear(&self) -> ClientResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Store(e.to_string())),
        }
    }
}
