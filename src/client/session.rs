use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_verified: bool,
}

/// What the client keeps after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: SessionUser,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Reads `exp` without checking the signature; the client holds no secret.
pub fn token_expiry(token: &str) -> Result<OffsetDateTime, ClientError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|_| ClientError::MalformedToken)?;
    OffsetDateTime::from_unix_timestamp(data.claims.exp).map_err(|_| ClientError::MalformedToken)
}

impl Session {
    pub fn from_token(token: String, user: SessionUser) -> Result<Self, ClientError> {
        let expires_at = token_expiry(&token)?;
        Ok(Self {
            token,
            user,
            expires_at,
        })
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Where a session survives restarts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<Option<Session>>;
    async fn save(&self, session: &Session) -> anyhow::Result<()>;
    async fn clear(&self) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<Session>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> anyhow::Result<Option<Session>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, session: &Session) -> anyhow::Result<()> {
        *self.slot.lock().await = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

/// JSON file holding the token and user.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> anyhow::Result<Option<Session>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read session {}", self.path.display()))
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "discarding unreadable session file");
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &Session) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        let raw = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("write session {}", self.path.display()))
    }

    async fn clear(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove session {}", self.path.display())),
        }
    }
}

/// Shared handle to the signed-in session. Clone it into whatever needs it.
#[derive(Clone)]
pub struct SessionContext {
    current: Arc<RwLock<Option<Session>>>,
    store: Arc<dyn SessionStore>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            store,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::default()))
    }

    /// Loads the persisted session; an expired one is discarded.
    pub async fn restore(&self) -> anyhow::Result<Option<Session>> {
        let loaded = self.store.load().await?;
        let session = match loaded {
            Some(s) if s.is_expired_at(OffsetDateTime::now_utc()) => {
                info!(user_id = %s.user.id, "stored session expired");
                self.store.clear().await?;
                None
            }
            other => other,
        };
        *self.current.write().await = session.clone();
        Ok(session)
    }

    pub async fn set(&self, session: Session) -> anyhow::Result<()> {
        self.store.save(&session).await?;
        debug!(user_id = %session.user.id, expires_at = %session.expires_at, "session stored");
        *self.current.write().await = Some(session);
        Ok(())
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        *self.current.write().await = None;
        self.store.clear().await
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.current.read().await.as_ref().map(|s| s.token.clone())
    }

    /// True only when a session is held and it has run out.
    pub async fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .is_some_and(|s| s.is_expired_at(now))
    }

    pub async fn is_authenticated(&self, now: OffsetDateTime) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .is_some_and(|s| !s.is_expired_at(now))
    }
}
