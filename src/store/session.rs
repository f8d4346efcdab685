use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::api::types::User;
use crate::error::{AppError, Result};

/// Persisted client session: what a browser would keep in local storage.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub guest_id: String,
}

// Manual Debug impl to avoid leaking the bearer token
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user.as_ref().map(|u| &u.username))
            .field("guest_id", &self.guest_id)
            .finish()
    }
}

/// Owner of the session. Every mutation goes through a method here and is
/// written back to disk when the store is file-backed.
pub struct SessionStore {
    path: Option<PathBuf>,
    inner: RwLock<Session>,
}

impl SessionStore {
    /// Load the session file, creating a fresh guest session if missing.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut session = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Session>(&raw).map_err(|e| {
                AppError::Session(format!("Corrupt session file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Session::default(),
            Err(e) => return Err(e.into()),
        };

        let mut dirty = false;
        if session.guest_id.is_empty() {
            session.guest_id = uuid::Uuid::new_v4().to_string();
            dirty = true;
        }
        if session
            .token
            .as_deref()
            .is_some_and(|t| token_expired(t, chrono::Utc::now().timestamp()))
        {
            tracing::info!("Stored token has expired, clearing session");
            session.token = None;
            session.user = None;
            dirty = true;
        }
        if dirty {
            write_session_blocking(&path, &encode(&session)?)?;
        }

        Ok(Self {
            path: Some(path),
            inner: RwLock::new(session),
        })
    }

    /// A session that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: RwLock::new(Session {
                guest_id: uuid::Uuid::new_v4().to_string(),
                ..Session::default()
            }),
        }
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.read().await.token.clone()
    }

    pub async fn guest_id(&self) -> String {
        self.inner.read().await.guest_id.clone()
    }

    pub async fn user(&self) -> Option<User> {
        self.inner.read().await.user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.token.is_some()
    }

    pub async fn set_token(&self, token: String) -> Result<()> {
        let mut session = self.inner.write().await;
        session.token = Some(token);
        session.user = None;
        self.persist(&session).await
    }

    pub async fn set_user(&self, user: User) -> Result<()> {
        let mut session = self.inner.write().await;
        session.user = Some(user);
        self.persist(&session).await
    }

    /// Drop credentials; the guest id survives.
    pub async fn logout(&self) -> Result<()> {
        let mut session = self.inner.write().await;
        if session.token.is_none() && session.user.is_none() {
            return Ok(());
        }
        session.token = None;
        session.user = None;
        tracing::info!("Session cleared");
        self.persist(&session).await
    }

    /// Write the session to disk. Called with the write guard held so
    /// concurrent updates land on disk in order.
    async fn persist(&self, session: &Session) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = encode(session)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, raw).await?;
        #[cfg(unix)]
        tokio::fs::set_permissions(path, owner_only()).await?;

        Ok(())
    }
}

fn encode(session: &Session) -> Result<String> {
    Ok(serde_json::to_string_pretty(session)?)
}

/// Used by `load`, which runs before any async work.
fn write_session_blocking(path: &Path, raw: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, raw)?;
    #[cfg(unix)]
    std::fs::set_permissions(path, owner_only())?;

    Ok(())
}

#[cfg(unix)]
fn owner_only() -> std::fs::Permissions {
    use std::os::unix::fs::PermissionsExt;
    std::fs::Permissions::from_mode(0o600)
}

/// Whether a JWT's `exp` claim lies at or before `now`.
///
/// The signature is not checked. Opaque (non-JWT) tokens never expire locally.
pub fn token_expired(token: &str, now: i64) -> bool {
    let Some(payload) = token.split('.').nth(1) else {
        return false;
    };
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) else {
        return false;
    };
    let Ok(claims) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return false;
    };
    claims
        .get("exp")
        .and_then(serde_json::Value::as_i64)
        .is_some_and(|exp| exp <= now)
}
