//! Authenticated session shared by every backend client.
//!
//! [`AuthSession`] is a cheap handle: clones observe the same token, so a
//! login through [`crate::auth::AuthClient`] is immediately visible to the
//! gateway the month controller uses.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// The logged-in user as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub name: String,
    pub email: String,
}

/// Bearer token plus the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
}

/// Shared, swappable session handle.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    inner: Arc<RwLock<Option<Session>>>,
}

impl AuthSession {
    /// A handle with no one logged in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.set(Session {
            token: token.into(),
            user: None,
        });
        session
    }

    pub fn set(&self, session: Session) {
        *self.inner.write() = Some(session);
    }

    pub fn set_user(&self, user: User) {
        if let Some(session) = self.inner.write().as_mut() {
            session.user = Some(user);
        }
    }

    /// Forget the token. Subsequent requests go out unauthenticated.
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.inner.read().as_ref().map(|session| session.token.clone())
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner
            .read()
            .as_ref()
            .and_then(|session| session.user.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.read().is_some()
    }

    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.inner.read().clone()
    }

    /// Restore a session saved by [`AuthSession::save_to`]. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let session = Self::new();
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            session.set(serde_json::from_str(&contents)?);
            debug!("Restored session from {}", path.display());
        }
        Ok(session)
    }

    /// Persist the current session, or remove the file when logged out.
    ///
    /// The file holds a bearer token, so on unix it is readable by the owner only.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        match self.current() {
            Some(session) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                write_private(path, serde_json::to_string_pretty(&session)?.as_bytes())?;
            }
            None => {
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies when the file is created.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}
