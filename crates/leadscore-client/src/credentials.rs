//! Access/refresh credential pair and its durable store.
//!
//! The store keeps the current [`Credential`] in memory and, when opened on a
//! path, mirrors every change to a small JSON file so a session survives
//! restarts. Writes go to a sibling temp file first and are renamed into
//! place while the in-memory lock is held, so readers never observe a half
//! written file or a memory/file mismatch.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bearer credential issued by the service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    refresh_token: Option<String>,
    issued_at: DateTime<Utc>,
}

impl Credential {
    /// Builds a credential issued now. Returns `None` for an empty access
    /// token; an empty refresh token is treated as absent.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Option<Self> {
        Self::issued(access_token.into(), refresh_token, Utc::now())
    }

    fn issued(
        access_token: String,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
    ) -> Option<Self> {
        if access_token.is_empty() {
            return None;
        }
        Some(Self {
            access_token,
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            issued_at,
        })
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub(crate) fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// On-disk layout, keyed by the names the web client used in local storage.
#[derive(Serialize, Deserialize)]
struct PersistedCredential {
    auth_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    issued_at: Option<DateTime<Utc>>,
}

/// Shared handle to the current credential. Cloning yields another handle to
/// the same store.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    current: RwLock<Option<Credential>>,
    path: Option<PathBuf>,
}

impl CredentialStore {
    /// A store that lives only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                current: RwLock::new(None),
                path: None,
            }),
        }
    }

    /// A store persisted at `path`, restoring any credential already saved
    /// there. An unreadable or malformed file is logged and treated as empty.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let restored = load(&path);
        Self {
            inner: Arc::new(StoreInner {
                current: RwLock::new(restored),
                path: Some(path),
            }),
        }
    }

    #[must_use]
    pub fn get(&self) -> Option<Credential> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current credential; subsequent requests use it.
    pub fn set(&self, credential: Credential) {
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = &self.inner.path {
            if let Err(e) = persist(path, &credential) {
                tracing::warn!(path = %path.display(), error = %e, "failed to persist credential");
            }
        }
        *current = Some(credential);
    }

    /// Removes the credential from memory and disk.
    pub fn clear(&self) {
        self.take();
    }

    /// Removes the credential and returns what was stored, so callers racing
    /// to tear down the same session can tell which one actually did.
    pub(crate) fn take(&self) -> Option<Credential> {
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = &self.inner.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove credential file");
                }
            }
        }
        current.take()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Credential::has_refresh_token)
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.inner.path)
            .field("credential", &self.get())
            .finish()
    }
}

fn load(path: &Path) -> Option<Credential> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read credential file");
            return None;
        }
    };
    match serde_json::from_str::<PersistedCredential>(&raw) {
        Ok(saved) => Credential::issued(
            saved.auth_token,
            saved.refresh_token,
            saved.issued_at.unwrap_or_else(Utc::now),
        ),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed credential file");
            None
        }
    }
}

fn persist(path: &Path, credential: &Credential) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let saved = PersistedCredential {
        auth_token: credential.access_token.clone(),
        refresh_token: credential.refresh_token.clone(),
        issued_at: Some(credential.issued_at),
    };
    let body = serde_json::to_vec_pretty(&saved)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp)?;
    file.write_all(&body)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)
}
