//! Session-scoped token storage.
//!
//! The store is the single source of truth for the current token: the
//! authority reads it before every request and writes it after every
//! refresh. [`MemorySessionStore`] lives as long as the process;
//! [`FileSessionStore`] keeps the token in a JSON file with `0o600`
//! permissions so a restarted client in the same session directory picks
//! it up again.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::errors::AuthError;
use crate::token::AuthToken;

/// Key/value slot for the current token.
pub trait SessionStore: Send + Sync {
    /// Read the stored token, if any.
    fn load(&self) -> Option<AuthToken>;

    /// Replace the stored token.
    fn save(&self, token: &AuthToken) -> Result<(), AuthError>;

    /// Remove the stored token.
    fn clear(&self) -> Result<(), AuthError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Token store that lives as long as the value does.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: RwLock<Option<AuthToken>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `token`.
    pub fn with_token(token: AuthToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<AuthToken> {
        self.token.read().clone()
    }

    fn save(&self, token: &AuthToken) -> Result<(), AuthError> {
        *self.token.write() = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.token.write() = None;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File-backed store
// ─────────────────────────────────────────────────────────────────────────────

/// Token store persisted as JSON on disk.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Create a store backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<AuthToken> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = ?self.path, "failed to read session file: {e}");
                return None;
            }
        };

        match serde_json::from_str::<AuthToken>(&data) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(path = ?self.path, "failed to parse session file: {e}");
                None
            }
        }
    }

    fn save(&self, token: &AuthToken) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(token)?;

        let mut options = std::fs::OpenOptions::new();
        let _ = options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let _ = options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        // `mode` only applies on create; tighten a file that already existed.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(json.as_bytes())?;
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
