use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::session::SessionContext;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("session file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// JSON file holding the session between runs
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty session
    pub fn load(&self) -> Result<SessionContext, SessionError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No session at {}", self.path.display());
                return Ok(SessionContext::default());
            }
            Err(source) => return Err(SessionError::Io { path: self.path.clone(), source }),
        };
        serde_json::from_str(&raw).map_err(|source| SessionError::Corrupt { path: self.path.clone(), source })
    }

    pub fn save(&self, ctx: &SessionContext) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let json = serde_json::to_string_pretty(ctx)
            .map_err(|source| SessionError::Corrupt { path: self.path.clone(), source })?;
        std::fs::write(&self.path, json).map_err(|source| self.io_error(source))?;
        debug!("Session saved to {}", self.path.display());
        Ok(())
    }

    /// Forget the session (logout)
    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: io::Error) -> SessionError {
        SessionError::Io { path: self.path.clone(), source }
    }
}
