use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, sync::Mutex};
use tracing::debug;

use crate::error::SessionError;

const CREDENTIAL_DIR: &str = "prompt-studio";
const CREDENTIAL_FILE: &str = "credential";

/// Durable home of the single opaque bearer credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, SessionError>;
    async fn store(&self, credential: &str) -> Result<(), SessionError>;
    async fn clear(&self) -> Result<(), SessionError>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    value: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(credential.into())),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<String>, SessionError> {
        Ok(self.value.lock().await.clone())
    }

    async fn store(&self, credential: &str) -> Result<(), SessionError> {
        *self.value.lock().await = Some(credential.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        *self.value.lock().await = None;
        Ok(())
    }
}

/// Keeps the credential in a single file, by default under the platform
/// configuration directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CREDENTIAL_DIR).join(CREDENTIAL_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> SessionError {
    SessionError::Credentials(format!("failed to {action} '{}': {err}", path.display()))
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<String>, SessionError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let credential = raw.trim();
                Ok((!credential.is_empty()).then(|| credential.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error("read", &self.path, err)),
        }
    }

    async fn store(&self, credential: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| io_error("create", parent, err))?;
        }
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options
            .open(&self.path)
            .await
            .map_err(|err| io_error("open", &self.path, err))?;
        // A file left by an older version may carry wider permissions.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|err| io_error("restrict", &self.path, err))?;
        }
        file.write_all(credential.as_bytes())
            .await
            .map_err(|err| io_error("write", &self.path, err))?;
        file.flush()
            .await
            .map_err(|err| io_error("write", &self.path, err))?;
        debug!(path = %self.path.display(), "stored credential");
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error("remove", &self.path, err)),
        }
    }
}
