use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

/// Failure of a single remote call. The core never retries any of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("credential rejected by server")]
    Auth,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
}

impl GatewayError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth)
    }
}

impl From<ApiError> for GatewayError {
    fn from(value: ApiError) -> Self {
        match value.code {
            ErrorCode::Unauthorized => Self::Auth,
            ErrorCode::NotFound => Self::NotFound(value.message),
            _ => Self::Server {
                status: value.status,
                message: value.message,
            },
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        Self::Network(value.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("template '{template}' is not present in category '{category}'")]
    MissingTemplate { category: String, template: String },
    #[error("document is not a valid category: {0}")]
    InvalidShape(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("editor content is not valid JSON: {0}")]
    Parse(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("not connected")]
    NotConnected,
    #[error("no template selected")]
    NoSelection,
    #[error("a save is already in progress")]
    SaveInProgress,
    #[error("credential store error: {0}")]
    Credentials(String),
}

impl SessionError {
    /// Auth failures are global: the session is torn down and the user must
    /// supply a new credential.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Gateway(GatewayError::Auth))
    }

    /// Parse and schema failures only concern the editor buffer.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Schema(_))
    }
}
