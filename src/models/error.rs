use serde::Deserialize;

/// Where the shell should send the user after a failed read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Login,
    DocumentList,
}

/// Errors from the document REST API
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The backend answered with `status: error`
    #[error("{0}")]
    Rejected(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("unexpected response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl ApiError {
    /// Authorization-shaped failures go to the login flow, the rest to the document list.
    pub fn redirect(&self) -> Redirect {
        let auth_shaped = match self {
            ApiError::NotSignedIn => true,
            ApiError::Http { status, message } => {
                *status == 401 || *status == 403 || mentions_auth(message)
            }
            ApiError::Rejected(message) => mentions_auth(message),
            _ => false,
        };
        if auth_shaped {
            Redirect::Login
        } else {
            Redirect::DocumentList
        }
    }
}

fn mentions_auth(message: &str) -> bool {
    message.to_lowercase().contains("auth")
}

/// Input problems caught before any network call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("document key '{0}' must be exactly 8 characters")]
    HandleLength(String),

    #[error("document key '{0}' contains invalid characters")]
    HandleCharacters(String),

    #[error("'{0}' is not a valid email address")]
    Email(String),

    #[error("passwords do not match")]
    PasswordMismatch,
}

/// Error body shape shared by every endpoint
#[derive(Deserialize, Debug, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// `details` first, then `message`, then a fallback
    pub fn describe(&self, fallback: &str) -> String {
        self.details
            .clone()
            .or_else(|| self.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}
