use crate::validation::FieldError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The session could not be renewed; the caller should send the user back to login.
    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Session store error: {0}")]
    Store(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
