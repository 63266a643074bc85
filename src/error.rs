use crate::data::StoreError;
use http::{Method, StatusCode};
use std::collections::BTreeMap;
use std::fmt;

/// Every way a request can be turned away. Each variant maps to exactly one
/// status code; `ServerFault` carries detail that is logged but never sent.
#[derive(Debug)]
pub enum ApiError {
    RateLimited,
    InvalidCredentialFormat,
    InvalidCredentials,
    AuthenticationRequired,
    NotPermitted,
    InvalidLogin,
    NotFound,
    MethodNotAllowed { method: Method, allowed: Vec<Method> },
    BadRequest(String),
    FailedValidation(BTreeMap<String, String>),
    EditConflict,
    ServerFault(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidCredentialFormat
            | ApiError::InvalidCredentials
            | ApiError::AuthenticationRequired
            | ApiError::InvalidLogin => StatusCode::UNAUTHORIZED,
            ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::ServerFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Token shape failures and unknown tokens
    /// intentionally read the same.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::RateLimited => "rate limit exceeded".to_string(),
            ApiError::InvalidCredentialFormat | ApiError::InvalidCredentials => {
                "invalid or missing authentication token".to_string()
            }
            ApiError::AuthenticationRequired => {
                "you must be authenticated with an activated account to access this resource"
                    .to_string()
            }
            ApiError::NotPermitted => {
                "your user account doesn't have the necessary permissions to access this resource"
                    .to_string()
            }
            ApiError::InvalidLogin => "invalid authentication credentials".to_string(),
            ApiError::NotFound => "the requested resource could not be found".to_string(),
            ApiError::MethodNotAllowed { method, .. } => {
                format!("the {} method is not supported for this resource", method)
            }
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::FailedValidation(_) => "failed validation".to_string(),
            ApiError::EditConflict => {
                "unable to update the record due to an edit conflict, please try again".to_string()
            }
            ApiError::ServerFault(_) => {
                "the server encountered a problem and could not process your request".to_string()
            }
        }
    }

    /// Whether the response should carry `WWW-Authenticate: Bearer`.
    pub fn challenges_bearer(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidCredentialFormat | ApiError::InvalidCredentials
        )
    }

    pub fn server_fault(err: impl fmt::Display) -> Self {
        ApiError::ServerFault(err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::RateLimited => write!(f, "rate limited"),
            ApiError::InvalidCredentialFormat => write!(f, "invalid credential format"),
            ApiError::InvalidCredentials => write!(f, "invalid credentials"),
            ApiError::AuthenticationRequired => write!(f, "authentication required"),
            ApiError::NotPermitted => write!(f, "not permitted"),
            ApiError::InvalidLogin => write!(f, "invalid login"),
            ApiError::NotFound => write!(f, "not found"),
            ApiError::MethodNotAllowed { method, .. } => {
                write!(f, "method not allowed: {}", method)
            }
            ApiError::BadRequest(msg) => write!(f, "bad request: {}", msg),
            ApiError::FailedValidation(errors) => {
                write!(f, "failed validation on {} field(s)", errors.len())
            }
            ApiError::EditConflict => write!(f, "edit conflict"),
            ApiError::ServerFault(msg) => write!(f, "server fault: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Store failures as seen by a handler. The authentication stage maps
/// `RecordNotFound` itself since an unknown token is not a missing resource.
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RecordNotFound => ApiError::NotFound,
            StoreError::EditConflict => ApiError::EditConflict,
            StoreError::DuplicateEmail => {
                let mut errors = BTreeMap::new();
                errors.insert(
                    "email".to_string(),
                    "a user with this email address already exists".to_string(),
                );
                ApiError::FailedValidation(errors)
            }
            other => ApiError::ServerFault(other.to_string()),
        }
    }
}
