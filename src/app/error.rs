use std::collections::HashMap;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Every stable error code in spec.md §7, carrying just enough data to
/// render `details`. This is the "single well-known global error handler"
/// the spec asks for: `IntoResponse` is implemented once, here, and every
/// route returns `Result<_, AppError>` so nothing downstream hand-rolls an
/// error response.
#[derive(Error, Debug)]
pub enum AppError {
    // --- Auth (401/403) ---
    #[error("missing HMAC headers")]
    MissingHmacHeader,
    #[error("request timestamp is outside the allowed window")]
    ExpiredRequest,
    #[error("unknown client id")]
    InvalidClientId,
    #[error("HMAC signature did not match")]
    InvalidSignature,
    #[error("missing Authorization header")]
    MissingAuthHeader,
    #[error("access token has expired")]
    ExpiredToken,
    #[error("access token is invalid")]
    InvalidToken,
    #[error("bearer token's organization does not match the HMAC-derived organization")]
    OrgMismatch,
    #[error("insufficient permission for this action")]
    InsufficientPermission,
    #[error("account is locked")]
    AccountLocked,
    #[error("account is inactive")]
    AccountInactive,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("refresh token is invalid or has been revoked")]
    InvalidRefreshToken,

    // --- Validation (400/409) ---
    #[error("validation failed")]
    ValidationError { details: HashMap<String, Vec<String>> },
    #[error("password does not meet complexity requirements")]
    InvalidPasswordFormat,
    #[error("email is already registered in this organization")]
    DuplicateEmail,
    #[error("organization already registered")]
    DuplicateOrg,
    #[error("file type is not allowed")]
    InvalidFileType,
    #[error("file exceeds the maximum allowed size")]
    FileTooLarge,
    #[error("query exceeds the maximum allowed length")]
    QueryTooLong,

    // --- Resource (404) ---
    #[error("resource not found")]
    NotFound,
    #[error("document not found")]
    DocumentNotFound,
    #[error("conversation not found")]
    ConversationNotFound,

    // --- Pipeline ---
    #[error("document is password protected")]
    PdfEncrypted,
    #[error("document did not contain enough extractable text")]
    InsufficientText,
    #[error("failed to parse document: {0}")]
    ParseError(String),
    #[error("embedding dimension did not match the configured index")]
    DimensionMismatch,
    #[error("object storage is unavailable")]
    StorageUnavailable,
    #[error("failed to compute embeddings")]
    EmbeddingFailed,
    #[error("failed to generate a response")]
    GenerationFailed,
    #[error("vector index is unreachable")]
    VectorUpsertUnreachable,

    // --- Infra (429/500) ---
    #[error("a database error occurred")]
    DatabaseError(#[source] sqlx::Error),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("an internal error occurred")]
    Internal(#[from] anyhow::Error),
    #[error("malformed request body")]
    JsonRejection(#[from] JsonRejection),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::DatabaseError(e)
    }
}

impl AppError {
    pub fn validation(errors: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        let mut details: HashMap<String, Vec<String>> = HashMap::new();
        for (field, message) in errors {
            details.entry(field.into()).or_default().push(message.into());
        }
        AppError::ValidationError { details }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingHmacHeader => "MISSING_HMAC_HEADER",
            AppError::ExpiredRequest => "EXPIRED_REQUEST",
            AppError::InvalidClientId => "INVALID_CLIENT_ID",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::MissingAuthHeader => "MISSING_AUTH_HEADER",
            AppError::ExpiredToken => "EXPIRED_TOKEN",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::OrgMismatch => "ORG_MISMATCH",
            AppError::InsufficientPermission => "INSUFFICIENT_PERMISSION",
            AppError::AccountLocked => "ACCOUNT_LOCKED",
            AppError::AccountInactive => "ACCOUNT_INACTIVE",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::InvalidPasswordFormat => "INVALID_PASSWORD_FORMAT",
            AppError::DuplicateEmail => "DUPLICATE_EMAIL",
            AppError::DuplicateOrg => "DUPLICATE_ORG",
            AppError::InvalidFileType => "INVALID_FILE_TYPE",
            AppError::FileTooLarge => "FILE_TOO_LARGE",
            AppError::QueryTooLong => "QUERY_TOO_LONG",
            AppError::NotFound => "NOT_FOUND",
            AppError::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            AppError::ConversationNotFound => "CONVERSATION_NOT_FOUND",
            AppError::PdfEncrypted => "PDF_ENCRYPTED",
            AppError::InsufficientText => "INSUFFICIENT_TEXT",
            AppError::ParseError(_) => "PARSE_ERROR",
            AppError::DimensionMismatch => "DIMENSION_MISMATCH",
            AppError::StorageUnavailable => "STORAGE_UNAVAILABLE",
            AppError::EmbeddingFailed => "EMBEDDING_FAILED",
            AppError::GenerationFailed => "GENERATION_FAILED",
            AppError::VectorUpsertUnreachable => "VECTOR_UPSERT_UNREACHABLE",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::RateLimited => "RATE_LIMITED",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::JsonRejection(_) => "VALIDATION_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        use AppError::*;
        match self {
            MissingHmacHeader | ExpiredRequest | InvalidClientId | InvalidSignature
            | MissingAuthHeader | ExpiredToken | InvalidToken | AccountLocked
            | AccountInactive | InvalidCredentials | InvalidRefreshToken => {
                StatusCode::UNAUTHORIZED
            }
            OrgMismatch | InsufficientPermission => StatusCode::FORBIDDEN,
            ValidationError { .. } | InvalidPasswordFormat | InvalidFileType | FileTooLarge
            | QueryTooLong | JsonRejection(_) => StatusCode::BAD_REQUEST,
            DuplicateEmail | DuplicateOrg => StatusCode::CONFLICT,
            NotFound | DocumentNotFound | ConversationNotFound => StatusCode::NOT_FOUND,
            PdfEncrypted | InsufficientText | ParseError(_) | DimensionMismatch => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            GenerationFailed | EmbeddingFailed | VectorUpsertUnreachable | StorageUnavailable => {
                StatusCode::BAD_GATEWAY
            }
            RateLimited => StatusCode::TOO_MANY_REQUESTS,
            DatabaseError(_) | Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Infrastructure failures are logged with detail but never leak
    /// internals to the caller (spec.md §7 propagation policy).
    fn public_message(&self) -> String {
        match self {
            AppError::DatabaseError(_) => "a database error occurred".to_string(),
            AppError::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Value {
        match self {
            AppError::ValidationError { details } => {
                serde_json::to_value(details).unwrap_or(Value::Null)
            }
            AppError::ParseError(msg) => Value::String(msg.clone()),
            _ => Value::Null,
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    status: &'static str,
    error_code: &'static str,
    message: String,
    details: Value,
    timestamp: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::DatabaseError(e) => tracing::error!(error = ?e, "database error"),
            AppError::Internal(e) => tracing::error!(error = ?e, "internal error"),
            _ => {}
        }

        let status = self.status_code();
        let body = ErrorEnvelope {
            status: "error",
            error_code: self.code(),
            message: self.public_message(),
            details: self.details(),
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        };

        (status, Json(body)).into_response()
    }
}
