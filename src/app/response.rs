use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// The `{status, message, data, timestamp}` success envelope every
/// handler in spec.md §6.1 returns.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    pub message: String,
    pub data: T,
    pub timestamp: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            status: "success",
            message: message.into(),
            data,
            timestamp: now_rfc3339(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Wraps a success envelope with an explicit status code for handlers that
/// return 201 etc.
pub struct StatusApiResponse<T: Serialize>(pub StatusCode, pub ApiResponse<T>);

impl<T: Serialize> IntoResponse for StatusApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        (self.0, Json(self.1)).into_response()
    }
}
