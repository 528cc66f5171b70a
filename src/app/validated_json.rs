use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use super::{error::AppError, ApiContext};

/// `Json<T>` plus `T::validate()`, completing the teacher's half-finished
/// extractor (`extrator.rs`'s commented-out sketch) so every handler gets
/// consistent validation instead of the ad hoc `.validate()` call repeated
/// per route.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T> FromRequest<ApiContext> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &ApiContext) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate().map_err(|e| {
            let mut details: std::collections::HashMap<String, Vec<String>> =
                std::collections::HashMap::new();
            for (field, errors) in e.field_errors() {
                let messages = errors
                    .iter()
                    .map(|err| {
                        err.message
                            .clone()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| err.code.to_string())
                    })
                    .collect();
                details.insert(field.to_string(), messages);
            }
            AppError::ValidationError { details }
        })?;
        Ok(ValidatedJson(value))
    }
}
