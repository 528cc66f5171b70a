use hmac::{digest::KeyInit, Hmac};
use jwt::{SignWithKey, VerifyWithKey};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::AppError;
use crate::domain::user::Role;

type HmacSha256 = Hmac<Sha256>;

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

pub trait Claims {
    fn exp(&self) -> i64;
}

/// Access token claims (spec.md §4.2): `{user_id, type:"access", iat, exp}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

/// Refresh token claims: `{user_id, type:"refresh", token_id, iat, exp}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub token_type: String,
    pub token_id: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl Claims for AccessClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl Claims for RefreshClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

/// Validated bearer identity, returned by `ValidateBearer`. Carries `role`
/// so downstream guards don't need a second DB round-trip just to check
/// admin/owner membership, though callers that need fresh lockout/active
/// state still hit the repository.
#[derive(Debug, Clone)]
pub struct BearerIdentity {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role: Role,
}

/// Signs and verifies access/refresh bearer tokens with HMAC-SHA256 over a
/// process-wide secret (`JWT_SECRET`) — distinct from the per-org HMAC
/// request-signing key of `crypto::hmac_sign`.
#[derive(Clone)]
pub struct TokenManager {
    key: HmacSha256,
}

impl TokenManager {
    pub fn new(secret: &SecretString) -> Self {
        let key = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .expect("HMAC-SHA-256 accepts any key length");
        TokenManager { key }
    }

    pub fn issue_access_token(&self, user_id: Uuid, ttl_seconds: i64) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        AccessClaims {
            user_id,
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        }
        .sign_with_key(&self.key)
        .expect("HMAC signing is infallible")
    }

    pub fn issue_refresh_token(&self, user_id: Uuid, token_id: Uuid, ttl_seconds: i64) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        RefreshClaims {
            user_id,
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            token_id,
            iat: now,
            exp: now + ttl_seconds,
        }
        .sign_with_key(&self.key)
        .expect("HMAC signing is infallible")
    }

    /// Verifies signature and expiry, distinguishing `EXPIRED_TOKEN` from
    /// `INVALID_TOKEN` per spec.md §4.2.
    pub fn verify<T>(&self, token: &str) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned + Claims,
    {
        let unverified = jwt::Token::<jwt::Header, T, _>::parse_unverified(token)
            .map_err(|_| AppError::InvalidToken)?;
        let verified = unverified
            .verify_with_key(&self.key)
            .map_err(|_| AppError::InvalidToken)?;
        let (_header, claims) = verified.into();

        if claims.exp() < OffsetDateTime::now_utc().unix_timestamp() {
            return Err(AppError::ExpiredToken);
        }

        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AppError> {
        let claims = self.verify::<AccessClaims>(token)?;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AppError::InvalidToken);
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AppError> {
        let claims = self.verify::<RefreshClaims>(token)?;
        if claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(AppError::InvalidToken);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new(&SecretString::from("test-jwt-secret".to_string()))
    }

    #[test]
    fn access_token_roundtrips() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        let token = manager.issue_access_token(user_id, 900);
        let claims = manager.verify_access(&token).unwrap();
        assert_eq!(claims.user_id, user_id);
    }

    #[test]
    fn expired_access_token_is_distinguished_from_invalid() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        let token = manager.issue_access_token(user_id, -1);
        assert!(matches!(
            manager.verify_access(&token),
            Err(AppError::ExpiredToken)
        ));
        assert!(matches!(
            manager.verify_access("not-a-token"),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn refresh_token_rejected_by_access_verifier() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        let refresh = manager.issue_refresh_token(user_id, Uuid::new_v4(), 604_800);
        assert!(matches!(
            manager.verify_access(&refresh),
            Err(AppError::InvalidToken)
        ));
    }
}
