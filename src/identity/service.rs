use std::sync::Arc;

use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::AppError;
use crate::crypto::token::{BearerIdentity, TokenManager};
use crate::crypto::{hash_identifier, sign_hmac, verify_hmac};
use crate::crypto::{canonical_payload, password};
use crate::domain::audit::actions;
use crate::domain::user::{Role, User, UserIdentity};

use super::repository::CredentialRepository;

/// `±5 min` request-timestamp window (spec.md §4.2/§4.3/§8). Fixed, not
/// configurable: operators are expected to keep clocks within this skew
/// rather than tune it (spec.md §5 "relies exclusively on the ±5-minute
/// timestamp window").
const HMAC_WINDOW_MS: i64 = 300_000;

const CLIENT_ID_PREFIX: &str = "pk_";
const CLIENT_SECRET_PREFIX: &str = "sk_";

fn random_token(prefix: &str) -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{prefix}{}", hex::encode(bytes))
}

pub struct RegisteredOrg {
    pub org_id: Uuid,
    pub client_id: String,
    pub client_secret: String,
    pub admin_user: UserIdentity,
}

pub struct LoggedIn {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: UserIdentity,
}

pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct OrgIdentity {
    pub org_id: Uuid,
    pub org_name: String,
}

/// The identity service (spec.md §4.2). A thin operation layer over
/// [`CredentialRepository`] and [`TokenManager`] — every method returns a
/// structured [`AppError`] rather than panicking, per spec.md's "all
/// return a structured error with code + message on failure."
#[derive(Clone)]
pub struct IdentityService {
    repo: CredentialRepository,
    tokens: Arc<TokenManager>,
}

impl IdentityService {
    pub fn new(pool: PgPool, tokens: Arc<TokenManager>) -> Self {
        IdentityService {
            repo: CredentialRepository::new(pool),
            tokens,
        }
    }

    #[tracing::instrument(name = "Register organization", skip_all, fields(org_name = %display_name))]
    pub async fn register_org(
        &self,
        display_name: &str,
        admin_email: &str,
        admin_password: SecretString,
    ) -> Result<RegisteredOrg, AppError> {
        if !password::is_password_strong(admin_password.expose_secret()) {
            return Err(AppError::InvalidPasswordFormat);
        }

        let client_id = random_token(CLIENT_ID_PREFIX);
        let client_secret = random_token(CLIENT_SECRET_PREFIX);
        let client_id_hash = hash_identifier(&client_id);
        let client_secret_hash = hash_identifier(&client_secret);

        let org = self
            .repo
            .insert_organization(display_name, CLIENT_ID_PREFIX, &client_id_hash, &client_secret_hash)
            .await?;

        let password_hash = password::hash_password(admin_password).await?;
        let owner = self
            .repo
            .insert_user(org.org_id, admin_email, &password_hash, Role::Owner)
            .await?;

        self.repo
            .record_audit(
                org.org_id,
                Some(owner.user_id),
                actions::ORG_REGISTERED,
                "organization",
                "success",
                json!({ "display_name": display_name }),
            )
            .await?;

        Ok(RegisteredOrg {
            org_id: org.org_id,
            client_id,
            client_secret,
            admin_user: UserIdentity::from(&owner),
        })
    }

    /// `POST /v1/auth/signup`: adds a new member to an already-registered
    /// org. HMAC-gated only — no bearer required, since the caller isn't a
    /// member yet.
    #[tracing::instrument(name = "Signup user", skip_all, fields(%org_id, email = %email))]
    pub async fn signup(
        &self,
        org_id: Uuid,
        email: &str,
        password_secret: SecretString,
    ) -> Result<UserIdentity, AppError> {
        if !password::is_password_strong(password_secret.expose_secret()) {
            return Err(AppError::InvalidPasswordFormat);
        }

        let password_hash = password::hash_password(password_secret).await?;
        let user = self
            .repo
            .insert_user(org_id, email, &password_hash, Role::User)
            .await?;

        Ok(UserIdentity::from(&user))
    }

    #[tracing::instrument(name = "Login", skip_all, fields(email = %email, %org_id))]
    #[allow(clippy::too_many_arguments)]
    pub async fn login(
        &self,
        email: &str,
        password_secret: SecretString,
        org_id: Uuid,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
        lockout_attempts: i32,
        lockout_seconds: i64,
    ) -> Result<LoggedIn, AppError> {
        let user = self
            .repo
            .find_user_by_email_and_org(email, org_id)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AppError::AccountInactive);
        }

        let now = OffsetDateTime::now_utc();
        if user.is_locked(now) {
            return Err(AppError::AccountLocked);
        }

        let matches = password::verify_password(password_secret, user.password_hash.clone()).await?;
        if !matches {
            let attempts = self
                .repo
                .record_login_failure(user.user_id, lockout_attempts, lockout_seconds)
                .await?;

            if attempts >= lockout_attempts {
                self.repo
                    .record_audit(
                        org_id,
                        Some(user.user_id),
                        actions::LOGIN_FAILED_ACCOUNT_LOCKED,
                        "user",
                        "failed",
                        json!({ "failed_login_attempts": attempts }),
                    )
                    .await?;
            } else {
                self.repo
                    .record_audit(
                        org_id,
                        Some(user.user_id),
                        actions::LOGIN_FAILED,
                        "user",
                        "failed",
                        json!({ "failed_login_attempts": attempts }),
                    )
                    .await?;
            }

            return Err(AppError::InvalidCredentials);
        }

        self.repo.record_login_success(user.user_id).await?;
        self.repo
            .record_audit(org_id, Some(user.user_id), actions::LOGIN_SUCCESS, "user", "success", Value::Null)
            .await?;

        let pair = self
            .issue_token_pair(&user, access_ttl_seconds, refresh_ttl_seconds)
            .await?;

        Ok(LoggedIn {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
            user: UserIdentity::from(&user),
        })
    }

    async fn issue_token_pair(
        &self,
        user: &User,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Result<TokenPair, AppError> {
        let access_token = self.tokens.issue_access_token(user.user_id, access_ttl_seconds);

        let token_id = Uuid::new_v4();
        let refresh_token = self
            .tokens
            .issue_refresh_token(user.user_id, token_id, refresh_ttl_seconds);
        let token_hash = hash_identifier(&refresh_token);
        let expires_at = OffsetDateTime::now_utc() + time::Duration::seconds(refresh_ttl_seconds);

        self.repo
            .insert_refresh_token(token_id, user.user_id, user.org_id, &token_hash, expires_at)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: access_ttl_seconds,
        })
    }

    /// `Refresh(refreshToken, orgId)`: atomically verifies-and-revokes
    /// before minting a new pair, so a replayed token can only ever
    /// resolve to one successor (spec.md §4.2/§5/§8).
    #[tracing::instrument(name = "Refresh token", skip_all, fields(%org_id))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        org_id: Uuid,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Result<TokenPair, AppError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|_| AppError::InvalidRefreshToken)?;

        let record = self.repo.find_refresh_token(claims.token_id).await?;
        let Some(record) = record else {
            self.repo
                .record_audit(
                    org_id,
                    Some(claims.user_id),
                    actions::TOKEN_REUSE_DETECTED,
                    "refresh_token",
                    "failed",
                    json!({ "token_id": claims.token_id }),
                )
                .await?;
            return Err(AppError::InvalidRefreshToken);
        };

        if record.revoked || record.expires_at.0 < OffsetDateTime::now_utc() {
            self.repo
                .record_audit(
                    org_id,
                    Some(claims.user_id),
                    actions::TOKEN_REUSE_DETECTED,
                    "refresh_token",
                    "failed",
                    json!({ "token_id": claims.token_id }),
                )
                .await?;
            return Err(AppError::InvalidRefreshToken);
        }

        let user = self
            .repo
            .find_user_by_id(claims.user_id)
            .await?
            .ok_or(AppError::InvalidRefreshToken)?;

        let access_token = self.tokens.issue_access_token(user.user_id, access_ttl_seconds);
        let new_token_id = Uuid::new_v4();
        let new_refresh_token =
            self.tokens
                .issue_refresh_token(user.user_id, new_token_id, refresh_ttl_seconds);
        let new_token_hash = hash_identifier(&new_refresh_token);
        let new_expires_at = OffsetDateTime::now_utc() + time::Duration::seconds(refresh_ttl_seconds);

        self.repo
            .rotate_refresh_token(
                claims.token_id,
                new_token_id,
                user.user_id,
                user.org_id,
                &new_token_hash,
                new_expires_at,
            )
            .await?;

        self.repo
            .record_audit(org_id, Some(user.user_id), actions::TOKEN_REFRESHED, "refresh_token", "success", Value::Null)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh_token,
            expires_in: access_ttl_seconds,
        })
    }

    /// Idempotent: revoking an already-revoked or unknown record is a
    /// no-op success, matching spec.md §4.2.
    #[tracing::instrument(name = "Logout", skip_all, fields(%user_id))]
    pub async fn logout(&self, org_id: Uuid, user_id: Uuid, refresh_token: &str) -> Result<(), AppError> {
        if let Ok(claims) = self.tokens.verify_refresh(refresh_token) {
            self.repo.revoke_refresh_token(claims.token_id).await?;
            self.repo
                .record_audit(
                    org_id,
                    Some(user_id),
                    actions::LOGOUT,
                    "refresh_token",
                    "success",
                    Value::Null,
                )
                .await
                .ok();
        }
        Ok(())
    }

    pub async fn validate_bearer(&self, token: &str) -> Result<BearerIdentity, AppError> {
        let claims = self.tokens.verify_access(token)?;
        let user = self
            .repo
            .find_user_by_id(claims.user_id)
            .await?
            .ok_or(AppError::InvalidToken)?;

        if !user.is_active {
            return Err(AppError::AccountInactive);
        }

        Ok(BearerIdentity {
            user_id: user.user_id,
            org_id: user.org_id,
            role: user.role,
        })
    }

    /// `ValidateHMAC(clientId, timestamp, signature, payload)` (spec.md
    /// §4.2/§4.3). Timestamp skew exactly at ±300000ms is accepted; one ms
    /// beyond is rejected (spec.md §8 boundary behavior).
    #[allow(clippy::too_many_arguments)]
    pub async fn validate_hmac(
        &self,
        client_id: &str,
        timestamp: &str,
        signature: &str,
        method: &str,
        path: &str,
        body: &Value,
    ) -> Result<OrgIdentity, AppError> {
        let client_id_hash = hash_identifier(client_id);
        let org = self
            .repo
            .find_org_by_client_id_hash(&client_id_hash)
            .await?
            .ok_or(AppError::InvalidClientId)?;

        if !org.is_active {
            return Err(AppError::InvalidClientId);
        }

        let timestamp_ms: i64 = timestamp.parse().map_err(|_| AppError::ExpiredRequest)?;
        let now_ms = OffsetDateTime::now_utc().unix_timestamp() * 1000;
        if (now_ms - timestamp_ms).abs() > HMAC_WINDOW_MS {
            return Err(AppError::ExpiredRequest);
        }

        let payload = canonical_payload(method, path, timestamp, body);
        if !verify_hmac(&org.client_secret_hash, &payload, signature) {
            return Err(AppError::InvalidSignature);
        }

        Ok(OrgIdentity {
            org_id: org.org_id,
            org_name: org.display_name,
        })
    }

    /// Exposed so the public `/v1/auth/validate-hmac` endpoint can answer
    /// without itself being HMAC-gated (spec.md §6.1).
    pub fn sign_for(secret_hash: &str, method: &str, path: &str, timestamp: &str, body: &Value) -> String {
        let payload = canonical_payload(method, path, timestamp, body);
        sign_hmac(secret_hash, &payload)
    }

    pub async fn list_users(&self, org_id: Uuid) -> Result<Vec<UserIdentity>, AppError> {
        let users = self.repo.list_users(org_id).await?;
        Ok(users.iter().map(UserIdentity::from).collect())
    }

    /// `PATCH /v1/users/{id}/role`: owner-only at the route layer; the
    /// hierarchy the route checks against is the single `Role` enum, not a
    /// hardcoded list (resolves spec.md §9's flagged Open Question).
    pub async fn update_role(&self, user_id: Uuid, org_id: Uuid, role: Role) -> Result<(), AppError> {
        self.repo.update_role(user_id, org_id, role).await
    }
}
