//! Identity routes (spec.md §6.1): org onboarding, login/signup/refresh,
//! logout, the two validate-* diagnostic endpoints, and user management.
//! Handlers are thin: request validation + response shaping around
//! [`IdentityService`], mirroring the teacher's `routes/auth.rs`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Router;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::app::error::AppError;
use crate::app::extractor::{AuthUser, OrgContext};
use crate::app::response::{ApiResponse, StatusApiResponse};
use crate::app::validated_json::ValidatedJson;
use crate::app::ApiContext;
use crate::domain::user::{Role, UserIdentity};
use crate::identity::service::OrgIdentity;

pub fn public_router() -> Router<ApiContext> {
    Router::new()
        .route("/v1/org/register", post(register_org))
        .route("/v1/auth/validate-hmac", post(validate_hmac))
}

/// HMAC-only: the caller isn't a member of the org yet (signup) or hasn't
/// been issued a bearer token yet (login/refresh), so only the org-level
/// signature is checked.
pub fn hmac_router() -> Router<ApiContext> {
    Router::new()
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/signup", post(signup))
        .route("/v1/auth/refresh", post(refresh))
}

/// HMAC + bearer: the caller must already be a member of the signing org.
pub fn hmac_bearer_router() -> Router<ApiContext> {
    Router::new()
        .route("/v1/auth/logout", post(logout))
        .route("/v1/users", get(list_users).post(create_user))
        .route("/v1/users/{id}/role", patch(update_role))
}

/// Bearer-only, per spec.md §6.1: no HMAC gate runs ahead of it, since the
/// whole point is to validate the bearer token standalone.
pub fn bearer_only_router() -> Router<ApiContext> {
    Router::new().route("/v1/auth/validate-jwt", post(validate_jwt))
}

#[derive(Debug, Deserialize, Validate)]
struct RegisterOrgRequest {
    #[validate(length(min = 1, max = 255))]
    org_name: String,
    #[validate(email)]
    admin_email: String,
    #[validate(length(min = 8))]
    admin_password: String,
}

#[derive(Debug, Serialize)]
struct RegisterOrgResponse {
    org_id: Uuid,
    client_id: String,
    client_secret: String,
    admin_user: UserIdentity,
}

#[tracing::instrument(name = "Register organization", skip_all, fields(org_name = %req.org_name))]
async fn register_org(
    ctx: State<ApiContext>,
    ValidatedJson(req): ValidatedJson<RegisterOrgRequest>,
) -> Result<StatusApiResponse<RegisterOrgResponse>, AppError> {
    let registered = ctx
        .identity
        .register_org(&req.org_name, &req.admin_email, SecretString::from(req.admin_password))
        .await?;

    Ok(StatusApiResponse(
        StatusCode::CREATED,
        ApiResponse::ok(
            "organization registered",
            RegisterOrgResponse {
                org_id: registered.org_id,
                client_id: registered.client_id,
                client_secret: registered.client_secret,
                admin_user: registered.admin_user,
            },
        ),
    ))
}

#[derive(Debug, Deserialize)]
struct ValidateHmacRequest {
    client_id: String,
    signature: String,
    timestamp: String,
    payload: Value,
}

#[derive(Debug, Serialize)]
struct ValidateHmacResponse {
    valid: bool,
    org_id: Uuid,
    org_name: String,
}

/// Public diagnostic endpoint (spec.md §6.1): re-derives the signature from
/// the supplied `payload` (the same `{method, path, body}` shape the
/// signer used) rather than this request's own method/path, since the
/// whole point is to validate a signature computed for some other call.
#[tracing::instrument(name = "Validate HMAC", skip_all, fields(client_id = %req.client_id))]
async fn validate_hmac(
    ctx: State<ApiContext>,
    axum::Json(req): axum::Json<ValidateHmacRequest>,
) -> Result<ApiResponse<ValidateHmacResponse>, AppError> {
    let method = req.payload.get("method").and_then(Value::as_str).unwrap_or_default();
    let path = req.payload.get("path").and_then(Value::as_str).unwrap_or_default();
    let body = req
        .payload
        .get("body")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    let OrgIdentity { org_id, org_name } = ctx
        .identity
        .validate_hmac(&req.client_id, &req.timestamp, &req.signature, method, path, &body)
        .await?;

    Ok(ApiResponse::ok(
        "signature is valid",
        ValidateHmacResponse { valid: true, org_id, org_name },
    ))
}

#[derive(Debug, Deserialize, Validate)]
struct LoginRequest {
    #[validate(email)]
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    token_type: &'static str,
    user: UserIdentity,
}

#[tracing::instrument(name = "Login", skip_all, fields(email = %req.email))]
async fn login(
    ctx: State<ApiContext>,
    org: OrgContext,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, AppError> {
    let logged_in = ctx
        .identity
        .login(
            &req.email,
            SecretString::from(req.password),
            org.org_id,
            ctx.config.access_token_ttl_seconds,
            ctx.config.refresh_token_ttl_seconds,
            ctx.config.lockout_attempts,
            ctx.config.lockout_seconds,
        )
        .await?;

    Ok(ApiResponse::ok(
        "login successful",
        LoginResponse {
            access_token: logged_in.access_token,
            refresh_token: logged_in.refresh_token,
            expires_in: logged_in.expires_in,
            token_type: "Bearer",
            user: logged_in.user,
        },
    ))
}

#[derive(Debug, Deserialize, Validate)]
struct SignupRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8))]
    password: String,
}

#[tracing::instrument(name = "Signup", skip_all, fields(email = %req.email))]
async fn signup(
    ctx: State<ApiContext>,
    org: OrgContext,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<StatusApiResponse<UserIdentity>, AppError> {
    let user = ctx
        .identity
        .signup(org.org_id, &req.email, SecretString::from(req.password))
        .await?;

    Ok(StatusApiResponse(
        StatusCode::CREATED,
        ApiResponse::ok("user created", user),
    ))
}

#[derive(Debug, Deserialize, Validate)]
struct RefreshRequest {
    #[validate(length(min = 1))]
    refresh_token: String,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    token_type: &'static str,
}

#[tracing::instrument(name = "Refresh token", skip_all)]
async fn refresh(
    ctx: State<ApiContext>,
    org: OrgContext,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<ApiResponse<RefreshResponse>, AppError> {
    let pair = ctx
        .identity
        .refresh(
            &req.refresh_token,
            org.org_id,
            ctx.config.access_token_ttl_seconds,
            ctx.config.refresh_token_ttl_seconds,
        )
        .await?;

    Ok(ApiResponse::ok(
        "token refreshed",
        RefreshResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
            token_type: "Bearer",
        },
    ))
}

#[derive(Debug, Deserialize, Validate)]
struct LogoutRequest {
    #[validate(length(min = 1))]
    refresh_token: String,
}

#[tracing::instrument(name = "Logout", skip_all, fields(user_id = %user.user_id))]
async fn logout(
    ctx: State<ApiContext>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<LogoutRequest>,
) -> Result<ApiResponse<()>, AppError> {
    ctx.identity.logout(user.org_id, user.user_id, &req.refresh_token).await?;
    Ok(ApiResponse::ok("logged out", ()))
}

#[derive(Debug, Serialize)]
struct ValidateJwtResponse {
    valid: bool,
    user: UserIdentity,
}

/// The one bearer-only route (spec.md §6.1/§9): parses the bearer token
/// itself rather than depending on `bearer_required`, since that middleware
/// may run without a preceding `hmac_required` stage here and this handler
/// has no HMAC-derived org to cross-check against anyway.
#[tracing::instrument(name = "Validate bearer token", skip_all)]
async fn validate_jwt(
    ctx: State<ApiContext>,
    headers: axum::http::HeaderMap,
) -> Result<ApiResponse<ValidateJwtResponse>, AppError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::MissingAuthHeader)?;

    let bearer = ctx.identity.validate_bearer(token).await?;

    Ok(ApiResponse::ok(
        "token is valid",
        ValidateJwtResponse {
            valid: true,
            user: UserIdentity {
                user_id: bearer.user_id,
                org_id: bearer.org_id,
                email: String::new(),
                role: bearer.role,
            },
        },
    ))
}

/// `GET /v1/users` (spec.md §6.1): admin-and-above only, scoped to the
/// caller's own org.
#[tracing::instrument(name = "List users", skip_all, fields(org_id = %user.org_id))]
async fn list_users(
    ctx: State<ApiContext>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<UserIdentity>>, AppError> {
    user.require_role(Role::Admin)?;
    let users = ctx.identity.list_users(user.org_id).await?;
    Ok(ApiResponse::ok("users listed", users))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateUserRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8))]
    password: String,
    #[serde(default)]
    role: Option<Role>,
}

/// `POST /v1/users` (spec.md §6.1): admin-and-above creates a member
/// directly (unlike `/v1/auth/signup`, which is self-service and always
/// issues `user`). An admin may only mint `user`/`admin`, never `owner`.
#[tracing::instrument(name = "Create user", skip_all, fields(org_id = %user.org_id, email = %req.email))]
async fn create_user(
    ctx: State<ApiContext>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<StatusApiResponse<UserIdentity>, AppError> {
    user.require_role(Role::Admin)?;

    let requested_role = req.role.unwrap_or(Role::User);
    if requested_role == Role::Owner {
        return Err(AppError::InsufficientPermission);
    }

    let created = ctx
        .identity
        .signup(user.org_id, &req.email, SecretString::from(req.password))
        .await?;

    if requested_role != Role::User {
        ctx.identity.update_role(created.user_id, user.org_id, requested_role).await?;
    }

    Ok(StatusApiResponse(
        StatusCode::CREATED,
        ApiResponse::ok(
            "user created",
            UserIdentity { role: requested_role, ..created },
        ),
    ))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateRoleRequest {
    role: Role,
}

/// `PATCH /v1/users/{id}/role`: owner-only (spec.md §6.1). Like
/// `create_user`, this path can never mint a second `owner` — ownership
/// only ever exists via `register_org` (spec.md §3 "each org has exactly
/// one owner at steady state").
#[tracing::instrument(name = "Update role", skip_all, fields(org_id = %user.org_id, target_user_id = %target_user_id))]
async fn update_role(
    ctx: State<ApiContext>,
    user: AuthUser,
    Path(target_user_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_role(Role::Owner)?;
    if req.role == Role::Owner {
        return Err(AppError::InsufficientPermission);
    }
    ctx.identity.update_role(target_user_id, user.org_id, req.role).await?;
    Ok(ApiResponse::ok("role updated", ()))
}
