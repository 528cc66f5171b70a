use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::AppError;
use crate::domain::audit::AuditEntry;
use crate::domain::token::RefreshTokenRecord;
use crate::domain::user::{Role, User};
use crate::domain::{org::Organization, Timestamptz};

/// The credential store (spec.md §4 "Credential store"): organizations,
/// users, refresh tokens, and the append-only audit log. A thin wrapper
/// over `PgPool`, following the teacher's repository-function style
/// (`app/auth/password.rs`'s `get_stored_credentials`) rather than a
/// trait object, since there is exactly one persistence backend.
#[derive(Clone)]
pub struct CredentialRepository {
    pool: PgPool,
}

impl CredentialRepository {
    pub fn new(pool: PgPool) -> Self {
        CredentialRepository { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn insert_organization(
        &self,
        display_name: &str,
        client_id_prefix: &str,
        client_id_hash: &str,
        client_secret_hash: &str,
    ) -> Result<Organization, AppError> {
        let org_id = Uuid::new_v4();
        let row = sqlx::query!(
            r#"
            insert into organizations
                (org_id, display_name, client_id_prefix, client_id_hash, client_secret_hash, is_active, created_at, updated_at)
            values ($1, $2, $3, $4, true, now(), now())
            returning org_id, display_name, client_id_prefix, client_id_hash, client_secret_hash, is_active, created_at, updated_at
            "#,
            org_id,
            display_name,
            client_id_prefix,
            client_id_hash,
            client_secret_hash,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::DuplicateOrg,
            other => other.into(),
        })?;

        Ok(Organization {
            org_id: row.org_id,
            display_name: row.display_name,
            client_id_prefix: row.client_id_prefix,
            client_id_hash: row.client_id_hash,
            client_secret_hash: row.client_secret_hash,
            is_active: row.is_active,
            created_at: Timestamptz(row.created_at),
            updated_at: Timestamptz(row.updated_at),
        })
    }

    pub async fn find_org_by_client_id_hash(
        &self,
        client_id_hash: &str,
    ) -> Result<Option<Organization>, AppError> {
        let row = sqlx::query!(
            r#"
            select org_id, display_name, client_id_prefix, client_id_hash, client_secret_hash, is_active, created_at, updated_at
            from organizations
            where client_id_hash = $1
            "#,
            client_id_hash
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Organization {
            org_id: r.org_id,
            display_name: r.display_name,
            client_id_prefix: r.client_id_prefix,
            client_id_hash: r.client_id_hash,
            client_secret_hash: r.client_secret_hash,
            is_active: r.is_active,
            created_at: Timestamptz(r.created_at),
            updated_at: Timestamptz(r.updated_at),
        }))
    }

    pub async fn insert_user(
        &self,
        org_id: Uuid,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, AppError> {
        let user_id = Uuid::new_v4();
        let row = sqlx::query!(
            r#"
            insert into users
                (user_id, org_id, email, password_hash, role, is_active, failed_login_attempts, created_at, updated_at)
            values ($1, $2, $3, $4, $5, true, 0, now(), now())
            returning user_id, org_id, email, password_hash, role as "role: Role", is_active,
                      failed_login_attempts, locked_until, last_login_at, created_at, updated_at
            "#,
            user_id,
            org_id,
            email,
            password_hash,
            role as Role,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::DuplicateEmail,
            other => other.into(),
        })?;

        Ok(row_to_user(
            row.user_id,
            row.org_id,
            row.email,
            row.password_hash,
            row.role,
            row.is_active,
            row.failed_login_attempts,
            row.locked_until,
            row.last_login_at,
            row.created_at,
            row.updated_at,
        ))
    }

    pub async fn find_user_by_email_and_org(
        &self,
        email: &str,
        org_id: Uuid,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query!(
            r#"
            select user_id, org_id, email, password_hash, role as "role: Role", is_active,
                   failed_login_attempts, locked_until, last_login_at, created_at, updated_at
            from users
            where email = $1 and org_id = $2
            "#,
            email,
            org_id
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            row_to_user(
                r.user_id,
                r.org_id,
                r.email,
                r.password_hash,
                r.role,
                r.is_active,
                r.failed_login_attempts,
                r.locked_until,
                r.last_login_at,
                r.created_at,
                r.updated_at,
            )
        }))
    }

    pub async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query!(
            r#"
            select user_id, org_id, email, password_hash, role as "role: Role", is_active,
                   failed_login_attempts, locked_until, last_login_at, created_at, updated_at
            from users
            where user_id = $1
            "#,
            user_id
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            row_to_user(
                r.user_id,
                r.org_id,
                r.email,
                r.password_hash,
                r.role,
                r.is_active,
                r.failed_login_attempts,
                r.locked_until,
                r.last_login_at,
                r.created_at,
                r.updated_at,
            )
        }))
    }

    pub async fn record_login_failure(
        &self,
        user_id: Uuid,
        lockout_attempts: i32,
        lockout_seconds: i64,
    ) -> Result<i32, AppError> {
        let row = sqlx::query!(
            r#"
            update users
            set failed_login_attempts = failed_login_attempts + 1,
                locked_until = case
                    when failed_login_attempts + 1 >= $2
                        then now() + make_interval(secs => $3)
                    else locked_until
                end,
                updated_at = now()
            where user_id = $1
            returning failed_login_attempts
            "#,
            user_id,
            lockout_attempts,
            lockout_seconds as f64,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.failed_login_attempts)
    }

    pub async fn record_login_success(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query!(
            r#"
            update users
            set failed_login_attempts = 0, locked_until = null, last_login_at = now(), updated_at = now()
            where user_id = $1
            "#,
            user_id
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_role(&self, user_id: Uuid, org_id: Uuid, role: Role) -> Result<(), AppError> {
        let result = sqlx::query!(
            r#"update users set role = $3, updated_at = now() where user_id = $1 and org_id = $2"#,
            user_id,
            org_id,
            role as Role,
        )
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn list_users(&self, org_id: Uuid) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query!(
            r#"
            select user_id, org_id, email, password_hash, role as "role: Role", is_active,
                   failed_login_attempts, locked_until, last_login_at, created_at, updated_at
            from users
            where org_id = $1
            order by created_at asc
            "#,
            org_id
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                row_to_user(
                    r.user_id,
                    r.org_id,
                    r.email,
                    r.password_hash,
                    r.role,
                    r.is_active,
                    r.failed_login_attempts,
                    r.locked_until,
                    r.last_login_at,
                    r.created_at,
                    r.updated_at,
                )
            })
            .collect())
    }

    pub async fn insert_refresh_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        org_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        sqlx::query!(
            r#"
            insert into refresh_tokens (token_id, user_id, org_id, token_hash, expires_at, revoked, created_at)
            values ($1, $2, $3, $4, $5, false, now())
            "#,
            token_id,
            user_id,
            org_id,
            token_hash,
            expires_at,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_refresh_token(
        &self,
        token_id: Uuid,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let row = sqlx::query!(
            r#"
            select token_id, user_id, org_id, token_hash, expires_at, revoked, revoked_at, created_at
            from refresh_tokens
            where token_id = $1
            "#,
            token_id
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RefreshTokenRecord {
            token_id: r.token_id,
            user_id: r.user_id,
            org_id: r.org_id,
            token_hash: r.token_hash,
            expires_at: Timestamptz(r.expires_at),
            revoked: r.revoked,
            revoked_at: r.revoked_at.map(Timestamptz),
            created_at: Timestamptz(r.created_at),
        }))
    }

    /// Atomically revokes the old record and inserts the new one in a
    /// single transaction, so a replayed refresh token can never resolve
    /// to more than one successor (the "rotation" invariant of spec.md
    /// §3/§5).
    pub async fn rotate_refresh_token(
        &self,
        old_token_id: Uuid,
        new_token_id: Uuid,
        user_id: Uuid,
        org_id: Uuid,
        new_token_hash: &str,
        new_expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query!(
            r#"
            update refresh_tokens
            set revoked = true, revoked_at = now()
            where token_id = $1 and revoked = false
            "#,
            old_token_id
        )
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::InvalidRefreshToken);
        }

        sqlx::query!(
            r#"
            insert into refresh_tokens (token_id, user_id, org_id, token_hash, expires_at, revoked, created_at)
            values ($1, $2, $3, $4, $5, false, now())
            "#,
            new_token_id,
            user_id,
            org_id,
            new_token_hash,
            new_expires_at,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn revoke_refresh_token(&self, token_id: Uuid) -> Result<(), AppError> {
        sqlx::query!(
            r#"
            update refresh_tokens
            set revoked = true, revoked_at = now()
            where token_id = $1 and revoked = false
            "#,
            token_id
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn record_audit(
        &self,
        org_id: Uuid,
        user_id: Option<Uuid>,
        action: &str,
        resource: &str,
        status: &str,
        details: Value,
    ) -> Result<AuditEntry, AppError> {
        let id = Uuid::new_v4();
        let row = sqlx::query!(
            r#"
            insert into audit_entries (id, org_id, user_id, action, resource, status, details, created_at)
            values ($1, $2, $3, $4, $5, $6, $7, now())
            returning id, org_id, user_id, action, resource, status, details, ip, user_agent, created_at
            "#,
            id,
            org_id,
            user_id,
            action,
            resource,
            status,
            details,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AuditEntry {
            id: row.id,
            org_id: row.org_id,
            user_id: row.user_id,
            action: row.action,
            resource: row.resource,
            status: row.status,
            details: row.details,
            ip: row.ip,
            user_agent: row.user_agent,
            created_at: Timestamptz(row.created_at),
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn row_to_user(
    user_id: Uuid,
    org_id: Uuid,
    email: String,
    password_hash: String,
    role: Role,
    is_active: bool,
    failed_login_attempts: i32,
    locked_until: Option<OffsetDateTime>,
    last_login_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
) -> User {
    User {
        user_id,
        org_id,
        email,
        password_hash,
        role,
        is_active,
        failed_login_attempts,
        locked_until: locked_until.map(Timestamptz),
        last_login_at: last_login_at.map(Timestamptz),
        created_at: Timestamptz(created_at),
        updated_at: Timestamptz(updated_at),
    }
}
