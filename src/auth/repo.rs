use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum CreateUserError {
    #[error("email already registered")]
    EmailTaken,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Credential store.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError>;
    /// Replaces any pending OTP of the user.
    async fn set_otp(&self, id: Uuid, otp: &str, issued_at: OffsetDateTime) -> anyhow::Result<()>;
    /// Flips an unverified user holding exactly `otp` to verified and clears
    /// the OTP. Returns `false` when no row matched.
    async fn mark_verified(&self, id: Uuid, otp: &str) -> anyhow::Result<bool>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool>;
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, is_verified, otp, otp_issued_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        let res = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, otp, otp_issued_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.otp)
        .bind(new_user.otp_issued_at)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(CreateUserError::EmailTaken)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn set_otp(&self, id: Uuid, otp: &str, issued_at: OffsetDateTime) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET otp = $2, otp_issued_at = $3, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(otp)
        .bind(issued_at)
        .execute(&self.db)
        .await
        .context("set otp")?;
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid, otp: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET is_verified = TRUE, otp = NULL, otp_issued_at = NULL, updated_at = now()
             WHERE id = $1 AND otp = $2 AND is_verified = FALSE
            "#,
        )
        .bind(id)
        .bind(otp)
        .execute(&self.db)
        .await
        .context("mark user verified")?;
        Ok(res.rows_affected() == 1)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .context("update password")?;
        Ok(res.rows_affected() == 1)
    }
}
