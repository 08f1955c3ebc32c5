use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::user::{NewUser, User, UserStatus};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::rngs::OsRng;
use std::sync::LazyLock;
use uuid::Uuid;

/// A real Argon2 hash generated once at startup, used as a timing decoy
/// so that login requests for non-existent users take the same time as
/// requests for existing users.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| hash_password("dummy-never-matches").ok());

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &NewUser) -> Result<User, AppError>;
    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError>;
    /// Matches either the username or the email, both stored lowercase.
    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, AppError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn record_login(&self, id: &Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
    /// Moves the account from `from` to `to`; `None` when it was not in `from`.
    async fn update_user_status(&self, id: &Uuid, from: UserStatus, to: UserStatus) -> Result<Option<User>, AppError>;
}

const USER_COLUMNS: &str = "id, username, email, full_name, password_hash, status, is_admin, created_at, last_login_at";

#[async_trait::async_trait]
impl UserRepository for PostgresRepository {
    async fn create_user(&self, user: &NewUser) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, full_name, password_hash, status, is_admin)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(user.status)
        .bind(user.is_admin)
        .fetch_one(&self.pool)
        .await;

        match created {
            Ok(created) => Ok(created),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(AppError::UserAlreadyExists(user.username.clone())),
            Err(e) => Err(AppError::db("Failed to create user", e)),
        }
    }

    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1 LIMIT 1"))
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn record_login(&self, id: &Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_user_status(&self, id: &Uuid, from: UserStatus, to: UserStatus) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("UPDATE users SET status = $3 WHERE id = $1 AND status = $2 RETURNING {USER_COLUMNS}"))
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to update user status", e))?;

        Ok(user)
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(user: &User, password: &str) -> Result<(), AppError> {
    let password_hash = PasswordHash::new(&user.password_hash).map_err(|e| AppError::password_hash("Failed to parse stored password hash", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &password_hash)
        .map_err(|_| AppError::InvalidCredentials)
}

/// Perform a throwaway Argon2 verification to equalize response timing
/// regardless of whether the target account exists.
pub fn dummy_verify(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref()
        && let Ok(hash) = PasswordHash::new(hash)
    {
        let _ = Argon2::default().verify_password(password.as_bytes(), &hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserStatus;

    fn user_with_password(password: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: "carol".to_string(),
            email: "carol@example.com".to_string(),
            full_name: "Carol".to_string(),
            password_hash: hash_password(password).expect("hash"),
            status: UserStatus::Approved,
            is_admin: false,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn verify_accepts_matching_password() {
        let user = user_with_password("s3cret-passphrase");
        assert!(verify_password(&user, "s3cret-passphrase").is_ok());
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let user = user_with_password("s3cret-passphrase");
        assert!(matches!(verify_password(&user, "guess"), Err(AppError::InvalidCredentials)));
    }
}
