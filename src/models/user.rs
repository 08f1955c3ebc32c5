use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Approved => "approved",
            UserStatus::Rejected => "rejected",
            UserStatus::Suspended => "suspended",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub is_admin: bool,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub status: UserStatus,
    pub is_admin: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            status: user.status,
            is_admin: user.is_admin,
        }
    }
}

/// An account after an administrator changed its status.
#[derive(Serialize, Debug, JsonSchema)]
pub struct AccountStatusResponse {
    pub user: UserResponse,
    pub previous_status: UserStatus,
    pub sessions_terminated: u64,
}

/// Identity of the caller as seen by `/api/users/me`.
#[derive(Serialize, Debug, JsonSchema)]
pub struct CurrentUserResponse {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub full_name: String,
    #[validate(email, length(max = 128))]
    pub email: String,
    #[validate(length(min = 8))]
    #[validate(custom(function = "crate::models::user::validate_password_strength"))]
    pub password: String,
}

#[derive(Deserialize, Debug, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 128))]
    pub login: String,
    #[validate(length(min = 1))]
    pub password: String,
    pub next: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub expires_at: DateTime<Utc>,
    pub redirect: String,
}

#[derive(Serialize, Debug)]
pub struct RegistrationResponse {
    pub user: UserResponse,
    pub signed_in: bool,
    pub message: String,
}

pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let estimate = zxcvbn::zxcvbn(password, &[]);
    if u8::from(estimate.score()) < 3 {
        let mut err = ValidationError::new("weak_password");
        err.message = Some(Cow::from("Password is too easy to guess"));
        return Err(err);
    }
    Ok(())
}

/// Normalizes a login or email the way accounts are stored.
pub fn normalize_login(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_passwords_are_rejected() {
        assert!(validate_password_strength("password").is_err());
        assert!(validate_password_strength("correct horse battery staple 42!").is_ok());
    }

    #[test]
    fn register_request_validates_fields() {
        let request = RegisterRequest {
            username: "al".to_string(),
            full_name: "Alice".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
        };
        let errors = request.validate().expect_err("invalid request");
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn logins_are_case_insensitive() {
        assert_eq!(normalize_login("  Alice@Example.COM "), "alice@example.com");
    }
}
