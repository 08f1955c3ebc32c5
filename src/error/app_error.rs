use crate::auth::SessionCheck;
use crate::middleware::RequestId;
use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("Internal server error")]
    StoreTimeout,
    #[error("User not found")]
    UserNotFound,
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Administrator access required")]
    Forbidden,
    #[error("Invalid username/email or password")]
    InvalidCredentials,
    #[error("Your account is pending approval")]
    AccountPending,
    #[error("Your account application was rejected")]
    AccountRejected,
    #[error("Your account has been suspended")]
    AccountSuspended,
    #[error("You cannot apply this action to your own account or sessions")]
    SelfTargetRejected,
    #[error("{0}")]
    InvalidStatusTransition(String),
    #[error("Internal server error")]
    PasswordHash { message: String },
    #[error("User {0} already exists")]
    UserAlreadyExists(String),
    #[error("Password is too weak")]
    WeakPassword,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("OAuth sign-in failed: {0}")]
    OAuth(String),
    #[error("Internal server error")]
    UuidError {
        message: String,
        #[source]
        source: uuid::Error,
    },
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationErrors),
    #[error("Internal server error")]
    ConfigurationError {
        message: String,
        #[source]
        source: figment::Error,
    },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn uuid(message: impl Into<String>, source: uuid::Error) -> Self {
        Self::UuidError {
            message: message.into(),
            source,
        }
    }

    pub fn password_hash(message: impl Into<String>, source: password_hash::Error) -> Self {
        Self::PasswordHash {
            message: format!("{}: {}", message.into(), source),
        }
    }

    /// Stable machine-readable code rendered in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Db { .. } | AppError::StoreTimeout | AppError::PasswordHash { .. } | AppError::ConfigurationError { .. } => "internal_error",
            AppError::UserNotFound => "user_not_found",
            AppError::SessionNotFound(_) => "session_not_found",
            AppError::Unauthorized => "authentication_required",
            AppError::Forbidden => "forbidden",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::AccountPending => "account_pending",
            AppError::AccountRejected => "account_rejected",
            AppError::AccountSuspended => "account_suspended",
            AppError::SelfTargetRejected => "self_target_rejected",
            AppError::InvalidStatusTransition(_) => "invalid_status_transition",
            AppError::UserAlreadyExists(_) => "user_exists",
            AppError::WeakPassword => "weak_password",
            AppError::BadRequest(_) | AppError::UuidError { .. } => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::OAuth(_) => "oauth_failed",
            AppError::ValidationError(_) => "validation_error",
        }
    }
}

impl From<password_hash::Error> for AppError {
    fn from(e: password_hash::Error) -> Self {
        AppError::password_hash("Password hashing failed", e)
    }
}

impl From<uuid::Error> for AppError {
    fn from(e: uuid::Error) -> Self {
        AppError::uuid("Invalid UUID", e)
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::UserNotFound => Status::NotFound,
            AppError::SessionNotFound(_) => Status::NotFound,
            AppError::InvalidCredentials => Status::Unauthorized,
            AppError::AccountPending => Status::Forbidden,
            AppError::AccountRejected => Status::Forbidden,
            AppError::AccountSuspended => Status::Forbidden,
            AppError::SelfTargetRejected => Status::Forbidden,
            AppError::InvalidStatusTransition(_) => Status::Conflict,
            AppError::PasswordHash { .. } => Status::InternalServerError,
            AppError::Db { .. } => Status::InternalServerError,
            AppError::StoreTimeout => Status::ServiceUnavailable,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::Forbidden => Status::Forbidden,
            AppError::UserAlreadyExists(_) => Status::Conflict,
            AppError::WeakPassword => Status::BadRequest,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::OAuth(_) => Status::BadGateway,
            AppError::UuidError { .. } => Status::BadRequest,
            AppError::ValidationError(_) => Status::BadRequest,
            AppError::ConfigurationError { .. } => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = RequestId::of(req);

        let user_id = match req.local_cache(|| SessionCheck::Unchecked) {
            SessionCheck::Passed(user) => user.id.to_string(),
            _ => "anonymous".to_string(),
        };

        error!(
            error = ?self,
            request_id = %request_id,
            user_id = %user_id,
            method = %method,
            uri = %uri,
            "request failed"
        );

        let status = Status::from(&self);
        let body = serde_json::to_string(&ErrorBody {
            error: self.code(),
            message: self.to_string(),
        })
        .unwrap_or_else(|_| self.to_string());

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized - session missing, expired or terminated"),
            ("403", "Forbidden"),
            ("404", "Not Found"),
            ("409", "Conflict"),
            ("500", "Internal Server Error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::ConfigurationError {
            message: "Failed to read configuration".to_string(),
            source: e,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::db("Database error", e),
        }
    }
}
