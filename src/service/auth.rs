use crate::database::audit::{AuditLog, record_quietly};
use crate::database::user::{UserRepository, dummy_verify, hash_password, verify_password};
use crate::error::app_error::AppError;
use crate::models::audit::{AuditEvent, audit_events};
use crate::models::session::ClientInfo;
use crate::models::user::{LoginRequest, NewUser, RegisterRequest, User, UserStatus, normalize_login};
use crate::service::session::{IssuedSession, SessionService};
use serde_json::json;
use tracing::info;

/// A user who just received a session.
#[derive(Debug)]
pub struct SignedIn {
    pub user: User,
    pub session: IssuedSession,
}

/// Result of a registration.
#[derive(Debug)]
pub enum Registration {
    /// Account created and signed in straight away.
    SignedIn(SignedIn),
    /// Account created; an administrator must approve it before it can log in.
    PendingApproval(User),
}

/// Establishes identities. Every successful path ends in `SessionService::issue`.
pub struct AuthService<'a> {
    pub users: &'a dyn UserRepository,
    pub sessions: &'a SessionService,
    pub audit: &'a dyn AuditLog,
}

/// Only approved accounts may hold a session.
pub fn ensure_can_sign_in(user: &User) -> Result<(), AppError> {
    match user.status {
        UserStatus::Approved => Ok(()),
        UserStatus::Pending => Err(AppError::AccountPending),
        UserStatus::Rejected => Err(AppError::AccountRejected),
        UserStatus::Suspended => Err(AppError::AccountSuspended),
    }
}

impl<'a> AuthService<'a> {
    pub async fn login(&self, request: &LoginRequest, client: ClientInfo) -> Result<SignedIn, AppError> {
        let login = normalize_login(&request.login);

        let Some(user) = self.users.get_user_by_login(&login).await? else {
            dummy_verify(&request.password);
            self.login_failed(None, &client, "unknown_user").await;
            return Err(AppError::InvalidCredentials);
        };

        if let Err(err) = verify_password(&user, &request.password) {
            self.login_failed(Some(&user), &client, "bad_password").await;
            return Err(err);
        }

        if let Err(err) = ensure_can_sign_in(&user) {
            self.login_failed(Some(&user), &client, err.code()).await;
            return Err(err);
        }

        self.sign_in(user, client, "password").await
    }

    pub async fn register(&self, request: &RegisterRequest, require_approval: bool, client: ClientInfo) -> Result<Registration, AppError> {
        let status = if require_approval { UserStatus::Pending } else { UserStatus::Approved };
        let new_user = NewUser {
            username: normalize_login(&request.username),
            email: normalize_login(&request.email),
            full_name: request.full_name.trim().to_string(),
            password_hash: hash_password(&request.password)?,
            status,
            is_admin: false,
        };

        if self.users.get_user_by_email(&new_user.email).await?.is_some() {
            return Err(AppError::UserAlreadyExists(new_user.email));
        }

        let user = self.users.create_user(&new_user).await?;
        record_quietly(
            self.audit,
            AuditEvent::success(audit_events::REGISTRATION, Some(user.id))
                .client(client.address.clone(), client.agent.clone())
                .metadata(json!({ "status": user.status })),
        )
        .await;
        info!(user_id = %user.id, username = %user.username, status = ?user.status, "user registered");

        if require_approval {
            return Ok(Registration::PendingApproval(user));
        }

        Ok(Registration::SignedIn(self.sign_in(user, client, "registration").await?))
    }

    /// Signs in the account matching a provider-asserted email.
    pub async fn login_with_oauth(&self, email: &str, provider: &str, client: ClientInfo) -> Result<SignedIn, AppError> {
        let email = normalize_login(email);
        let Some(user) = self.users.get_user_by_email(&email).await? else {
            self.login_failed(None, &client, "oauth_unknown_account").await;
            return Err(AppError::UserNotFound);
        };

        if let Err(err) = ensure_can_sign_in(&user) {
            self.login_failed(Some(&user), &client, err.code()).await;
            return Err(err);
        }

        self.sign_in(user, client, provider).await
    }

    async fn sign_in(&self, user: User, client: ClientInfo, method: &str) -> Result<SignedIn, AppError> {
        let session = self.sessions.issue(&user.id, client.clone()).await?;
        self.users.record_login(&user.id, session.record.issued_at).await?;

        record_quietly(
            self.audit,
            AuditEvent::success(audit_events::LOGIN_SUCCESS, Some(user.id))
                .client(client.address, client.agent)
                .metadata(json!({ "method": method, "session_id": session.record.id })),
        )
        .await;

        Ok(SignedIn { user, session })
    }

    async fn login_failed(&self, user: Option<&User>, client: &ClientInfo, reason: &str) {
        record_quietly(
            self.audit,
            AuditEvent::failure(audit_events::LOGIN_FAILED, user.map(|u| u.id))
                .client(client.address.clone(), client.agent.clone())
                .metadata(json!({ "reason": reason })),
        )
        .await;
    }
}
