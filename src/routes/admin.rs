use crate::auth::AdminUser;
use crate::database::audit::{AuditLog, record_quietly};
use crate::database::user::UserRepository;
use crate::error::app_error::AppError;
use crate::models::audit::{AuditEvent, audit_events};
use crate::models::session::{ActiveSessionResponse, ClientInfo, SessionHistoryResponse, TerminateAllResponse, TerminateSessionResponse};
use crate::models::user::{AccountStatusResponse, UserResponse};
use crate::service::account::{AccountAction, AccountService};
use crate::service::session::SessionService;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

async fn audit_rejection(audit: &dyn AuditLog, admin: &AdminUser, client: &ClientInfo, target: serde_json::Value) {
    record_quietly(
        audit,
        AuditEvent::failure(audit_events::TERMINATION_REJECTED, Some(admin.0.id))
            .client(client.address.clone(), client.agent.clone())
            .metadata(json!({ "reason": "self_target", "target": target })),
    )
    .await;
}

/// List every live session
#[openapi(tag = "Admin")]
#[get("/sessions")]
pub async fn list_sessions(sessions: &State<SessionService>, admin: AdminUser) -> Result<Json<Vec<ActiveSessionResponse>>, AppError> {
    let rows = sessions.list_active().await?;
    let current = admin.0.session.id;
    Ok(Json(rows.iter().map(|row| ActiveSessionResponse::new(row, &current)).collect()))
}

/// Session history of one user, newest first
#[openapi(tag = "Admin")]
#[get("/users/<user_id>/sessions?<limit>")]
pub async fn list_user_sessions(
    sessions: &State<SessionService>,
    users: &State<Arc<dyn UserRepository>>,
    _admin: AdminUser,
    user_id: &str,
    limit: Option<i64>,
) -> Result<Json<Vec<SessionHistoryResponse>>, AppError> {
    let user_id = Uuid::parse_str(user_id)?;
    if users.get_user_by_id(&user_id).await?.is_none() {
        return Err(AppError::UserNotFound);
    }

    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    let now = sessions.now();
    let history = sessions.history_for_user(&user_id, limit).await?;
    Ok(Json(history.iter().map(|session| SessionHistoryResponse::new(session, now)).collect()))
}

/// Terminate one session
#[openapi(tag = "Admin")]
#[post("/sessions/<session_id>/terminate")]
pub async fn terminate_session(
    sessions: &State<SessionService>,
    audit: &State<Arc<dyn AuditLog>>,
    admin: AdminUser,
    client: ClientInfo,
    session_id: &str,
) -> Result<Json<TerminateSessionResponse>, AppError> {
    let session_id = Uuid::parse_str(session_id)?;

    let terminated = match sessions.terminate_one(&admin.0.id, &session_id).await {
        Ok(terminated) => terminated,
        Err(AppError::SelfTargetRejected) => {
            audit_rejection(audit.inner().as_ref(), &admin, &client, json!({ "session_id": session_id })).await;
            return Err(AppError::SelfTargetRejected);
        }
        Err(err) => return Err(err),
    };

    if terminated.changed {
        record_quietly(
            audit.inner().as_ref(),
            AuditEvent::success(audit_events::SESSION_TERMINATED, Some(terminated.session.user_id))
                .client(client.address, client.agent)
                .metadata(json!({ "session_id": session_id, "terminated_by": admin.0.id })),
        )
        .await;
    }

    Ok(Json(TerminateSessionResponse {
        session_id,
        terminated: terminated.changed,
    }))
}

/// Terminate every session of one user
#[openapi(tag = "Admin")]
#[post("/users/<user_id>/sessions/terminate")]
pub async fn terminate_user_sessions(
    sessions: &State<SessionService>,
    users: &State<Arc<dyn UserRepository>>,
    audit: &State<Arc<dyn AuditLog>>,
    admin: AdminUser,
    client: ClientInfo,
    user_id: &str,
) -> Result<Json<TerminateAllResponse>, AppError> {
    let user_id = Uuid::parse_str(user_id)?;
    if users.get_user_by_id(&user_id).await?.is_none() {
        return Err(AppError::UserNotFound);
    }

    let count = match sessions.terminate_all(&admin.0.id, &user_id).await {
        Ok(count) => count,
        Err(AppError::SelfTargetRejected) => {
            audit_rejection(audit.inner().as_ref(), &admin, &client, json!({ "user_id": user_id })).await;
            return Err(AppError::SelfTargetRejected);
        }
        Err(err) => return Err(err),
    };

    record_quietly(
        audit.inner().as_ref(),
        AuditEvent::success(audit_events::SESSIONS_TERMINATED_ALL, Some(user_id))
            .client(client.address, client.agent)
            .metadata(json!({ "count": count, "terminated_by": admin.0.id })),
    )
    .await;

    Ok(Json(TerminateAllResponse { user_id, terminated: count }))
}

async fn change_account(
    sessions: &SessionService,
    users: &dyn UserRepository,
    audit: &dyn AuditLog,
    admin: &AdminUser,
    client: ClientInfo,
    user_id: &str,
    action: AccountAction,
) -> Result<Json<AccountStatusResponse>, AppError> {
    let user_id = Uuid::parse_str(user_id)?;
    let accounts = AccountService { users, sessions, audit };
    let change = accounts.apply(&admin.0.id, &user_id, action, client).await?;

    Ok(Json(AccountStatusResponse {
        user: UserResponse::from(&change.user),
        previous_status: change.previous_status,
        sessions_terminated: change.sessions_terminated,
    }))
}

/// Approve a pending account
#[openapi(tag = "Admin")]
#[post("/users/<user_id>/approve")]
pub async fn approve_user(
    sessions: &State<SessionService>,
    users: &State<Arc<dyn UserRepository>>,
    audit: &State<Arc<dyn AuditLog>>,
    admin: AdminUser,
    client: ClientInfo,
    user_id: &str,
) -> Result<Json<AccountStatusResponse>, AppError> {
    change_account(sessions, users.inner().as_ref(), audit.inner().as_ref(), &admin, client, user_id, AccountAction::Approve).await
}

/// Reject a pending account
#[openapi(tag = "Admin")]
#[post("/users/<user_id>/reject")]
pub async fn reject_user(
    sessions: &State<SessionService>,
    users: &State<Arc<dyn UserRepository>>,
    audit: &State<Arc<dyn AuditLog>>,
    admin: AdminUser,
    client: ClientInfo,
    user_id: &str,
) -> Result<Json<AccountStatusResponse>, AppError> {
    change_account(sessions, users.inner().as_ref(), audit.inner().as_ref(), &admin, client, user_id, AccountAction::Reject).await
}

/// Suspend an approved account and end all of its sessions
#[openapi(tag = "Admin")]
#[post("/users/<user_id>/suspend")]
pub async fn suspend_user(
    sessions: &State<SessionService>,
    users: &State<Arc<dyn UserRepository>>,
    audit: &State<Arc<dyn AuditLog>>,
    admin: AdminUser,
    client: ClientInfo,
    user_id: &str,
) -> Result<Json<AccountStatusResponse>, AppError> {
    change_account(sessions, users.inner().as_ref(), audit.inner().as_ref(), &admin, client, user_id, AccountAction::Suspend).await
}

/// Reactivate a suspended account
#[openapi(tag = "Admin")]
#[post("/users/<user_id>/activate")]
pub async fn activate_user(
    sessions: &State<SessionService>,
    users: &State<Arc<dyn UserRepository>>,
    audit: &State<Arc<dyn AuditLog>>,
    admin: AdminUser,
    client: ClientInfo,
    user_id: &str,
) -> Result<Json<AccountStatusResponse>, AppError> {
    change_account(sessions, users.inner().as_ref(), audit.inner().as_ref(), &admin, client, user_id, AccountAction::Activate).await
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        list_sessions,
        list_user_sessions,
        terminate_session,
        terminate_user_sessions,
        approve_user,
        reject_user,
        suspend_user,
        activate_user
    ]
}
