use crate::database::audit::{AuditLog, record_quietly};
use crate::database::user::UserRepository;
use crate::error::app_error::AppError;
use crate::models::audit::{AuditEvent, audit_events};
use crate::models::session::ClientInfo;
use crate::models::user::{User, UserStatus};
use crate::service::session::SessionService;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Status changes an administrator can make to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountAction {
    Approve,
    Reject,
    Suspend,
    Activate,
}

impl AccountAction {
    /// The only status the action applies to.
    pub fn from_status(self) -> UserStatus {
        match self {
            AccountAction::Approve | AccountAction::Reject => UserStatus::Pending,
            AccountAction::Suspend => UserStatus::Approved,
            AccountAction::Activate => UserStatus::Suspended,
        }
    }

    pub fn to_status(self) -> UserStatus {
        match self {
            AccountAction::Approve | AccountAction::Activate => UserStatus::Approved,
            AccountAction::Reject => UserStatus::Rejected,
            AccountAction::Suspend => UserStatus::Suspended,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            AccountAction::Approve => "approve",
            AccountAction::Reject => "reject",
            AccountAction::Suspend => "suspend",
            AccountAction::Activate => "activate",
        }
    }

    fn audit_event(self) -> &'static str {
        match self {
            AccountAction::Approve => audit_events::USER_APPROVED,
            AccountAction::Reject => audit_events::USER_REJECTED,
            AccountAction::Suspend => audit_events::USER_SUSPENDED,
            AccountAction::Activate => audit_events::USER_ACTIVATED,
        }
    }
}

#[derive(Debug)]
pub struct AccountChange {
    pub user: User,
    pub previous_status: UserStatus,
    pub sessions_terminated: u64,
}

/// Account moderation on behalf of an administrator.
pub struct AccountService<'a> {
    pub users: &'a dyn UserRepository,
    pub sessions: &'a SessionService,
    pub audit: &'a dyn AuditLog,
}

impl<'a> AccountService<'a> {
    /// Applies `action` to `target_id`.
    ///
    /// Suspension refuses the actor's own account and ends every live session of the
    /// target once the status has flipped.
    pub async fn apply(&self, actor_id: &Uuid, target_id: &Uuid, action: AccountAction, client: ClientInfo) -> Result<AccountChange, AppError> {
        let user = self.users.get_user_by_id(target_id).await?.ok_or(AppError::UserNotFound)?;

        if action == AccountAction::Suspend && actor_id == target_id {
            record_quietly(
                self.audit,
                AuditEvent::failure(action.audit_event(), Some(*actor_id))
                    .client(client.address, client.agent)
                    .metadata(json!({ "reason": "self_target", "target": target_id })),
            )
            .await;
            return Err(AppError::SelfTargetRejected);
        }

        let from = action.from_status();
        let invalid = || AppError::InvalidStatusTransition(format!("Cannot {} user {}: account is not {}", action.verb(), user.username, from.as_str()));
        if user.status != from {
            return Err(invalid());
        }

        let updated = self.users.update_user_status(target_id, from, action.to_status()).await?.ok_or_else(invalid)?;

        let sessions_terminated = if action == AccountAction::Suspend {
            self.sessions.terminate_all(actor_id, target_id).await?
        } else {
            0
        };

        record_quietly(
            self.audit,
            AuditEvent::success(action.audit_event(), Some(updated.id))
                .client(client.address, client.agent)
                .metadata(json!({
                    "changed_by": actor_id,
                    "from": from,
                    "to": updated.status,
                    "sessions_terminated": sessions_terminated,
                })),
        )
        .await;
        info!(actor_id = %actor_id, user_id = %updated.id, action = action.verb(), sessions_terminated, "account status changed");

        Ok(AccountChange {
            user: updated,
            previous_status: from,
            sessions_terminated,
        })
    }
}
