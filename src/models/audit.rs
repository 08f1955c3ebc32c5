use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Event types for the security audit log
pub mod audit_events {
    // Authentication events
    pub const LOGIN_SUCCESS: &str = "login_success";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const LOGOUT: &str = "logout";
    pub const REGISTRATION: &str = "registration";

    // Session lifecycle events
    pub const SESSION_EXPIRED: &str = "session_expired";
    pub const SESSION_TERMINATED: &str = "session_terminated";
    pub const SESSIONS_TERMINATED_ALL: &str = "sessions_terminated_all";
    pub const TERMINATION_REJECTED: &str = "termination_rejected";

    // Account moderation events
    pub const USER_APPROVED: &str = "user_approved";
    pub const USER_REJECTED: &str = "user_rejected";
    pub const USER_SUSPENDED: &str = "user_suspended";
    pub const USER_ACTIVATED: &str = "user_activated";
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub user_id: Option<Uuid>,
    pub event_type: &'static str,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<JsonValue>,
}

impl AuditEvent {
    pub fn success(event_type: &'static str, user_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            event_type,
            success: true,
            ip_address: None,
            user_agent: None,
            metadata: None,
        }
    }

    pub fn failure(event_type: &'static str, user_id: Option<Uuid>) -> Self {
        Self {
            success: false,
            ..Self::success(event_type, user_id)
        }
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
