use crate::config::SessionConfig;
use crate::database::audit::{AuditLog, record_quietly};
use crate::database::session::SessionStore;
use crate::error::app_error::AppError;
use crate::models::audit::{AuditEvent, audit_events};
use crate::models::session::{ActiveSession, ClientInfo, LiveSession, NewSession, SessionRecord, SessionToken, hash_token};
use crate::util::Clock;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of checking a presented credential.
#[derive(Debug, Clone)]
pub enum SessionVerdict {
    Valid(LiveSession),
    /// No credential was presented; not an error in itself.
    Missing,
    Expired,
    Terminated,
}

impl SessionVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionVerdict::Valid(_))
    }
}

/// A freshly issued session. The plaintext token lives only here and in the cookie.
#[derive(Debug)]
pub struct IssuedSession {
    pub record: SessionRecord,
    pub token: SessionToken,
}

#[derive(Debug)]
pub struct TerminatedSession {
    pub session: SessionRecord,
    /// False when the record was already inactive.
    pub changed: bool,
}

/// Issues, validates and ends session records.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
    validation_timeout: std::time::Duration,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, audit: Arc<dyn AuditLog>, clock: Arc<dyn Clock>, config: &SessionConfig) -> Self {
        Self {
            store,
            audit,
            clock,
            lifetime: config.lifetime(),
            validation_timeout: config.validation_timeout(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Creates exactly one new record for `user_id`. Every authentication path goes through here.
    pub async fn issue(&self, user_id: &Uuid, client: ClientInfo) -> Result<IssuedSession, AppError> {
        let token = SessionToken::generate();
        let issued_at = self.now();
        let new_session = NewSession {
            id: Uuid::new_v4(),
            user_id: *user_id,
            token_hash: token.hash(),
            client_address: client.address,
            client_agent: client.agent,
            issued_at,
            expires_at: issued_at + self.lifetime,
        };

        let record = self.store.insert_session(&new_session).await?;
        info!(user_id = %user_id, session_id = %record.id, expires_at = %record.expires_at, "session issued");

        Ok(IssuedSession { record, token })
    }

    /// Runs the request-time check. Store failures and timeouts fail closed as `Terminated`.
    pub async fn validate(&self, presented: Option<&str>) -> SessionVerdict {
        let token = match presented {
            Some(token) if !token.is_empty() => token,
            _ => return SessionVerdict::Missing,
        };

        let token_hash = hash_token(token);
        let now = self.now();

        match tokio::time::timeout(self.validation_timeout, self.check(&token_hash, now)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => {
                error!(error = ?err, "session validation failed; treating session as terminated");
                SessionVerdict::Terminated
            }
            Err(_) => {
                error!(
                    timeout_ms = self.validation_timeout.as_millis() as u64,
                    "session validation timed out; treating session as terminated"
                );
                SessionVerdict::Terminated
            }
        }
    }

    async fn check(&self, token_hash: &str, now: DateTime<Utc>) -> Result<SessionVerdict, AppError> {
        if let Some(live) = self.store.touch_live_session(token_hash, now).await? {
            return Ok(SessionVerdict::Valid(live));
        }

        let Some(record) = self.store.find_session_by_token(token_hash).await? else {
            debug!("presented session token matches no record");
            return Ok(SessionVerdict::Terminated);
        };

        if record.active && now >= record.expires_at {
            if self.store.deactivate_expired_session(&record.id, now).await? {
                record_quietly(
                    self.audit.as_ref(),
                    AuditEvent::success(audit_events::SESSION_EXPIRED, Some(record.user_id))
                        .client(record.client_address.clone(), record.client_agent.clone())
                        .metadata(serde_json::json!({
                            "session_id": record.id,
                            "expires_at": record.expires_at,
                        })),
                )
                .await;
            }
            return Ok(SessionVerdict::Expired);
        }

        if !record.active && record.ended_by_expiry() {
            return Ok(SessionVerdict::Expired);
        }

        if record.active {
            debug!(session_id = %record.id, user_id = %record.user_id, "live session belongs to an account that may not sign in");
        }

        Ok(SessionVerdict::Terminated)
    }

    /// Ends the caller's own session on logout. Unknown tokens are ignored.
    pub async fn end_session(&self, presented: &str) -> Result<Option<SessionRecord>, AppError> {
        let Some(record) = self.store.find_session_by_token(&hash_token(presented)).await? else {
            return Ok(None);
        };
        self.store.deactivate_session(&record.id, self.now()).await?;
        Ok(Some(record))
    }

    /// Deactivates one record on behalf of an administrator.
    ///
    /// Rejects records owned by `actor_id` before touching anything. Terminating an
    /// already inactive record is a successful no-op.
    pub async fn terminate_one(&self, actor_id: &Uuid, session_id: &Uuid) -> Result<TerminatedSession, AppError> {
        let session = self.store.find_session_by_id(session_id).await?.ok_or(AppError::SessionNotFound(*session_id))?;

        if &session.user_id == actor_id {
            return Err(AppError::SelfTargetRejected);
        }

        let changed = self.store.deactivate_session(session_id, self.now()).await?;
        info!(actor_id = %actor_id, session_id = %session_id, owner_id = %session.user_id, changed, "session terminated");

        Ok(TerminatedSession { session, changed })
    }

    /// Deactivates every active record of `user_id` in one batch and returns how many changed.
    pub async fn terminate_all(&self, actor_id: &Uuid, user_id: &Uuid) -> Result<u64, AppError> {
        if actor_id == user_id {
            return Err(AppError::SelfTargetRejected);
        }

        let count = self.store.deactivate_sessions_for_user(user_id, self.now()).await?;
        info!(actor_id = %actor_id, user_id = %user_id, count, "user sessions terminated");

        Ok(count)
    }

    pub async fn list_active(&self) -> Result<Vec<ActiveSession>, AppError> {
        self.store.list_active_sessions(self.now()).await
    }

    pub async fn history_for_user(&self, user_id: &Uuid, limit: i64) -> Result<Vec<SessionRecord>, AppError> {
        self.store.list_sessions_for_user(user_id, limit).await
    }

    /// Deletes records whose expiry lies more than `retention` in the past.
    pub async fn purge_expired(&self, retention: Duration) -> Result<u64, AppError> {
        let cutoff = self.now() - retention;
        let purged = self.store.delete_sessions_expired_before(cutoff).await?;
        info!(purged, cutoff = %cutoff, "expired sessions purged");
        Ok(purged)
    }

    /// Runs `purge_expired` every `every` until the runtime shuts down.
    pub fn spawn_purge_task(self, every: std::time::Duration, retention: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = self.purge_expired(retention).await {
                    warn!(error = ?err, "periodic session purge failed");
                }
            }
        });
    }
}
