use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::audit::AuditEvent;

#[async_trait::async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), AppError>;
}

/// Mirrors every audit event to tracing so the trail survives a failed insert.
pub(crate) fn trace_audit_event(event: &AuditEvent) {
    let uid_str = event.user_id.map(|u| u.to_string());
    if event.success {
        tracing::info!(
            category = "audit",
            event_type = event.event_type,
            success = event.success,
            user_id = uid_str.as_deref().unwrap_or("-"),
            ip = event.ip_address.as_deref().unwrap_or("-"),
            user_agent = event.user_agent.as_deref().unwrap_or("-"),
            "security audit event"
        );
    } else {
        tracing::warn!(
            category = "audit",
            event_type = event.event_type,
            success = event.success,
            user_id = uid_str.as_deref().unwrap_or("-"),
            ip = event.ip_address.as_deref().unwrap_or("-"),
            user_agent = event.user_agent.as_deref().unwrap_or("-"),
            "security audit event (failure)"
        );
    }
}

#[async_trait::async_trait]
impl AuditLog for PostgresRepository {
    async fn record(&self, event: AuditEvent) -> Result<(), AppError> {
        trace_audit_event(&event);

        sqlx::query(
            r#"
            INSERT INTO security_audit_log (user_id, event_type, success, ip_address, user_agent, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.user_id)
        .bind(event.event_type)
        .bind(event.success)
        .bind(event.ip_address)
        .bind(event.user_agent)
        .bind(event.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to write audit log", e))?;

        Ok(())
    }
}

/// Records an audit event without letting a logging failure fail the request.
pub async fn record_quietly(audit: &dyn AuditLog, event: AuditEvent) {
    let event_type = event.event_type;
    if let Err(err) = audit.record(event).await {
        tracing::warn!(event_type = event_type, error = ?err, "failed to persist audit event");
    }
}
