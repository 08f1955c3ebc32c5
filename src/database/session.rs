use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::session::{ActiveSession, LiveSession, NewSession, Principal, SessionRecord};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Durable home of session records.
///
/// Every mutating call is a single-statement update so that concurrent writers to
/// the same row never restore `active = true` once it has been cleared.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &NewSession) -> Result<SessionRecord, AppError>;

    /// Refreshes `last_seen_at` on the record with this token hash if, and only if,
    /// it is live at `now` and its owner is approved; returns the refreshed record
    /// joined with its owner.
    async fn touch_live_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<LiveSession>, AppError>;

    async fn find_session_by_token(&self, token_hash: &str) -> Result<Option<SessionRecord>, AppError>;

    async fn find_session_by_id(&self, id: &Uuid) -> Result<Option<SessionRecord>, AppError>;

    /// Clears `active` and stamps `ended_at = now`; false when the record was already inactive.
    async fn deactivate_session(&self, id: &Uuid, now: DateTime<Utc>) -> Result<bool, AppError>;

    /// Clears `active` on a record observed past its expiry, stamping `ended_at = expires_at`.
    async fn deactivate_expired_session(&self, id: &Uuid, now: DateTime<Utc>) -> Result<bool, AppError>;

    /// Clears `active` on every active record of the user in one statement.
    async fn deactivate_sessions_for_user(&self, user_id: &Uuid, now: DateTime<Utc>) -> Result<u64, AppError>;

    async fn list_active_sessions(&self, now: DateTime<Utc>) -> Result<Vec<ActiveSession>, AppError>;

    async fn list_sessions_for_user(&self, user_id: &Uuid, limit: i64) -> Result<Vec<SessionRecord>, AppError>;

    async fn delete_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

const SESSION_COLUMNS: &str = "id, user_id, token_hash, client_address, client_agent, issued_at, last_seen_at, expires_at, active, ended_at";

#[derive(sqlx::FromRow)]
struct TouchedSessionRow {
    #[sqlx(flatten)]
    session: SessionRecord,
    username: String,
    is_admin: bool,
}

#[async_trait::async_trait]
impl SessionStore for PostgresRepository {
    async fn insert_session(&self, session: &NewSession) -> Result<SessionRecord, AppError> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            r#"
            INSERT INTO user_session (id, user_id, token_hash, client_address, client_agent, issued_at, last_seen_at, expires_at, active)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, TRUE)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(&session.client_address)
        .bind(&session.client_agent)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to insert session", e))?;

        Ok(record)
    }

    async fn touch_live_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<LiveSession>, AppError> {
        let row = sqlx::query_as::<_, TouchedSessionRow>(
            r#"
            UPDATE user_session s
            SET last_seen_at = GREATEST(s.last_seen_at, $2)
            FROM users u
            WHERE s.token_hash = $1
              AND s.active
              AND s.expires_at > $2
              AND u.id = s.user_id
              AND u.status = 'approved'
            RETURNING s.id, s.user_id, s.token_hash, s.client_address, s.client_agent, s.issued_at,
                      s.last_seen_at, s.expires_at, s.active, s.ended_at, u.username, u.is_admin
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to refresh session activity", e))?;

        Ok(row.map(|row| LiveSession {
            principal: Principal {
                id: row.session.user_id,
                username: row.username,
                is_admin: row.is_admin,
            },
            session: row.session,
        }))
    }

    async fn find_session_by_token(&self, token_hash: &str) -> Result<Option<SessionRecord>, AppError> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!("SELECT {SESSION_COLUMNS} FROM user_session WHERE token_hash = $1"))
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to look up session", e))?;

        Ok(record)
    }

    async fn find_session_by_id(&self, id: &Uuid) -> Result<Option<SessionRecord>, AppError> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!("SELECT {SESSION_COLUMNS} FROM user_session WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to fetch session", e))?;

        Ok(record)
    }

    async fn deactivate_session(&self, id: &Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE user_session SET active = FALSE, ended_at = $2 WHERE id = $1 AND active")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to deactivate session", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_expired_session(&self, id: &Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_session
            SET active = FALSE, ended_at = expires_at
            WHERE id = $1
              AND active
              AND expires_at <= $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to deactivate expired session", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_sessions_for_user(&self, user_id: &Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE user_session SET active = FALSE, ended_at = $2 WHERE user_id = $1 AND active")
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to terminate user sessions", e))?;

        Ok(result.rows_affected())
    }

    async fn list_active_sessions(&self, now: DateTime<Utc>) -> Result<Vec<ActiveSession>, AppError> {
        let rows = sqlx::query_as::<_, ActiveSession>(
            r#"
            SELECT s.id, s.user_id, s.token_hash, s.client_address, s.client_agent, s.issued_at,
                   s.last_seen_at, s.expires_at, s.active, s.ended_at, u.username, u.email
            FROM user_session s
            JOIN users u ON u.id = s.user_id
            WHERE s.active
              AND s.expires_at > $1
            ORDER BY s.last_seen_at DESC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to list active sessions", e))?;

        Ok(rows)
    }

    async fn list_sessions_for_user(&self, user_id: &Uuid, limit: i64) -> Result<Vec<SessionRecord>, AppError> {
        let rows = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM user_session WHERE user_id = $1 ORDER BY issued_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to list user sessions", e))?;

        Ok(rows)
    }

    async fn delete_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM user_session WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to purge expired sessions", e))?;

        Ok(result.rows_affected())
    }
}
