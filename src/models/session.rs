use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use rocket::serde::Serialize;
use schemars::JsonSchema;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Bytes of entropy in a session token.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Client agents longer than this are truncated before they are stored.
pub const MAX_CLIENT_AGENT_CHARS: usize = 255;

/// One successful login. `token_hash` is the SHA-256 of the token held by the client.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.expires_at
    }

    /// Whether an inactive record ended by running out its lifetime rather than by
    /// logout or termination.
    ///
    /// Validation keeps answering `Expired` for such records on every later request,
    /// so the rejection payload never reports natural expiry as a termination.
    pub fn ended_by_expiry(&self) -> bool {
        match self.ended_at {
            Some(ended_at) => ended_at >= self.expires_at,
            None => false,
        }
    }

    pub fn duration(&self) -> Duration {
        let end = self.ended_at.unwrap_or(self.last_seen_at);
        end - self.issued_at
    }
}

/// Row inserted by the issuer.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The identity fields enforcement needs, joined onto a validated session.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct LiveSession {
    pub session: SessionRecord,
    pub principal: Principal,
}

/// Listing row: an active session with its owner's display fields.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActiveSession {
    #[sqlx(flatten)]
    pub session: SessionRecord,
    pub username: String,
    pub email: String,
}

/// Client metadata captured at issue time.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub address: Option<String>,
    pub agent: Option<String>,
}

impl ClientInfo {
    pub fn new(address: Option<String>, agent: Option<String>) -> Self {
        Self {
            address,
            agent: agent.map(|agent| crate::util::truncate_chars(&agent, MAX_CLIENT_AGENT_CHARS)),
        }
    }
}

/// Plaintext session token. Only ever handed to the credential carrier.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        SessionToken(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hash(&self) -> String {
        hash_token(&self.0)
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct ActiveSessionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub is_current: bool,
}

impl ActiveSessionResponse {
    pub fn new(row: &ActiveSession, current_session_id: &Uuid) -> Self {
        let session = &row.session;
        Self {
            id: session.id,
            user_id: session.user_id,
            username: row.username.clone(),
            email: row.email.clone(),
            client_address: session.client_address.clone(),
            client_agent: session.client_agent.clone(),
            issued_at: session.issued_at,
            last_seen_at: session.last_seen_at,
            expires_at: session.expires_at,
            duration_seconds: session.duration().num_seconds(),
            is_current: &session.id == current_session_id,
        }
    }
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct SessionHistoryResponse {
    pub id: Uuid,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub live: bool,
    pub duration_seconds: i64,
}

impl SessionHistoryResponse {
    pub fn new(session: &SessionRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: session.id,
            client_address: session.client_address.clone(),
            client_agent: session.client_agent.clone(),
            issued_at: session.issued_at,
            last_seen_at: session.last_seen_at,
            expires_at: session.expires_at,
            ended_at: session.ended_at,
            live: session.is_live(now),
            duration_seconds: session.duration().num_seconds(),
        }
    }
}

/// Liveness poll answer for a valid session.
#[derive(Serialize, Debug, JsonSchema)]
pub struct SessionStatusResponse {
    pub valid: bool,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub poll_interval_seconds: u64,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct TerminateSessionResponse {
    pub session_id: Uuid,
    pub terminated: bool,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct TerminateAllResponse {
    pub user_id: Uuid,
    pub terminated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(issued_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: SessionToken::generate().hash(),
            client_address: Some("::1".to_string()),
            client_agent: None,
            issued_at,
            last_seen_at: issued_at,
            expires_at: issued_at + Duration::hours(24),
            active: true,
            ended_at: None,
        }
    }

    #[test]
    fn token_is_url_safe_and_carries_32_bytes() {
        let token = SessionToken::generate();
        assert_eq!(token.as_str().len(), 43);
        assert!(token.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        let decoded = URL_SAFE_NO_PAD.decode(token.as_str()).expect("valid base64url");
        assert_eq!(decoded.len(), SESSION_TOKEN_BYTES);
    }

    #[test]
    fn tokens_do_not_repeat() {
        let tokens: HashSet<String> = (0..1000).map(|_| SessionToken::generate().as_str().to_string()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn token_hash_is_stable_hex() {
        let token = SessionToken::generate();
        assert_eq!(token.hash(), hash_token(token.as_str()));
        assert_eq!(token.hash().len(), 64);
    }

    #[test]
    fn debug_output_hides_token() {
        let token = SessionToken::generate();
        assert!(!format!("{:?}", token).contains(token.as_str()));
    }

    #[test]
    fn liveness_requires_active_and_unexpired() {
        let issued = Utc::now();
        let mut session = record(issued);
        assert!(session.is_live(issued + Duration::hours(23)));
        assert!(!session.is_live(session.expires_at));

        session.active = false;
        assert!(!session.is_live(issued + Duration::minutes(1)));
    }

    #[test]
    fn ended_by_expiry_compares_against_expiry() {
        let issued = Utc::now();
        let mut session = record(issued);
        session.active = false;
        session.ended_at = Some(issued + Duration::hours(1));
        assert!(!session.ended_by_expiry());

        session.ended_at = Some(session.expires_at);
        assert!(session.ended_by_expiry());
    }

    #[test]
    fn duration_uses_end_when_present() {
        let issued = Utc::now();
        let mut session = record(issued);
        session.last_seen_at = issued + Duration::minutes(30);
        assert_eq!(session.duration(), Duration::minutes(30));

        session.ended_at = Some(issued + Duration::hours(2));
        assert_eq!(session.duration(), Duration::hours(2));
    }

    #[test]
    fn client_agent_is_truncated() {
        let info = ClientInfo::new(Some("10.0.0.1".to_string()), Some("x".repeat(400)));
        assert_eq!(info.agent.map(|a| a.chars().count()), Some(MAX_CLIENT_AGENT_CHARS));
    }
}
