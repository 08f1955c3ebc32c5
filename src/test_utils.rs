use crate::assemble_rocket;
use crate::auth::SESSION_COOKIE;
use crate::config::Config;
use crate::database::audit::{AuditLog, trace_audit_event};
use crate::database::session::SessionStore;
use crate::database::user::{UserRepository, hash_password};
use crate::error::app_error::AppError;
use crate::models::audit::AuditEvent;
use crate::models::session::{ActiveSession, ClientInfo, LiveSession, NewSession, Principal, SessionRecord, SessionToken};
use crate::models::user::{NewUser, User, UserStatus};
use crate::service::Services;
use crate::service::oauth::{OAuthProfile, OAuthProvider, OAuthState};
use crate::service::session::SessionService;
use crate::util::Clock;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rocket::http::Cookie;
use rocket::local::asynchronous::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "correct horse battery staple 42!";

static TEST_PASSWORD_HASH: LazyLock<String> = LazyLock::new(|| hash_password(TEST_PASSWORD).expect("hash test password"));

pub fn sample_user(username: &str, is_admin: bool) -> User {
    User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        full_name: username.to_string(),
        password_hash: TEST_PASSWORD_HASH.clone(),
        status: UserStatus::Approved,
        is_admin,
        created_at: Utc::now(),
        last_login_at: None,
    }
}

/// Clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).single().expect("valid start instant");
        ManualClock(Mutex::new(start))
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("clock lock")
    }
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, SessionRecord>,
    by_token: HashMap<String, Uuid>,
    audit: Vec<AuditEvent>,
}

/// In-memory stand-in for Postgres. Each call holds the state lock for its whole duration.
#[derive(Default)]
pub struct MemoryStore {
    state: tokio::sync::Mutex<MemoryState>,
    failing: AtomicBool,
    latency: Mutex<Option<std::time::Duration>>,
}

impl MemoryStore {
    pub async fn add_user(&self, user: User) -> User {
        self.state.lock().await.users.insert(user.id, user.clone());
        user
    }

    pub async fn user(&self, id: &Uuid) -> Option<User> {
        self.state.lock().await.users.get(id).cloned()
    }

    pub async fn set_user_status(&self, id: &Uuid, status: UserStatus) {
        if let Some(user) = self.state.lock().await.users.get_mut(id) {
            user.status = status;
        }
    }

    pub async fn session(&self, id: &Uuid) -> Option<SessionRecord> {
        self.state.lock().await.sessions.get(id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    pub async fn audit_types(&self) -> Vec<&'static str> {
        self.state.lock().await.audit.iter().map(|event| event.event_type).collect()
    }

    /// Makes every session-store call fail as if the database were down.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<std::time::Duration>) {
        *self.latency.lock().expect("latency lock") = latency;
    }

    async fn io(&self) -> Result<(), AppError> {
        let latency = *self.latency.lock().expect("latency lock");
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::db("memory store unavailable", sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

fn deactivate(record: &mut SessionRecord, ended_at: DateTime<Utc>) -> bool {
    if !record.active {
        return false;
    }
    record.active = false;
    record.ended_at = Some(ended_at);
    true
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &NewSession) -> Result<SessionRecord, AppError> {
        self.io().await?;
        let mut state = self.state.lock().await;
        if state.by_token.contains_key(&session.token_hash) {
            return Err(AppError::db("duplicate token", sqlx::Error::Protocol("duplicate session token".to_string())));
        }

        let record = SessionRecord {
            id: session.id,
            user_id: session.user_id,
            token_hash: session.token_hash.clone(),
            client_address: session.client_address.clone(),
            client_agent: session.client_agent.clone(),
            issued_at: session.issued_at,
            last_seen_at: session.issued_at,
            expires_at: session.expires_at,
            active: true,
            ended_at: None,
        };
        state.by_token.insert(record.token_hash.clone(), record.id);
        state.sessions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn touch_live_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<LiveSession>, AppError> {
        self.io().await?;
        let mut state = self.state.lock().await;
        let Some(id) = state.by_token.get(token_hash).copied() else {
            return Ok(None);
        };

        let principal = {
            let Some(record) = state.sessions.get(&id) else {
                return Ok(None);
            };
            if !record.is_live(now) {
                return Ok(None);
            }
            match state.users.get(&record.user_id) {
                Some(user) if user.status == UserStatus::Approved => Principal {
                    id: user.id,
                    username: user.username.clone(),
                    is_admin: user.is_admin,
                },
                _ => return Ok(None),
            }
        };

        let Some(record) = state.sessions.get_mut(&id) else {
            return Ok(None);
        };
        record.last_seen_at = record.last_seen_at.max(now);

        Ok(Some(LiveSession {
            session: record.clone(),
            principal,
        }))
    }

    async fn find_session_by_token(&self, token_hash: &str) -> Result<Option<SessionRecord>, AppError> {
        self.io().await?;
        let state = self.state.lock().await;
        Ok(state.by_token.get(token_hash).and_then(|id| state.sessions.get(id)).cloned())
    }

    async fn find_session_by_id(&self, id: &Uuid) -> Result<Option<SessionRecord>, AppError> {
        self.io().await?;
        Ok(self.state.lock().await.sessions.get(id).cloned())
    }

    async fn deactivate_session(&self, id: &Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.io().await?;
        let mut state = self.state.lock().await;
        Ok(state.sessions.get_mut(id).is_some_and(|record| deactivate(record, now)))
    }

    async fn deactivate_expired_session(&self, id: &Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.io().await?;
        let mut state = self.state.lock().await;
        Ok(state.sessions.get_mut(id).is_some_and(|record| {
            let expires_at = record.expires_at;
            expires_at <= now && deactivate(record, expires_at)
        }))
    }

    async fn deactivate_sessions_for_user(&self, user_id: &Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.io().await?;
        let mut state = self.state.lock().await;
        let mut count = 0;
        for record in state.sessions.values_mut().filter(|record| &record.user_id == user_id) {
            if deactivate(record, now) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_active_sessions(&self, now: DateTime<Utc>) -> Result<Vec<ActiveSession>, AppError> {
        self.io().await?;
        let state = self.state.lock().await;
        let mut rows: Vec<ActiveSession> = state
            .sessions
            .values()
            .filter(|record| record.is_live(now))
            .filter_map(|record| {
                state.users.get(&record.user_id).map(|user| ActiveSession {
                    session: record.clone(),
                    username: user.username.clone(),
                    email: user.email.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.session.last_seen_at.cmp(&a.session.last_seen_at));
        Ok(rows)
    }

    async fn list_sessions_for_user(&self, user_id: &Uuid, limit: i64) -> Result<Vec<SessionRecord>, AppError> {
        self.io().await?;
        let state = self.state.lock().await;
        let mut rows: Vec<SessionRecord> = state.sessions.values().filter(|record| &record.user_id == user_id).cloned().collect();
        rows.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn delete_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        self.io().await?;
        let mut state = self.state.lock().await;
        let doomed: Vec<(Uuid, String)> = state
            .sessions
            .values()
            .filter(|record| record.expires_at < cutoff)
            .map(|record| (record.id, record.token_hash.clone()))
            .collect();
        for (id, token_hash) in &doomed {
            state.sessions.remove(id);
            state.by_token.remove(token_hash);
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait::async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: &NewUser) -> Result<User, AppError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.username == user.username || u.email == user.email) {
            return Err(AppError::UserAlreadyExists(user.username.clone()));
        }

        let created = User {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            password_hash: user.password_hash.clone(),
            status: user.status,
            is_admin: user.is_admin,
            created_at: Utc::now(),
            last_login_at: None,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state.lock().await.users.get(id).cloned())
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, AppError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.username == login || u.email == login).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn record_login(&self, id: &Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(user) = self.state.lock().await.users.get_mut(id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn update_user_status(&self, id: &Uuid, from: UserStatus, to: UserStatus) -> Result<Option<User>, AppError> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(id) {
            Some(user) if user.status == from => {
                user.status = to;
                Ok(Some(user.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl AuditLog for MemoryStore {
    async fn record(&self, event: AuditEvent) -> Result<(), AppError> {
        trace_audit_event(&event);
        self.state.lock().await.audit.push(event);
        Ok(())
    }
}

/// Provider that answers every code with the same profile, or fails when it has none.
pub struct StubOAuthProvider {
    pub email: Option<String>,
}

#[async_trait::async_trait]
impl OAuthProvider for StubOAuthProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn exchange_code(&self, _code: &str) -> Result<OAuthProfile, AppError> {
        match &self.email {
            Some(email) => Ok(OAuthProfile { email: email.clone() }),
            None => Err(AppError::OAuth("invalid_grant".to_string())),
        }
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.session.secure_cookie = false;
    config.session.purge_interval_seconds = 0;
    config.session.validation_timeout_ms = 200;
    config
}

/// A running Rocket over in-memory stores, seeded with admin `alice` and user `bob`.
pub struct TestApp {
    pub client: Client,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub sessions: SessionService,
    pub alice: User,
    pub bob: User,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with(test_config(), OAuthState::default()).await
    }

    pub async fn with(config: Config, oauth: OAuthState) -> Self {
        let store = Arc::new(MemoryStore::default());
        let clock = Arc::new(ManualClock::default());
        let sessions = SessionService::new(store.clone(), store.clone(), clock.clone(), &config.session);

        let alice = store.add_user(sample_user("alice", true)).await;
        let bob = store.add_user(sample_user("bob", false)).await;

        let services = Services {
            sessions: sessions.clone(),
            users: store.clone(),
            audit: store.clone(),
            oauth,
        };

        let client = Client::untracked(services.manage(assemble_rocket(&config)))
            .await
            .expect("valid rocket instance");

        TestApp {
            client,
            store,
            clock,
            sessions,
            alice,
            bob,
        }
    }

    /// Issues a session straight through the service and returns its cookie.
    pub async fn sign_in(&self, user: &User) -> (SessionRecord, Cookie<'static>) {
        let issued = self.sessions.issue(&user.id, ClientInfo::new(Some("127.0.0.1".to_string()), Some("test-agent".to_string()))).await.expect("session issued");
        (issued.record, session_cookie_for(&issued.token))
    }
}

pub fn session_cookie_for(token: &SessionToken) -> Cookie<'static> {
    Cookie::new(SESSION_COOKIE, token.as_str().to_string())
}
