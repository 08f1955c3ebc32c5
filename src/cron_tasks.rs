use crate::Config;
use crate::db::{init_pool, postgres_services};
use crate::service::oauth::OAuthState;

/// One sweep of the session table. Returns how many records were deleted.
pub async fn purge_sessions(config: &Config) -> Result<u64, String> {
    let pool = init_pool(&config.database)
        .await
        .map_err(|err| format!("Failed to initialize database pool: {err}"))?;

    let services = postgres_services(pool.clone(), &config.session, OAuthState::default());
    let purged = services
        .sessions
        .purge_expired(config.session.purge_retention())
        .await
        .map_err(|err| format!("Failed to purge expired sessions: {err:?}"))?;

    pool.close().await;

    Ok(purged)
}
