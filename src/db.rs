use crate::config::{DatabaseConfig, SessionConfig};
use crate::database::postgres_repository::PostgresRepository;
use crate::service::Services;
use crate::service::oauth::OAuthState;
use crate::service::session::SessionService;
use crate::util::SystemClock;
use rocket::fairing::AdHoc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

pub(crate) async fn init_pool(db_config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout))
        .idle_timeout(Duration::from_secs(30))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_config.url)
        .await
}

pub(crate) fn postgres_services(pool: PgPool, session_config: &SessionConfig, oauth: OAuthState) -> Services {
    let repo = Arc::new(PostgresRepository::new(pool));
    Services {
        sessions: SessionService::new(repo.clone(), repo.clone(), Arc::new(SystemClock), session_config),
        users: repo.clone(),
        audit: repo,
        oauth,
    }
}

/// Connects, migrates when configured, and manages the Postgres-backed services.
pub fn stage_db(db_config: DatabaseConfig, session_config: SessionConfig, oauth: OAuthState) -> AdHoc {
    AdHoc::try_on_ignite("Postgres (sqlx)", |rocket| async move {
        let pool = match init_pool(&db_config).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!("Failed to initialize database pool: {}", e);
                return Err(rocket);
            }
        };
        tracing::info!("Database pool initialized successfully");

        if db_config.run_migrations {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                tracing::error!("Failed to run database migrations: {}", e);
                return Err(rocket);
            }
            tracing::info!("Database migrations applied");
        }

        match &oauth.provider {
            Some(provider) => tracing::info!(provider = provider.name(), "OAuth provider configured"),
            None => tracing::info!("no OAuth provider configured; OAuth callbacks redirect to login"),
        }

        let services = postgres_services(pool, &session_config, oauth);
        Ok(services.manage(rocket))
    })
}
