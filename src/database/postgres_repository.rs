use sqlx::PgPool;

/// Postgres-backed implementation of every store trait in `crate::database`.
#[derive(Clone)]
pub struct PostgresRepository {
    pub pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
