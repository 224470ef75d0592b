use std::time::Duration;

use futures::future::BoxFuture;
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, error, info, warn};

use crate::errors::ServiceError;
use crate::migrator::Migrator;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Deadlock retry schedule mandated for workflow transactions.
const RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_millis(10),
    Duration::from_millis(40),
    Duration::from_millis(160),
];

/// Upper bound on lock waits inside one operation.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the database connection pool.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: ACQUIRE_TIMEOUT,
        }
    }
}

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Establishes a connection pool with custom settings.
///
/// In-memory SQLite is pinned to a single connection: every pooled connection
/// would otherwise see its own empty database.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!(url = %config.url, "configuring database connection");

    let single_connection = config.url.starts_with("sqlite::memory:");
    let max_connections = if single_connection {
        1
    } else {
        config.max_connections
    };

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(max_connections)
        .min_connections(config.min_connections.min(max_connections))
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "failed to connect to database");
        ServiceError::DatabaseError(e)
    })?;

    info!(max_connections, "database connection established");
    Ok(pool)
}

/// Applies the embedded schema migrations.
pub async fn run_migrations(db: &DbPool) -> Result<(), ServiceError> {
    Migrator::up(db, None).await.map_err(|e| {
        error!(error = %e, "migration failed");
        ServiceError::DatabaseError(e)
    })
}

/// Runs `f` inside a single ACID transaction.
///
/// On a retryable failure (deadlock, serialization conflict, SQLite busy) the
/// transaction is rolled back and retried with 10ms/40ms/160ms backoff; after
/// the third retry the error surfaces as `ServiceError::Retryable`. Any other
/// error rolls back and propagates unchanged, leaving no partial effect.
pub async fn transact_with_retry<T, F>(db: &DatabaseConnection, f: F) -> Result<T, ServiceError>
where
    F: for<'c> Fn(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, ServiceError>>,
{
    let mut attempt = 0usize;
    loop {
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;
        let outcome = f(&txn).await;

        match outcome {
            Ok(value) => match txn.commit().await {
                Ok(()) => return Ok(value),
                Err(e) if is_retryable_db_err(&e) => {
                    if attempt >= RETRY_BACKOFF.len() {
                        return Err(ServiceError::Retryable(e.to_string()));
                    }
                    warn!(attempt, error = %e, "commit conflict, retrying transaction");
                    tokio::time::sleep(RETRY_BACKOFF[attempt]).await;
                    attempt += 1;
                }
                Err(e) => return Err(ServiceError::DatabaseError(e)),
            },
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "rollback failed");
                }
                let retryable = match &err {
                    ServiceError::DatabaseError(db_err) => is_retryable_db_err(db_err),
                    ServiceError::Retryable(_) => true,
                    _ => false,
                };
                if retryable {
                    if attempt >= RETRY_BACKOFF.len() {
                        return Err(ServiceError::Retryable(err.to_string()));
                    }
                    warn!(attempt, error = %err, "retryable transaction failure");
                    tokio::time::sleep(RETRY_BACKOFF[attempt]).await;
                    attempt += 1;
                } else {
                    return Err(err);
                }
            }
        }
    }
}

/// Recognizes engine-level conflicts worth retrying.
fn is_retryable_db_err(err: &DbErr) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("deadlock")
        || msg.contains("could not serialize")
        || msg.contains("serialization failure")
        || msg.contains("database is locked")
        || msg.contains("lock wait timeout")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_messages_are_retryable() {
        assert!(is_retryable_db_err(&DbErr::Custom(
            "Deadlock found when trying to get lock".into()
        )));
        assert!(is_retryable_db_err(&DbErr::Custom(
            "ERROR: could not serialize access due to concurrent update".into()
        )));
        assert!(is_retryable_db_err(&DbErr::Custom("database is locked".into())));
        assert!(!is_retryable_db_err(&DbErr::Custom("syntax error".into())));
    }

    #[tokio::test]
    async fn in_memory_sqlite_uses_one_connection() {
        let pool = establish_connection("sqlite::memory:").await.unwrap();
        // A second statement on the same pool must observe the first one's schema.
        use sea_orm::ConnectionTrait;
        pool.execute_unprepared("CREATE TABLE probe (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();
        pool.execute_unprepared("INSERT INTO probe (id) VALUES (1)")
            .await
            .unwrap();
    }
}
