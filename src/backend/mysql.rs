//! Relational store (MySQL) connector.
//!
//! # Responsibilities
//! - Provision the configured database on a fresh server
//! - Open the pooled connection used by the service
//!
//! # Design Decisions
//! - Credentials are passed as typed connect options, never spliced into a
//!   URL, so passwords containing `/`, `#`, `?` or `%` reach the server
//!   unchanged

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::{Connection, Executor};

use crate::config::MysqlConfig;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// `CREATE DATABASE IF NOT EXISTS` statement for `db_name`.
pub fn create_database_statement(db_name: &str) -> String {
    format!(
        "CREATE DATABASE IF NOT EXISTS `{}` DEFAULT CHARACTER SET utf8mb4;",
        db_name
    )
}

/// Options for the server itself, without selecting a database.
pub fn server_connect_options(config: &MysqlConfig) -> Result<MySqlConnectOptions, sqlx::Error> {
    let port = config
        .port_or_default()
        .parse::<u16>()
        .map_err(|e| sqlx::Error::Configuration(format!("invalid mysql port: {}", e).into()))?;

    Ok(MySqlConnectOptions::new()
        .host(config.host_or_default())
        .port(port)
        .username(&config.username)
        .password(&config.password))
}

/// Options for the configured database, including the extra `config` query.
///
/// `charset` and `collation` are honored; other keys are ignored.
pub fn connect_options(config: &MysqlConfig) -> Result<MySqlConnectOptions, sqlx::Error> {
    let mut options = server_connect_options(config)?;
    if !config.db_name.is_empty() {
        options = options.database(&config.db_name);
    }

    for (key, value) in url::form_urlencoded::parse(config.config.as_bytes()) {
        match &*key {
            "charset" => options = options.charset(&value),
            "collation" => options = options.collation(&value),
            other => tracing::debug!(option = other, "Ignoring mysql connection option"),
        }
    }
    Ok(options)
}

/// Idempotently run `create_statement` against the server at `server`.
///
/// Uses a single short-lived connection that is closed before returning.
pub async fn ensure_database(
    server: &MySqlConnectOptions,
    create_statement: &str,
) -> Result<(), sqlx::Error> {
    let mut conn = MySqlConnection::connect_with(server).await?;
    conn.ping().await?;
    let result = conn.execute(create_statement).await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "Failed to close provisioning connection");
    }
    result.map(|_| ())
}

/// Open the pooled connection for the configured database.
pub async fn connect(config: &MysqlConfig) -> Result<MySqlPool, sqlx::Error> {
    let options = connect_options(config)?;
    MySqlPoolOptions::new()
        .max_connections(config.max_open_conns.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
}
