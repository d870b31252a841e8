//! Key-value cache (Redis) connector.
//!
//! A single multiplexed connection is shared by every caller; it is
//! verified with `PING` before being handed out.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{AsyncConnectionConfig, RedisError};
use url::Url;

use crate::config::RedisConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for cache connections.
#[derive(Debug, thiserror::Error)]
pub enum RedisConnectError {
    #[error("invalid redis address `{addr}`: {source}")]
    Address { addr: String, source: url::ParseError },

    #[error(transparent)]
    Redis(#[from] RedisError),

    #[error("unexpected PING reply `{0}`")]
    Ping(String),
}

/// Connection URL for `config`, with the password percent-encoded.
pub fn connection_url(config: &RedisConfig) -> Result<Url, RedisConnectError> {
    let raw = format!("redis://{}/{}", config.addr, config.db);
    let mut url = Url::parse(&raw).map_err(|source| RedisConnectError::Address {
        addr: config.addr.clone(),
        source,
    })?;
    if !config.password.is_empty() && url.set_password(Some(&config.password)).is_err() {
        return Err(RedisConnectError::Address {
            addr: config.addr.clone(),
            source: url::ParseError::EmptyHost,
        });
    }
    Ok(url)
}

/// Open the multiplexed connection and check it with `PING`.
pub async fn connect(config: &RedisConfig) -> Result<MultiplexedConnection, RedisConnectError> {
    let client = redis::Client::open(connection_url(config)?.as_str())?;
    let settings = AsyncConnectionConfig::new()
        .set_connection_timeout(CONNECT_TIMEOUT)
        .set_response_timeout(RESPONSE_TIMEOUT);

    let mut conn = client
        .get_multiplexed_async_connection_with_config(&settings)
        .await?;

    let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
    if reply != "PONG" {
        return Err(RedisConnectError::Ping(reply));
    }
    tracing::debug!(addr = %config.addr, db = config.db, "Redis connection verified");
    Ok(conn)
}
