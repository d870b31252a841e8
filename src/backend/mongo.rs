//! Document store (MongoDB) connector.
//!
//! # Responsibilities
//! - Build client options from the `mongo` config section
//! - Authenticate against the configured database when a user is set
//! - Verify the connection with a `ping` before handing out the handle

use std::time::Duration;

use mongodb::bson::doc;
use mongodb::options::{ClientOptions, Credential};
use mongodb::{Client, Database};

use crate::config::MongoConfig;

/// Upper bound on pooled connections per server.
pub const POOL_LIMIT: u32 = 300;

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection string for `config`, without credentials.
pub fn connection_uri(config: &MongoConfig) -> String {
    let host = if config.host.is_empty() {
        "127.0.0.1"
    } else {
        &config.host
    };
    let port = if config.port.is_empty() {
        "27017"
    } else {
        &config.port
    };
    format!("mongodb://{}:{}", host, port)
}

/// Client options for `config`.
pub async fn client_options(config: &MongoConfig) -> Result<ClientOptions, mongodb::error::Error> {
    let mut options = ClientOptions::parse(connection_uri(config)).await?;
    options.max_pool_size = Some(POOL_LIMIT);
    options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
    options.connect_timeout = Some(SERVER_SELECTION_TIMEOUT);

    if !config.user.is_empty() {
        options.credential = Some(
            Credential::builder()
                .username(config.user.clone())
                .password(config.password.clone())
                .source(config.db_name.clone())
                .build(),
        );
    }
    Ok(options)
}

/// Connect and return a handle to the configured database.
pub async fn connect(config: &MongoConfig) -> Result<Database, mongodb::error::Error> {
    let client = Client::with_options(client_options(config).await?)?;
    let database = client.database(&config.db_name);
    database.run_command(doc! { "ping": 1 }).await?;
    tracing::debug!(host = %config.host, db = %config.db_name, "MongoDB connection verified");
    Ok(database)
}
