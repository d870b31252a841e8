//! Server initialization options.
//!
//! # Responsibilities
//! - Connect the backing stores the caller asked for
//! - Run caller-supplied setup against the application context
//!
//! # Design Decisions
//! - Options run in the order given, before any listener starts
//! - A backend that fails to connect is logged, not fatal: the server
//!   still starts and `get` keeps reporting `NotInitialized`

use std::error::Error as StdError;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::backend::{mongo, mysql, redis, BackendError, BackendSlot};
use crate::context::AppContext;

type InitFn = Box<dyn for<'a> FnOnce(&'a AppContext) -> BoxFuture<'a, ()> + Send>;

/// One initialization step run by `Server::new`.
pub struct InitOption {
    name: &'static str,
    run: InitFn,
}

impl InitOption {
    pub fn new<F>(name: &'static str, run: F) -> Self
    where
        F: for<'a> FnOnce(&'a AppContext) -> BoxFuture<'a, ()> + Send + 'static,
    {
        Self {
            name,
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn run(self, context: &AppContext) {
        tracing::debug!(option = self.name, "Running init option");
        (self.run)(context).await
    }
}

impl std::fmt::Debug for InitOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitOption").field("name", &self.name).finish()
    }
}

/// Provision the relational database, then open its pool.
///
/// A failed provision is logged and the pool is opened anyway: the
/// database may already exist for a user without the CREATE privilege.
pub fn with_mysql() -> InitOption {
    InitOption::new("mysql", |context| {
        Box::pin(async move {
            let config = context.snapshot().mysql.clone();
            let statement = mysql::create_database_statement(&config.db_name);
            let provision = async {
                let server = mysql::server_connect_options(&config)?;
                mysql::ensure_database(&server, &statement).await
            };

            match provision_then_init(
                &context.backends().mysql,
                &config.db_name,
                provision,
                || mysql::connect(&config),
            )
            .await
            {
                Ok(_) => tracing::info!(db = %config.db_name, "MySQL connected"),
                Err(e) => tracing::error!(error = %e, "MySQL connection failed"),
            }
        })
    })
}

async fn provision_then_init<H, P, PE, F, Fut, E>(
    slot: &BackendSlot<H>,
    db_name: &str,
    provision: P,
    open: F,
) -> Result<Arc<H>, BackendError>
where
    P: Future<Output = Result<(), PE>>,
    PE: Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<H, E>>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    if let Err(e) = provision.await {
        tracing::error!(error = %e, db = %db_name, "Failed to create database");
    }
    slot.init(open).await
}

/// Open the cache connection.
pub fn with_redis() -> InitOption {
    InitOption::new("redis", |context| {
        Box::pin(async move {
            let config = context.snapshot().redis.clone();
            match context
                .backends()
                .redis
                .init(|| redis::connect(&config))
                .await
            {
                Ok(_) => tracing::info!(addr = %config.addr, db = config.db, "Redis connected"),
                Err(e) => tracing::error!(error = %e, "Redis connection failed"),
            }
        })
    })
}

/// Open the document store connection.
pub fn with_mongo() -> InitOption {
    InitOption::new("mongo", |context| {
        Box::pin(async move {
            let config = context.snapshot().mongo.clone();
            match context
                .backends()
                .mongo
                .init(|| mongo::connect(&config))
                .await
            {
                Ok(_) => tracing::info!(host = %config.host, db = %config.db_name, "MongoDB connected"),
                Err(e) => tracing::error!(error = %e, "MongoDB connection failed"),
            }
        })
    })
}

/// Options for every store that has an address configured.
pub fn configured_backends(context: &AppContext) -> Vec<InitOption> {
    let config = context.snapshot();
    let mut options = Vec::new();
    if !config.mysql.path.is_empty() {
        options.push(with_mysql());
    }
    if !config.redis.addr.is_empty() {
        options.push(with_redis());
    }
    if !config.mongo.host.is_empty() {
        options.push(with_mongo());
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::config::AppConfig;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn only_configured_backends_are_selected() {
        let mut config = AppConfig::default();
        config.redis.addr = "127.0.0.1:6379".into();
        let context = AppContext::from_config(config);

        let names: Vec<_> = configured_backends(&context)
            .iter()
            .map(InitOption::name)
            .collect();
        assert_eq!(names, vec!["redis"]);
    }

    #[tokio::test]
    async fn custom_option_sees_context() {
        let context = AppContext::from_config(AppConfig::default());
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let option = InitOption::new("custom", move |context| {
            Box::pin(async move {
                assert_eq!(context.snapshot().system.addr, 8080);
                flag.store(true, Ordering::SeqCst);
            })
        });
        option.run(&context).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unreachable_cache_is_not_fatal() {
        let mut config = AppConfig::default();
        config.redis.addr = "127.0.0.1:1".into();
        let context = AppContext::from_config(config);

        with_redis().run(&context).await;
        assert!(!context.backends().redis.is_initialized());
    }

    #[tokio::test]
    async fn failed_provision_still_opens_pool() {
        let slot = BackendSlot::new(BackendKind::Relational);
        let provision = async {
            Err::<(), _>("Access denied for user 'svc'@'%' to database 'orders'")
        };

        let opened = provision_then_init(&slot, "orders", provision, || async {
            Ok::<_, std::io::Error>(7u32)
        })
        .await
        .unwrap();

        assert_eq!(*opened, 7);
        assert_eq!(*slot.get().unwrap(), 7);
    }

    #[tokio::test]
    async fn open_failure_after_provision_is_reported() {
        let slot: BackendSlot<u32> = BackendSlot::new(BackendKind::Relational);
        let provision = async { Ok::<(), String>(()) };
        let err = provision_then_init(&slot, "orders", provision, || async {
            Err::<u32, _>("connection refused")
        })
        .await
        .unwrap_err();

        assert!(matches!(err, BackendError::Init { kind: BackendKind::Relational, .. }));
        assert!(!slot.is_initialized());
    }
}
