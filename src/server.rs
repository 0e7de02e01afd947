//! TCP acceptor — the external collaborator of spec §2 item 7.
//!
//! Binds the listening endpoint and spawns one detached task per accepted
//! connection. Handlers are independent; the acceptor never waits on them
//! and never coordinates between them (spec §5).

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cache::Cache;
use crate::config::Config;
use crate::error::StartupError;
use crate::filter::Filter;
use crate::handler::{self, Services};
use crate::logger::Logger;
use crate::stats::Stats;

/// Binds `config.host:config.port` and runs the accept loop forever.
///
/// The backlog passed to `listen` is `config.max_conn`; on most platforms
/// this only bounds the kernel's pending-connection queue, not the number
/// of concurrently running handlers (spec §5 notes handlers are otherwise
/// bounded only by `MAX_CONN` and OS limits).
pub async fn run(config: Config) -> Result<(), StartupError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!(%addr, "proxy listening, dashboard at http://{addr}/proxy-stats");
    accept_loop(config, listener).await
}

/// Runs the accept loop against an already-bound listener. Split out from
/// [`run`] so tests can bind an ephemeral port themselves and learn its
/// address before the server starts accepting.
pub async fn accept_loop(config: Config, listener: TcpListener) -> Result<(), StartupError> {
    let logger = Logger::new(&config.log_file).map_err(|source| StartupError::LoggerInit {
        path: config.log_file.display().to_string(),
        source,
    })?;

    let services = Services {
        stats: Arc::new(Stats::new(config.rate_limit_count, config.rate_limit_period)),
        filter: Arc::new(Filter::new(
            config.blacklist.clone(),
            config.rate_limit_count,
            config.rate_limit_period,
        )),
        cache: Arc::new(Cache::new(config.max_cache_entries)),
        logger: Arc::new(logger),
        config: Arc::new(config),
    };

    loop {
        let (stream, client_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(%e, "accept failed");
                continue;
            }
        };

        let services = services.clone();
        tokio::spawn(async move {
            handler::run(services, stream, client_addr).await;
        });
    }
}
