//! lnpd — LNP/CNAM resolver daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use lnp_core::ResolverConfig;
use lnp_drivers::{metrics, registry, SipIdentity};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use lnpd::eventloop::{self, EventLoopConfig};
use lnpd::resolver::ResolverCore;
use lnpd::signals;
use lnpd::transport::Transport;

#[tokio::main]
async fn main() -> Result<()> {
    let cli_arg = std::env::args().nth(1);
    let config_path = ResolverConfig::resolve_path(cli_arg.as_deref());
    let config = ResolverConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.daemon.log_level).unwrap_or_else(|_| EnvFilter::from_default_env()))
        .init();

    tracing::info!(path = %config_path.display(), "loaded configuration");

    let sip_identity = Arc::new(SipIdentity {
        from_name: config.sip.from_name.clone(),
        from_uri: config.sip.from_uri.clone(),
        contact_user: config.sip.contact_user.clone(),
    });

    let metrics_registry = metrics::new_registry();
    let connect_timeout = Duration::from_millis(config.db.conn_timeout_ms);
    let conn_string = config.db.conn_string();

    let startup_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(connect_timeout)
        .connect(&conn_string)
        .await
        .context("failed to connect to control database at startup")?;

    let initial_registry = registry::load(&startup_pool, &sip_identity, &metrics_registry)
        .await
        .context("failed to build the driver registry at startup")?;
    tracing::info!(drivers = initial_registry.len(), "driver registry loaded");
    drop(startup_pool);

    let driver_registry = Arc::new(registry::DriverRegistry::empty());
    driver_registry.swap(initial_registry);

    let signal_channels = signals::spawn().context("failed to install signal handlers")?;

    let (cache_handle, cache_task) = lnp_drivers::cache::spawn(
        conn_string.clone(),
        connect_timeout,
        Duration::from_secs(config.db.check_interval_secs),
        256,
        signal_channels.shutdown.resubscribe(),
    );

    let transport = Transport::bind(&config.daemon.listen)
        .await
        .context("failed to bind any listen endpoint")?;
    tracing::info!(endpoints = transport.endpoint_count(), "transport ready");

    let resolver_core = Arc::new(ResolverCore::new(driver_registry.clone(), metrics_registry.clone(), cache_handle));

    let eventloop_config = EventLoopConfig {
        db_conn_string: conn_string,
        db_connect_timeout: connect_timeout,
    };

    eventloop::run(
        transport,
        resolver_core,
        driver_registry,
        sip_identity,
        metrics_registry,
        eventloop_config,
        signal_channels.reload,
        signal_channels.shutdown,
    )
    .await;

    let _ = cache_task.await;
    tracing::info!("lnpd shut down");
    Ok(())
}
