use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::{error, info, warn};

use table_order_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);
    let cfg = Arc::new(cfg);

    // Init events and the live fan-out hub
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    let hub = api::notifications::NotificationHub::new(cfg.fanout_capacity);
    tokio::spawn(api::events::process_events(event_rx, hub.clone()));

    let gateway = api::gateway::MidtransClient::new(api::gateway::MidtransConfig::from_app_config(&cfg))?;
    info!(environment = %cfg.midtrans_environment, "Payment gateway configured");

    // Compose shared app state
    let app_state = api::AppState::new(
        db_arc.clone(),
        cfg.clone(),
        Arc::new(gateway),
        Some(event_sender),
        hub,
    )?;

    // Periodically end sessions nobody closed
    let sessions = app_state.sessions.clone();
    let sweep_every = Duration::from_secs(cfg.session_sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            match sessions.sweep_expired(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(ended) => info!(ended, "Swept expired sessions"),
                Err(e) => warn!(error = %e, "Session sweep failed"),
            }
        }
    });

    let limiter = app_state.rate_limiter.clone();
    let forget_every = limiter.config().window.max(Duration::from_secs(60));
    tokio::spawn(api::rate_limiter::start_cleanup_task(limiter, forget_every));

    let app = api::build_router(app_state)?;

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("table-order-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
