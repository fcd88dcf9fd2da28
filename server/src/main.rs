use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boxoffice_server::config::Config;
use boxoffice_server::gateway::PaystackGateway;
use boxoffice_server::orders::OrderService;
use boxoffice_server::routes::create_routes;
use boxoffice_server::state::AppState;
use boxoffice_server::store::{OrderStore, PgOrderStore};
use boxoffice_server::sweeper::Sweeper;
use boxoffice_server::tickets::TicketSigner;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,boxoffice_server=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    config.validate()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Successfully connected to database");

    sqlx::migrate!().run(&pool).await?;
    info!("Migrations run successfully");

    let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(pool));
    let gateway = PaystackGateway::new(
        config.gateway.base_url.clone(),
        config.gateway.secret_key.clone(),
        config.gateway.callback_url.clone(),
        config.gateway.timeout,
    )?;
    let service = OrderService::new(
        Arc::clone(&store),
        Arc::new(gateway),
        config.fees,
        TicketSigner::new(&config.ticket_signing_secret),
        &config.gateway.secret_key,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(Sweeper::new(store, config.sweeper).run(shutdown_rx));

    let app = create_routes(AppState::new(service), &config);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(address = %config.bind_addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        error!(error = %e, "Sweeper task panicked");
    }

    info!("Server stopped");
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
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
