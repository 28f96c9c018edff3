use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use http::HeaderValue;
use tokio::signal;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use comptoir_api as api;

use api::services::email_queue::run_email_worker;
use api::services::mailer::HttpEmailTransport;
use api::services::payments::HttpPaymentGateway;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // External collaborators are constructed here, once, and injected.
    let gateway = Arc::new(HttpPaymentGateway::new(
        cfg.payment_api_base.clone(),
        cfg.payment_secret_key.clone(),
    ));
    let transport = Arc::new(HttpEmailTransport::new(
        cfg.email_api_base.clone(),
        cfg.email_api_key.clone(),
    ));

    let services =
        api::AppServices::build(db.clone(), &cfg, event_sender.clone(), gateway, transport);

    // The email queue drains on a timer, independently of request handling.
    tokio::spawn(run_email_worker(
        services.email_queue.clone(),
        Duration::from_secs(cfg.email_worker_interval_secs),
    ));

    let auth = Arc::new(api::auth::AuthService::new(
        cfg.jwt_secret.clone(),
        cfg.jwt_expiration,
        cfg.admin_email.clone(),
        cfg.admin_password_hash.clone(),
    ));

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        services,
        auth,
    };

    let mut app = api::app(state);

    if let Some(origins) = &cfg.cors_allowed_origins {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|o| o.trim().parse().ok())
            .collect();
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port configuration")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
