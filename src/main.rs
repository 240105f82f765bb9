use std::sync::Arc;

use sparrow_rides::{config::AppConfig, handlers, loops, state::AppState};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sparrow_rides=debug,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    let bind_addr = config.bind_addr.clone();
    tracing::info!(
        "Dispatch: {:?}, radius {}-{} km, offer timeout {:?}",
        config.dispatch_mode,
        config.dispatch.initial_radius_km,
        config.dispatch.max_radius_km,
        config.dispatch.offer_timeout
    );

    let state = Arc::new(AppState::new(config).await?);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    tokio::spawn(loops::expiry_loop::run_request_expiry_loop(
        state.clone(),
        shutdown_tx.subscribe(),
    ));

    let app = handlers::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("sparrow-rides listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        })
        .await?;

    Ok(())
}
