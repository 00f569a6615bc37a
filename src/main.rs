use chat_backend::{
    db::{create_pool, run_migrations, Database},
    routes::create_router,
    state::{AppState, Config},
    websocket::run_relay,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chat_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    tracing::info!(url = %config.database_url, "opening database");
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;

    tracing::info!("running migrations");
    run_migrations(&pool).await?;

    let nats = match config.nats_url.as_deref() {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(url, "connected to NATS, cross-instance relay enabled");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "NATS unavailable, delivering events locally only");
                None
            }
        },
        None => None,
    };

    let state = AppState::new(Database::new(pool), config.clone(), nats.clone());

    if let Some(client) = nats {
        let connections = state.connections.clone();
        tokio::spawn(async move {
            if let Err(e) = run_relay(client, connections).await {
                tracing::error!(error = ?e, "event relay stopped");
            }
        });
    }

    let app = create_router(state);

    let addr = config.bind_addr();
    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
