//! Invoicing API server: applies migrations, wires the broker bridge, and
//! mounts common and entity routes under /api.

use axum::Router;
use invoicing_api::broker::{run_consumer, HandlerRegistry, InMemoryMessageQueue, LogHandler, Producer};
use invoicing_api::extractors::AuthConfig;
use invoicing_api::{apply_migrations, common_routes, entity_routes, AppConfig, AppState, Model};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("invoicing_api=info".parse()?),
        )
        .init();

    let config = AppConfig::from_env()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let model = Model::invoicing();
    apply_migrations(&pool, &model).await?;

    if let Some(url) = &config.broker.connection {
        tracing::warn!(url = %url, "external broker configured but no client is wired; using the in-process queue");
    }
    let queue = Arc::new(InMemoryMessageQueue::new(config.broker.queue_capacity));
    let producer = Producer::new(queue.clone());

    if config.broker.consumer_enabled {
        let mut registry = HandlerRegistry::new();
        for entity in model.entities() {
            for action in ["created", "updated", "deleted"] {
                let topic = format!("{}.{}", entity.event_name, action);
                registry = registry.register(topic, Arc::new(LogHandler));
            }
        }
        tokio::spawn(run_consumer(queue.clone(), registry, pool.clone(), model));
    }

    let state = AppState {
        pool,
        model,
        producer,
        auth: AuthConfig::new(&config.jwt_secret),
    };

    let app = Router::new()
        .merge(common_routes(state.clone()))
        .nest("/api", entity_routes(state))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
