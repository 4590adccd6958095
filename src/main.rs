use std::sync::Arc;

use clinic_queue::{
    cache::TtlCache,
    clock::SystemClock,
    config::Config,
    db,
    models::AppState,
    routes,
    store::PgStore,
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url, cfg.db_max_connections).await?;

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        clock: Arc::new(SystemClock),
        // a single key lives here today
        stats_cache: TtlCache::new(16, cfg.stats_cache_ttl),
    };

    // The front desk and physician screens are served from another origin and poll.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(
        stats_ttl_secs = cfg.stats_cache_ttl.as_secs(),
        "Listening on http://{}",
        cfg.bind_addr
    );
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
