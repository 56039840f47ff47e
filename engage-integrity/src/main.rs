use std::sync::Arc;

use engage_shared::clients::db::create_pool;
use engage_shared::clients::rabbitmq::RabbitMQClient;
use engage_shared::clients::redis::RedisClient;

use engage_integrity::config::{AppConfig, Backend};
use engage_integrity::engine::Engine;
use engage_integrity::events::{EventSink, LogSink};
use engage_integrity::rate_limit::{MemoryRateLimiter, RateLimiter, RedisRateLimiter};
use engage_integrity::store::{EngineStore, MemoryStore, PgStore};
use engage_integrity::{jobs, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    engage_shared::middleware::init_tracing("engage-integrity");

    let config = AppConfig::load()?;
    let port = config.port;

    // The auth extractors read the signing secret from the environment.
    std::env::set_var("JWT_SECRET", &config.jwt_secret);

    let metrics_handle = engage_shared::middleware::init_metrics()?;

    let (store, limiter, sink): (Arc<dyn EngineStore>, Arc<dyn RateLimiter>, Arc<dyn EventSink>) =
        match config.backend {
            Backend::Postgres => {
                let pool = create_pool(&config.database_url, config.db_pool_size)?;
                let redis = RedisClient::connect(&config.redis_url).await?;
                let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url, &config.events_exchange).await?;
                (
                    Arc::new(PgStore::new(pool)),
                    Arc::new(RedisRateLimiter::new(redis, config.policy.rate_limits.clone())),
                    Arc::new(rabbitmq),
                )
            }
            Backend::Memory => {
                tracing::warn!("running on the in-memory backend; state is lost on restart");
                (
                    Arc::new(MemoryStore::new()),
                    Arc::new(MemoryRateLimiter::new(config.policy.rate_limits.clone())),
                    Arc::new(LogSink),
                )
            }
        };

    let engine = Engine::builder(store, config.policy.clone())
        .rate_limiter(limiter)
        .event_sink(sink)
        .build();

    let state = Arc::new(AppState {
        config,
        engine,
        metrics_handle: Some(metrics_handle),
    });

    if state.config.scheduler.enabled {
        jobs::spawn_settlement_task(state.clone());
        jobs::spawn_auto_flag_task(state.clone());
    }

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "engage-integrity starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
