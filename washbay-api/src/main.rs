use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use washbay_api::{app, AppState};
use washbay_booking::{BookingCoordinator, LogNotifier};
use washbay_store::{DbClient, PgCapacityStore, PgReservationLedger, RedisClient, RedisRateGuard};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "washbay_api=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = washbay_store::app_config::Config::load().expect("Failed to load config");
    let rules = config.schedule.rules().expect("Invalid schedule config");
    tracing::info!("Starting Washbay API on port {}", config.server.port);

    // Postgres Connection
    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    // Redis Connection
    let redis_client = RedisClient::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");
    let redis_arc = Arc::new(redis_client.clone());

    let capacity = Arc::new(PgCapacityStore::new(db.pool.clone(), rules.clone()));
    let ledger = Arc::new(PgReservationLedger::new(db.pool.clone(), rules.clone()));
    let rate_guard = Arc::new(RedisRateGuard::new(
        redis_client,
        rules.rate_limit_max,
        rules.rate_limit_window_secs,
    ));
    let notifier = Arc::new(LogNotifier);

    let coordinator = Arc::new(BookingCoordinator::new(
        ledger,
        rate_guard,
        notifier,
        rules.clone(),
    ));

    // SSE Broadcast Channel
    let (capacity_tx, _) = tokio::sync::broadcast::channel(100);

    let app_state = AppState {
        capacity,
        coordinator,
        redis: redis_arc,
        capacity_tx,
        admin_token: config.admin.token.clone(),
        rules,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
