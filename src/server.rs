use {
    crate::{
        api,
        api::ws::WsState,
        auction,
        auction::repository::Database,
        bid,
        broadcaster::{
            memory::MemoryBroadcaster,
            redis::RedisBroadcaster,
            Broadcaster,
        },
        config::RunOptions,
        kernel::db::DB,
        scheduler::{
            memory::MemoryTimerIndex,
            redis::RedisTimerIndex,
            TimerIndex,
        },
        state::AppState,
    },
    anyhow::{
        anyhow,
        Result,
    },
    redis::aio::ConnectionManager,
    sqlx::postgres::PgPoolOptions,
    std::{
        sync::{
            atomic::{
                AtomicBool,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    },
};

// A static exit flag to indicate to running tasks that we're shutting down.
// This is used to gracefully shut down the application.
pub static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);
pub const EXIT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub async fn start_server(run_options: RunOptions) -> Result<()> {
    tokio::spawn(async move {
        tracing::info!("Registered shutdown signal handler...");
        tokio::signal::ctrl_c().await.unwrap();
        tracing::info!("Shut down signal received, waiting for tasks...");
        SHOULD_EXIT.store(true, Ordering::Release);
    });

    let pool: DB = PgPoolOptions::new()
        .max_connections(10)
        .connect(&run_options.database_url)
        .await
        .map_err(|err| anyhow!("Failed to connect to database: {err:?}"))?;
    let store: Arc<dyn Database> = Arc::new(pool);
    store.migrate().await?;
    tracing::info!("Database ready");

    let (broadcaster, timer_index): (Arc<dyn Broadcaster>, Arc<dyn TimerIndex>) =
        match &run_options.redis_url {
            Some(redis_url) => {
                let client = redis::Client::open(redis_url.as_str())
                    .map_err(|err| anyhow!("Invalid redis url: {err:?}"))?;
                let conn = ConnectionManager::new(client)
                    .await
                    .map_err(|err| anyhow!("Failed to connect to redis: {err:?}"))?;
                tracing::info!("Redis ready");
                (
                    Arc::new(RedisBroadcaster::new(redis_url).await?),
                    Arc::new(RedisTimerIndex::new(conn)),
                )
            }
            None => {
                tracing::warn!(
                    "No redis url configured, fan-out and timers are single-instance"
                );
                (
                    Arc::new(MemoryBroadcaster::new()),
                    Arc::new(MemoryTimerIndex::new()),
                )
            }
        };

    let auction_service =
        auction::service::Service::new(store.clone(), timer_index, broadcaster.clone());
    let bid_service = bid::service::Service::new(store, broadcaster.clone());

    // A wiped or fresh timer index is rebuilt from the relational fallback
    // before the worker starts ticking.
    auction_service.rebuild_timer_index().await?;
    let expiration_worker = auction_service.clone();
    let worker_handle = tokio::spawn(async move { expiration_worker.run_expiration_loop().await });

    let state = Arc::new(AppState {
        auction_service,
        bid_service,
        broadcaster,
        ws: WsState::new(),
    });

    let app_state = state.clone();
    let listener = tokio::net::TcpListener::bind(&run_options.server.listen_addr)
        .await
        .map_err(|err| {
            anyhow!(
                "Failed to bind {addr}: {err:?}",
                addr = run_options.server.listen_addr
            )
        })?;
    tracing::info!(listen_addr = %run_options.server.listen_addr, "Starting server...");

    axum::serve(listener, api::routes(state))
        .with_graceful_shutdown(async {
            while !SHOULD_EXIT.load(Ordering::Acquire) {
                tokio::time::sleep(EXIT_CHECK_INTERVAL).await;
            }
            tracing::info!("Shutting down server...");
        })
        .await?;

    app_state.ws.shutdown_sessions();
    worker_handle.await?;
    Ok(())
}
