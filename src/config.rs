use {
    clap::{
        crate_authors,
        crate_description,
        crate_name,
        crate_version,
        Args,
        Parser,
    },
    std::{
        net::SocketAddr,
        time::Duration,
    },
};

/// Capacity of the per-session outbound queue drained by the writer task.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 100;
/// Capacity of the per-session event sink the bus writes into.
pub const EVENT_SINK_CAPACITY: usize = 100;
/// Pending inbound frames a session buffers before the reader blocks.
pub const INBOUND_QUEUE_CAPACITY: usize = 100;
/// Worker tasks handling inbound frames per session.
pub const SESSION_WORKERS: usize = 10;
/// How long an outbound enqueue waits on a saturated queue before failing.
pub const SEND_FALLBACK_TIMEOUT: Duration = Duration::from_millis(100);

/// Expiration worker tick.
pub const EXPIRATION_TICK: Duration = Duration::from_secs(1);
/// Due auctions processed per worker tick.
pub const EXPIRATION_BATCH: usize = 10;

#[derive(Parser, Debug)]
#[command(name = crate_name!())]
#[command(author = crate_authors!())]
#[command(about = crate_description!())]
#[command(version = crate_version!())]
pub enum Options {
    /// Run the auction server.
    Run(RunOptions),
}

#[derive(Args, Clone, Debug)]
pub struct RunOptions {
    #[command(flatten)]
    pub server: ServerOptions,

    /// Postgres connection string for the authoritative store.
    #[arg(long = "database-url")]
    #[arg(env = "DATABASE_URL")]
    pub database_url: String,

    /// Redis connection string for cross-instance fan-out and the timer
    /// index. When absent the server runs single-instance with in-process
    /// equivalents.
    #[arg(long = "redis-url")]
    #[arg(env = "REDIS_URL")]
    pub redis_url: Option<String>,
}

#[derive(Args, Clone, Debug)]
#[command(next_help_heading = "Server Options")]
#[group(id = "Server")]
pub struct ServerOptions {
    /// Address and port to bind the WebSocket server to.
    #[arg(long = "listen-addr")]
    #[arg(env = "LISTEN_ADDR")]
    #[arg(default_value = "127.0.0.1:9000")]
    pub listen_addr: SocketAddr,
}
