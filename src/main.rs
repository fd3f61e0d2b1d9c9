use {
    anyhow::Result,
    clap::Parser,
    config::Options,
    server::start_server,
    std::io::IsTerminal,
    tracing_subscriber::{
        filter::LevelFilter,
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    },
};

mod api;
mod auction;
mod bid;
mod broadcaster;
mod config;
mod kernel;
mod scheduler;
mod server;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    let log_layer = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(true)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal());

    tracing_subscriber::registry()
        .with(log_layer)
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match Options::parse() {
        Options::Run(run_options) => start_server(run_options).await,
    }
}
