use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use flakbase::backend::{Backend, DocumentBackend, MemoryBackend};
use flakbase::config::{Cli, Command, ServerConfig};
use flakbase::registry::Registry;
use flakbase::rules::Rules;
use flakbase::session::Dispatcher;
use flakbase::tree::Tree;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(config) => serve(config).await,
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let backend: Arc<dyn Backend> = match &config.mongo {
        Some(path) => Arc::new(DocumentBackend::new(path.clone())),
        None => Arc::new(MemoryBackend::new()),
    };
    let rules = Rules::import(config.rule.as_deref())?.map(Arc::new);

    let dispatcher = Dispatcher::new(Tree::new(backend), Arc::new(Registry::new()), rules);
    let app = flakbase::server::router(dispatcher, config.host.clone());

    tracing::info!(host = %config.host, "flakbase listening");
    let listener = tokio::net::TcpListener::bind(config.host.as_str()).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
