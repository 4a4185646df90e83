use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Flakbase: a realtime tree-structured database server speaking a
/// Firebase-compatible wire protocol.
#[derive(Debug, Parser)]
#[command(name = "flakbase", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the Flakbase server.
    Serve(ServerConfig),
}

/// Server configuration. The original Go implementation split this into a
/// separate `--rest`/`--port`/`--host` trio; here a single `--host` carries
/// the full `host:port` address, since one `axum::Router` now serves both
/// surfaces unconditionally.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to bind, e.g. `localhost:5000`.
    #[arg(long, env = "FLAKBASE_HOST", default_value = "localhost:9527")]
    pub host: String,

    /// Path to a MongoDB connection config, selecting the document-store
    /// backend instead of the in-memory one.
    #[arg(long, env = "FLAKBASE_MONGO")]
    pub mongo: Option<PathBuf>,

    /// Path to a Firebase-style security rules JSON file.
    #[arg(long, env = "FLAKBASE_RULE")]
    pub rule: Option<PathBuf>,
}
