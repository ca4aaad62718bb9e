//! CLI argument definitions for the Tally binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tally::config::MAX_SESSION_TTL;

const MAX_SESSION_TTL_HOURS: u64 = MAX_SESSION_TTL.as_secs() / 3600;

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite database (default)
    Sqlite,
    /// PostgreSQL database
    Postgres,
    /// Process memory only; everything is lost on exit
    Inmemory,
}

/// Campaign operations dashboard server
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Tally: campaign dashboard server with role-scoped access and a live feed")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dashboard server
    Serve(ServeArgs),
    /// Create or reset an administrator account
    CreateAdmin(CreateAdminArgs),
    /// Check health of a running server
    Health(HealthArgs),
}

/// Where data lives. Shared by every command that opens the store.
#[derive(clap::Args, Debug, Clone)]
pub struct BackendArgs {
    /// Storage backend to use
    #[arg(short, long, default_value = "sqlite", env = "TALLY_BACKEND")]
    pub backend: Backend,

    /// Data directory for storage files (SQLite stores tally.db here)
    #[arg(short = 'D', long, env = "TALLY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// PostgreSQL connection URL (required when backend=postgres)
    #[arg(long, env = "TALLY_POSTGRES_URL")]
    pub postgres_url: Option<String>,
}

/// Arguments for the serve command
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "TALLY_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "TALLY_HOST")]
    pub host: String,

    #[command(flatten)]
    pub backend_config: BackendArgs,

    /// Session lifetime in hours (at most one year)
    #[arg(
        long,
        default_value_t = 168,
        env = "TALLY_SESSION_TTL_HOURS",
        value_parser = clap::value_parser!(u64).range(1..=MAX_SESSION_TTL_HOURS)
    )]
    pub session_ttl_hours: u64,

    /// Omit the Secure cookie attribute (plain-HTTP local development only)
    #[arg(long, env = "TALLY_INSECURE_COOKIES")]
    pub insecure_cookies: bool,

    /// Seconds between keep-alive comments on the live feed
    #[arg(
        long,
        default_value_t = 25,
        env = "TALLY_HEARTBEAT_SECS",
        value_parser = clap::value_parser!(u64).range(1..=3600)
    )]
    pub heartbeat_secs: u64,

    /// Minutes between expired-session purges
    #[arg(
        long,
        default_value_t = 10,
        env = "TALLY_PURGE_MINUTES",
        value_parser = clap::value_parser!(u64).range(1..=24 * 60)
    )]
    pub purge_minutes: u64,
}

/// Arguments for the create-admin command
#[derive(clap::Args, Debug)]
pub struct CreateAdminArgs {
    /// Administrator email (login name)
    #[arg(long, env = "TALLY_ADMIN_EMAIL")]
    pub email: String,

    /// Administrator password
    #[arg(long, env = "TALLY_ADMIN_PASSWORD")]
    pub password: String,

    #[command(flatten)]
    pub backend_config: BackendArgs,
}

/// Arguments for the health command
#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the server to check
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "TALLY_URL")]
    pub url: String,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}
