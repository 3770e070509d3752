use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "privacy-analyzer", about = "Website privacy scan service")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the Poll API / submission ingress HTTP server
    Serve,
    /// Run the Worker Pool only (no HTTP server)
    Worker,
    /// Apply database migrations and exit
    Migrate,
}
