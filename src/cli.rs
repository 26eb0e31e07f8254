use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "weekpack", about = "Weekly-shared page-pack service")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP pack service
    Serve {
        /// Bind address, overrides the config value
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Show store connectivity and row counts
    Status,
    /// Delete expired weekly packs now
    Purge,
}
