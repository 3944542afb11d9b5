//! CLI command definitions and dispatch.

pub mod migrate;
pub mod notify;
pub mod reservation;
pub mod waitlist;

use clap::{Parser, Subcommand};

use loanhub_core::config::AppConfig;
use loanhub_core::error::AppError;

use crate::context::AppContext;
use crate::output::OutputFormat;

/// LoanHub: device reservations and waitlists
#[derive(Debug, Parser)]
#[command(name = "loanhub", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,
    #[command(flatten)]
    Reservation(reservation::ReservationCommand),
    /// Waitlist management
    Waitlist(waitlist::WaitlistArgs),
    /// Notify the next waiting user for a device
    Notify(notify::NotifyArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: AppConfig) -> Result<(), AppError> {
        if let Commands::Migrate = &self.command {
            return migrate::execute(&config).await;
        }

        let ctx = AppContext::connect(&config).await?;
        let result = match &self.command {
            Commands::Migrate => Ok(()),
            Commands::Reservation(cmd) => reservation::execute(cmd, &ctx, self.format).await,
            Commands::Waitlist(args) => waitlist::execute(args, &ctx, self.format).await,
            Commands::Notify(args) => notify::execute(args, &ctx, self.format).await,
        };
        ctx.finish().await;
        result
    }
}
