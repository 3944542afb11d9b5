//! Waitlist commands.

use clap::{Args, Subcommand};
use tabled::Tabled;

use loanhub_core::error::AppError;
use loanhub_core::types::id::{DeviceId, UserId};
use loanhub_service::{WaitlistEntryView, WaitlistJoinView};

use crate::context::AppContext;
use crate::output::{self, OutputFormat};

/// Arguments for waitlist commands
#[derive(Debug, Args)]
pub struct WaitlistArgs {
    /// Waitlist subcommand
    #[command(subcommand)]
    pub command: WaitlistCommand,
}

/// Waitlist subcommands
#[derive(Debug, Subcommand)]
pub enum WaitlistCommand {
    /// Queue a user for a device
    Join {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        device: DeviceId,
    },
    /// Remove a user's pending entry
    Leave {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        device: DeviceId,
    },
    /// Show a user's position in the queue
    Position {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        device: DeviceId,
    },
    /// List pending entries in queue order
    List {
        #[arg(long)]
        device: DeviceId,
    },
}

/// Waitlist display row for table output
#[derive(Debug, Tabled)]
struct EntryRow {
    /// Position
    #[tabled(rename = "#")]
    position: usize,
    /// Entry ID
    id: String,
    /// User
    user: String,
    /// Added at
    added_at: String,
}

/// Execute waitlist commands
pub async fn execute(
    args: &WaitlistArgs,
    ctx: &AppContext,
    format: OutputFormat,
) -> Result<(), AppError> {
    let service = &ctx.waitlist;

    match &args.command {
        WaitlistCommand::Join { user, device } => {
            let joined = WaitlistJoinView::from(service.join(*user, *device).await?);
            match format {
                OutputFormat::Table => {
                    output::print_success("Joined waitlist");
                    output::print_kv("Entry", &joined.entry.id.to_string());
                    output::print_kv("Position", &joined.position.to_string());
                }
                OutputFormat::Json => output::print_json(&joined),
            }
        }
        WaitlistCommand::Leave { user, device } => {
            service.remove(*user, *device).await?;
            output::print_success(&format!("User {user} left the waitlist for {device}"));
        }
        WaitlistCommand::Position { user, device } => {
            let position = service.position(*user, *device).await?;
            match format {
                OutputFormat::Table => output::print_kv("Position", &position.to_string()),
                OutputFormat::Json => {
                    output::print_json(&serde_json::json!({ "position": position }))
                }
            }
        }
        WaitlistCommand::List { device } => {
            let entries: Vec<WaitlistEntryView> = service
                .list(*device)
                .await?
                .into_iter()
                .map(WaitlistEntryView::from)
                .collect();
            let rows: Vec<EntryRow> = entries
                .iter()
                .enumerate()
                .map(|(i, e)| EntryRow {
                    position: i + 1,
                    id: e.id.to_string(),
                    user: e.user_id.to_string(),
                    added_at: e.added_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                })
                .collect();
            match format {
                OutputFormat::Table if rows.is_empty() => println!("No one is waiting."),
                OutputFormat::Table => println!("{}", tabled::Table::new(rows)),
                OutputFormat::Json => output::print_json(&entries),
            }
        }
    }

    Ok(())
}
