//! Manual waitlist sweep.
//!
//! Meant to be run from cron to retry entries whose notification failed.

use clap::Args;
use serde::Serialize;

use loanhub_core::error::AppError;
use loanhub_core::types::id::DeviceId;
use loanhub_service::NotifyOutcome;

use crate::context::AppContext;
use crate::output::{self, OutputFormat};

/// Arguments for the notify command
#[derive(Debug, Args)]
pub struct NotifyArgs {
    /// Device whose waitlist to serve
    #[arg(long)]
    pub device: DeviceId,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum OutcomeView {
    QueueEmpty,
    Notified { entry_id: String, user_id: String },
    Failed { entry_id: String, error: String },
}

impl From<NotifyOutcome> for OutcomeView {
    fn from(outcome: NotifyOutcome) -> Self {
        match outcome {
            NotifyOutcome::QueueEmpty => Self::QueueEmpty,
            NotifyOutcome::Notified { entry_id, user_id } => Self::Notified {
                entry_id: entry_id.to_string(),
                user_id: user_id.to_string(),
            },
            NotifyOutcome::Failed { entry_id, error } => Self::Failed {
                entry_id: entry_id.to_string(),
                error: error.to_string(),
            },
        }
    }
}

/// Execute the notify command
pub async fn execute(
    args: &NotifyArgs,
    ctx: &AppContext,
    format: OutputFormat,
) -> Result<(), AppError> {
    let outcome = OutcomeView::from(ctx.dispatcher.notify_next_user(args.device).await?);

    if format == OutputFormat::Json {
        output::print_json(&outcome);
        return Ok(());
    }

    match outcome {
        OutcomeView::QueueEmpty => println!("No one is waiting for {}.", args.device),
        OutcomeView::Notified { entry_id, user_id } => {
            output::print_success("Notified next user");
            output::print_kv("Entry", &entry_id);
            output::print_kv("User", &user_id);
        }
        OutcomeView::Failed { entry_id, error } => {
            output::print_error("Notification failed, entry left pending");
            output::print_kv("Entry", &entry_id);
            output::print_kv("Error", &error);
        }
    }
    Ok(())
}
