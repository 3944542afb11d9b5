//! Reservation commands.

use clap::Subcommand;
use tabled::Tabled;

use loanhub_core::error::AppError;
use loanhub_core::traits::{Clock, SystemClock};
use loanhub_core::types::id::{DeviceId, ReservationId, UserId};
use loanhub_service::ReservationView;

use crate::context::AppContext;
use crate::output::{self, OutputFormat};

/// Reservation lifecycle commands
#[derive(Debug, Subcommand)]
pub enum ReservationCommand {
    /// Reserve a free unit of a device
    Reserve {
        /// Reserving user
        #[arg(long)]
        user: UserId,
        /// Device to reserve
        #[arg(long)]
        device: DeviceId,
    },
    /// Cancel a pending reservation
    Cancel {
        /// Owner of the reservation
        #[arg(long)]
        user: UserId,
        /// Reservation to cancel
        reservation: ReservationId,
    },
    /// Record that the user picked up the unit
    Collect {
        /// Owner of the reservation
        #[arg(long)]
        user: UserId,
        /// Reservation to collect
        reservation: ReservationId,
    },
    /// Check a collected unit back in
    Return {
        /// Reservation to return
        reservation: ReservationId,
    },
    /// Close a collected loan
    Complete {
        /// Reservation to complete
        reservation: ReservationId,
    },
    /// List a user's reservations, newest first
    Reservations {
        /// User whose reservations to list
        #[arg(long)]
        user: UserId,
    },
}

/// Reservation display row for table output
#[derive(Debug, Tabled)]
struct ReservationRow {
    /// Reservation ID
    id: String,
    /// Device
    device: String,
    /// Unit
    unit: String,
    /// Status
    status: String,
    /// Reserved at
    reserved_at: String,
    /// Due date
    due_date: String,
    /// Overdue marker
    overdue: String,
}

impl From<&ReservationView> for ReservationRow {
    fn from(r: &ReservationView) -> Self {
        Self {
            id: r.id.to_string(),
            device: r.device_id.to_string(),
            unit: r.unit_id.to_string(),
            status: r.status.to_string(),
            reserved_at: r.reserved_at.format("%Y-%m-%d %H:%M").to_string(),
            due_date: r.due_date.format("%Y-%m-%d").to_string(),
            overdue: if r.is_overdue { "yes".into() } else { String::new() },
        }
    }
}

/// Execute reservation commands
pub async fn execute(
    command: &ReservationCommand,
    ctx: &AppContext,
    format: OutputFormat,
) -> Result<(), AppError> {
    let service = &ctx.reservations;

    let reservation = match command {
        ReservationCommand::Reserve { user, device } => {
            service.reserve(*user, *device).await.map_err(|e| {
                if e.is_conflict(loanhub_core::ConflictReason::NoInventory) {
                    AppError::no_inventory(format!(
                        "{}. Join the waitlist with `loanhub waitlist join --user {user} --device {device}`",
                        e.message
                    ))
                } else {
                    e
                }
            })?
        }
        ReservationCommand::Cancel { user, reservation } => {
            service.cancel(*user, *reservation).await?
        }
        ReservationCommand::Collect { user, reservation } => {
            service.collect(*user, *reservation).await?
        }
        ReservationCommand::Return { reservation } => service.return_unit(*reservation).await?,
        ReservationCommand::Complete { reservation } => service.complete(*reservation).await?,
        ReservationCommand::Reservations { user } => {
            let now = SystemClock.now();
            let views: Vec<ReservationView> = service
                .list_for_user(*user)
                .await?
                .into_iter()
                .map(|r| ReservationView::as_of(r, now))
                .collect();
            output::print_list(&views, format, |r| ReservationRow::from(r));
            return Ok(());
        }
    };

    let view = ReservationView::as_of(reservation, SystemClock.now());
    if format == OutputFormat::Table {
        output::print_success(&format!("Reservation {} is {}", view.id, view.status));
    }
    output::print_item(&view, format, |r| ReservationRow::from(r));
    Ok(())
}
