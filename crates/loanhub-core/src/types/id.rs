//! Typed identifiers.
//!
//! Each entity gets its own `Uuid` newtype so a `UnitId` cannot be passed
//! where a `DeviceId` is expected. With the `sqlx` feature the ids bind
//! and decode as PostgreSQL `uuid` columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "sqlx", derive(sqlx::Type), sqlx(transparent))]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Random (v4) identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Time-ordered (v7) identifier. Later ids compare greater, so
            /// they double as an insertion-order tie-break.
            pub fn now_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The nil UUID stands for "no id given".
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            /// Parse caller input. Blank and malformed input are both
            /// validation errors.
            pub fn parse(input: &str) -> Result<Self, AppError> {
                let input = input.trim();
                if input.is_empty() {
                    return Err(AppError::validation(concat!(stringify!($name), " must not be empty")));
                }
                Uuid::parse_str(input).map(Self).map_err(|e| {
                    AppError::validation(format!("Invalid {} '{input}': {e}", stringify!($name)))
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a user.
    UserId
);

define_id!(
    /// Unique identifier for a device catalog type.
    DeviceId
);

define_id!(
    /// Unique identifier for one physical inventory unit.
    UnitId
);

define_id!(
    /// Unique identifier for a reservation.
    ReservationId
);

define_id!(
    /// Unique identifier for a waitlist entry.
    WaitlistEntryId
);
