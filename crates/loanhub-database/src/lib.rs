//! # loanhub-database
//!
//! PostgreSQL connection management, migrations, repositories for all
//! LoanHub tables, and the [`LoanStore`] seam used by the service layer.
//! Two store implementations are provided: [`PgLoanStore`] (row locks with
//! `SKIP LOCKED`) and [`MemoryLoanStore`] (in-process, same semantics).

pub mod connection;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use store::{LoanStore, LoanTransaction, MemoryLoanStore, PgLoanStore, UnitAllocator};
