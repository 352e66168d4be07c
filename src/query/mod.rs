//! Query execution for shelfdb
//!
//! [`QueryRunner`] executes shelfql descriptions against any
//! [`RecordStore`](crate::storage::RecordStore).

pub mod aggregate;
pub mod filter;
mod runner;

pub use runner::{DeleteOutcome, QueryRunner, UpdateOutcome};
