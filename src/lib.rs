// ABOUTME: Library root for rowmirror
// ABOUTME: Exports the sync core, the MySQL endpoint and the trigger surface

pub mod catalog;
pub mod config;
pub mod database;
pub mod git;
pub mod memory;
pub mod mysql;
pub mod replicator;
pub mod report;
pub mod row;
pub mod server;
pub mod session;
pub mod staleness;
pub mod table;
pub mod trigger;
pub mod utils;

pub use catalog::Catalog;
pub use config::Config;
pub use database::Database;
pub use replicator::replicate;
pub use report::{SyncReport, TableOutcome, TableStats};
pub use row::Row;
pub use session::{run_sync, SyncSession};
pub use staleness::needs_sync;
pub use table::{TableDescriptor, TableStatus};
