//! Infrastructure layer: player table adapters, configuration, and the
//! player directory service built on them.

pub mod config;
pub mod directory;
pub mod table;

pub use config::TableConfig;
pub use directory::{create_id, DirectoryError, PlayerDirectory};
pub use table::{DynamoPlayerTable, InMemoryPlayerTable, PlayerTable, TableError};
