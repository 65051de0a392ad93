//! Database initialization shared by the kinload crates

#[cfg(feature = "sqlx")]
pub mod init;

#[cfg(feature = "sqlx")]
pub use init::{create_import_sessions_table, init_database, open_in_memory};
