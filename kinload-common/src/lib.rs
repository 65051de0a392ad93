//! # kinload common library
//!
//! Shared code for the kinload crates:
//! - Error and result types
//! - Configuration loading (command line, environment, TOML, defaults)
//! - SQLite pool initialization and import session persistence tables

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
