//! Test Helper Utilities
//!
//! Shared utilities for testing kinload-import

#![allow(dead_code)]

pub mod db_utils;
pub mod fixture_generator;

// Re-export commonly used items
pub use db_utils::{create_test_db, FlakySink};
pub use fixture_generator::{
    family_tree, fast_retry, individuals, insert_after_record, run_import, utf16be, utf16le,
    with_utf8_bom, TreeConfig,
};
