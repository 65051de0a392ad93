//! Interchange fixture generation
//!
//! Builds files in memory so tests can choose record counts and encodings.

use kinload_import::utils::RetryPolicy;
use kinload_import::{
    BatchLimits, CheckpointSink, EntityStore, ImportOptions, ImportOrchestrator, ImportResult,
};
use std::fmt::Write;
use std::sync::Arc;

/// Shape of a generated tree
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Individuals `@I1@` ..= `@In@`
    pub individuals: usize,
    /// Families placed before the individuals they point at
    pub families: usize,
    /// First birth year; each individual is born one year later
    pub first_birth_year: i32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            individuals: 10,
            families: 0,
            first_birth_year: 1800,
        }
    }
}

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

fn header(out: &mut String) {
    out.push_str("0 HEAD\n1 SOUR kinload-tests\n2 VERS 1.0\n1 GEDC\n2 VERS 5.5.1\n1 CHAR UTF-8\n");
}

fn individual(out: &mut String, n: usize, birth_year: i32) {
    let _ = writeln!(out, "0 @I{}@ INDI", n);
    let _ = writeln!(out, "1 NAME Person{} /Family{}/", n, n % 7);
    let _ = writeln!(out, "1 SEX {}", if n % 2 == 0 { "F" } else { "M" });
    out.push_str("1 BIRT\n");
    let _ = writeln!(out, "2 DATE {} {} {}", n % 28 + 1, MONTHS[n % 12], birth_year);
    let _ = writeln!(out, "2 PLAC Town {}", n % 5);
    out.push_str("1 DEAT\n");
    let _ = writeln!(out, "2 DATE ABT {}", birth_year + 70);
}

/// File with a header, `families` families, the individuals and a trailer
///
/// Family `k` names `@I(2k-1)@` as husband, `@I(2k)@` as wife and
/// `@I(2k+1)@` as child, all declared later in the file.
pub fn family_tree(config: &TreeConfig) -> String {
    let mut out = String::new();
    header(&mut out);

    for k in 1..=config.families {
        let _ = writeln!(out, "0 @F{}@ FAM", k);
        let _ = writeln!(out, "1 HUSB @I{}@", 2 * k - 1);
        let _ = writeln!(out, "1 WIFE @I{}@", 2 * k);
        let _ = writeln!(out, "1 CHIL @I{}@", 2 * k + 1);
        out.push_str("1 MARR\n");
        let _ = writeln!(out, "2 DATE {}", config.first_birth_year + 25);
    }

    for n in 1..=config.individuals {
        individual(&mut out, n, config.first_birth_year + n as i32);
    }

    out.push_str("0 TRLR\n");
    out
}

/// Header, `count` individuals and a trailer
pub fn individuals(count: usize) -> String {
    family_tree(&TreeConfig {
        individuals: count,
        ..TreeConfig::default()
    })
}

/// Insert `line` right after the record opened by `0 @<xref>@`
pub fn insert_after_record(text: &str, xref: &str, line: &str) -> String {
    let opener = format!("0 @{}@ ", xref);
    let mut out = String::new();
    let mut inside = false;
    let mut inserted = false;

    for current in text.lines() {
        if inside && !inserted && current.starts_with("0 ") {
            out.push_str(line);
            out.push('\n');
            inserted = true;
        }
        if current.starts_with(&opener) {
            inside = true;
        }
        out.push_str(current);
        out.push('\n');
    }
    out
}

pub fn with_utf8_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xEF, 0xBB, 0xBF];
    bytes.extend_from_slice(text.as_bytes());
    bytes
}

pub fn utf16le(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

pub fn utf16be(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

/// Retry policy without noticeable sleeps
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 1,
    }
}

/// Start a session and run it to the end in one call
pub async fn run_import<S, K>(
    source: impl Into<Vec<u8>>,
    options: ImportOptions,
    store: Arc<S>,
    sink: Arc<K>,
) -> ImportResult
where
    S: EntityStore,
    K: CheckpointSink,
{
    let mut orchestrator = ImportOrchestrator::start(source.into(), "tree", options, store, sink)
        .await
        .unwrap()
        .with_retry_policy(fast_retry());
    orchestrator
        .run_to_completion(BatchLimits::unbounded())
        .await
        .unwrap()
}
