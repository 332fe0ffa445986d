//! Batch loading of sequencing run folders into SQVD.

use anyhow::Error;
use itertools::Itertools;

pub mod batch;
pub mod config;

/// Print an error chain.
pub fn print_error_chain(err: &Error) {
    println!("ERROR: {}", err.chain().join("\n\tCaused by: "));
}
