//! Environment-driven configuration, resolved before any remote call.

use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;

const HOST_VAR: &str = "SQVDHOST";
const USER_VAR: &str = "SQVDUSER";
const PASS_VAR: &str = "SQVDPASS";

/// Connection settings for one loader run.
#[derive(Debug, Clone)]
pub struct SqvdConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl SqvdConfig {
    /// Read `SQVDUSER`, `SQVDPASS` and `SQVDHOST`. A missing or empty
    /// variable is fatal before anything is scanned or sent.
    pub fn from_env() -> Result<Self> {
        Ok(SqvdConfig {
            host: require(HOST_VAR)?,
            username: require(USER_VAR)?,
            password: require(PASS_VAR)?,
        })
    }
}

fn require(var: &str) -> Result<String> {
    match env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => bail!(
            "{var} is not set. Ensure {USER_VAR}, {PASS_VAR} and {HOST_VAR} \
             are set before loading."
        ),
    }
}

/// Parse and validate a root directory argument, for use with Clap's
/// value_parser.
pub fn existing_dir(arg: &str) -> Result<PathBuf> {
    let path = PathBuf::from(arg.trim_end_matches('/'));
    if !path.is_dir() {
        bail!("'{arg}' is not a directory");
    }
    Ok(path)
}
