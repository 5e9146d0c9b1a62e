//! Environment helpers used by the configuration builders

use std::str::FromStr;
use thiserror::Error;

/// Failure to interpret an environment variable
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value for {name}: {value:?} ({reason})")]
pub struct EnvError {
    /// Variable name
    pub name: String,
    /// Raw value found in the environment
    pub value: String,
    /// Parser message
    pub reason: String,
}

/// Read and parse a variable. Unset yields `Ok(None)`.
pub fn env_parse<T>(name: &str) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| EnvError {
            name: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

/// Read a comma-separated list. Empty items are dropped, the rest trimmed.
pub fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|raw| split_list(&raw))
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
