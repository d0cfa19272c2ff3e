//! Settings error types.

use crate::filter::FilterState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Setting not found: {0}")]
    NotFound(String),

    #[error("Setting '{name}' holds {expected}, not {requested}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        requested: &'static str,
    },

    #[error("Setting '{0}' is read-only")]
    ReadOnly(String),

    #[error("Setting '{name}' cannot be written while {state}")]
    NotPermitted { name: String, state: FilterState },

    #[error("Duplicate setting or command name: {0}")]
    Duplicate(String),

    #[error("Invalid value for setting '{name}': {message}")]
    InvalidValue { name: String, message: String },

    #[error("Settings IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings parse error: {0}")]
    Parse(String),
}

pub type SettingsResult<T> = std::result::Result<T, SettingsError>;
