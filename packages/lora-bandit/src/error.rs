//! error.rs — Engine error types
//!
//! Only construction and foreign-arm conditions are errors. Everything that
//! can happen mid-run (zero denominators, unknown airtime entries, rounds out
//! of order) degrades to a documented default instead.

use lora_types::{Dimension, ParameterSet};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A catalog dimension was configured with no values
    #[error("catalog dimension '{0}' has no values")]
    EmptyDimension(Dimension),

    /// The arm does not index into the engine's catalog
    #[error("arm {arm} is not part of the parameter catalog")]
    ArmOutOfCatalog { arm: ParameterSet },

    /// A policy was configured without any dimension to learn
    #[error("policy must learn at least one dimension")]
    NoDimensions,

    #[error("dimension '{0}' listed twice")]
    DuplicateDimension(Dimension),

    /// A tuning factor outside its valid range
    #[error("invalid value for '{name}': {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// config.toml could not be parsed
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checks a factor lies in `[lo, hi]`.
pub(crate) fn check_range(name: &'static str, value: f64, lo: f64, hi: f64) -> Result<()> {
    if value.is_finite() && (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidParameter { name, value })
    }
}
