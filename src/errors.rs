// src/errors.rs

//! Crate-wide error type.
//!
//! Round-local failures live in [`crate::exec::RoundError`]; they reach this
//! level wrapped in a [`RoundFailure`](crate::engine::RoundFailure) once the
//! driver has stopped.

use thiserror::Error;

use crate::engine::RoundFailure;

#[derive(Error, Debug)]
pub enum FlakeError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Round(#[from] RoundFailure),
}

pub type Result<T> = std::result::Result<T, FlakeError>;
