// src/config/mod.rs

//! Configuration loading and validation for flakeloop.
//!
//! - `model.rs` holds the TOML-backed data model and the validated
//!   [`Settings`].
//! - `loader.rs` finds and reads the config file.
//! - `validate.rs` turns a [`RawConfigFile`] into [`Settings`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, resolve};
pub use model::{CommandSection, MarkerSection, RawConfigFile, RoundSection, Settings};
pub use validate::parse_duration;
