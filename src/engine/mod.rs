// src/engine/mod.rs

//! The outer loop that keeps running rounds until one fails.

pub mod driver;

pub use driver::{RoundDriver, RoundFailure};
