//! Relay Common - Shared types and utilities for the LINE relay.
//!
//! This crate provides:
//! - Configuration loading with environment variable overrides
//! - The unified error taxonomy
//! - Logging initialization

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{Error, Result};
