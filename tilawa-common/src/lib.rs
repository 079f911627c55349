//! # Tilawa Common Library
//!
//! Shared code for the Tilawa recitation player crates:
//! - Event types (SequencerEvent enum) and the EventBus
//! - Bootstrap configuration loading (TOML)
//! - Common error types

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
