//! Test helper modules for tilawa-ap integration tests
//!
//! - ScriptedDecoder: decoder double with per-track failures and gates
//! - Harness: sequencer on a manual virtual output with recorded callbacks
//! - audio_generator: WAV fixtures for decoder tests

#![allow(dead_code)]

pub mod audio_generator;
pub mod harness;
pub mod scripted_decoder;

pub use harness::{Harness, Notice};
pub use scripted_decoder::{tracks, ScriptedDecoder};
