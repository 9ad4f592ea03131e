//! Domain layer for rust-srec.
//!
//! This module contains the core business logic, entities, and value objects.

pub mod config;
pub mod filter;
pub mod session;
pub mod streamer;
pub mod value_objects;

pub use streamer::{Streamer, StreamerState};
pub use value_objects::*;
