//! Database models for rust-srec.
//!
//! These models map directly to the database schema and handle
//! serialization/deserialization of JSON fields.

pub mod config;
pub mod dag;
pub mod engine;
pub mod filter;
pub mod job;
pub mod job_preset;
pub mod notification;
pub mod refresh_token;
pub mod session;
pub mod streamer;
pub mod user;

pub use config::*;
pub use dag::*;
pub use engine::*;
pub use filter::*;
pub use job::*;
pub use job_preset::*;
pub use notification::*;
pub use refresh_token::*;
pub use session::*;
pub use streamer::*;
pub use user::*;
