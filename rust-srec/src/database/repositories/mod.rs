//! Repository layer for database access.
//!
//! This module implements the Repository Pattern to abstract all database interactions,
//! creating a clean and maintainable data access layer.

pub mod config;
pub mod filter;
pub mod job;
pub mod monitor_outbox;
pub mod notification;
pub mod preset;
pub mod refresh_token;
pub mod session;
pub mod session_tx;
pub mod streamer;
pub mod streamer_tx;
pub mod user;

pub use config::*;
pub use filter::*;
pub use job::*;
pub use monitor_outbox::*;
pub use notification::*;
pub use preset::*;
pub use refresh_token::*;
pub use session::*;
pub use session_tx::*;
pub use streamer::*;
pub use streamer_tx::*;
pub use user::*;
