//! Error types for Program Stream multiplexing and demultiplexing.

use std::io;
use thiserror::Error;

/// Errors that can occur while muxing or demuxing an MPEG-1/MPEG-2 Program Stream.
#[derive(Error, Debug)]
pub enum PsError {
    /// An I/O error occurred on the underlying byte sink or source.
    ///
    /// The start-code scanner's sync budget (see [`crate::constants::MAX_SYNC_SIZE`])
    /// also surfaces here as an `UnexpectedEof`, matching the source behavior of
    /// treating an exhausted sync search as a plain I/O failure rather than a
    /// distinct error kind.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Could not allocate per-stream state at init: the profile's id space is
    /// exhausted (more elementary streams of one kind were requested than the
    /// container can assign distinct stream ids to).
    #[error("cannot allocate state for {requested} streams ({available} id slots available)")]
    NoMemory { requested: usize, available: usize },

    /// The demuxer refuses a PES payload whose MPEG-2 scrambling bits are set.
    #[error("refusing to demux a scrambled (encrypted) PES payload")]
    EncryptedStream,

    /// A caller contract was violated (out-of-range stream index, a codec
    /// type/id combination this mux cannot represent, a degenerate profile).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Program Stream operations.
pub type Result<T> = std::result::Result<T, PsError>;
