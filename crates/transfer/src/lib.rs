//! Piece-hash computation and local staging helpers for object transfers.
//!
//! The piece-hash root set binds the on-chain CreateObject message to the
//! payload later pushed to a storage provider, so both sides must derive it
//! from exactly the same byte layout. See [`PieceHasher`] for the layout.

mod piece_hash;
mod progress;
mod validation;

pub use piece_hash::{
    PieceHashRoots, PieceHasher, calculate_file_checksum, checksum_bytes, compute_file_piece_hashes,
    compute_piece_hashes, compute_piece_hashes_cancellable,
};
pub use progress::SpeedCalculator;
pub use validation::staging_file_name;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object is empty")]
    EmptyObject,

    #[error("object size {size} exceeds the maximum of {max} bytes")]
    ObjectTooLarge { size: u64, max: u64 },

    #[error("invalid piece-hash parameters: {0}")]
    InvalidParams(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("operation canceled")]
    Canceled,

    #[error("task join error: {0}")]
    Task(String),
}
