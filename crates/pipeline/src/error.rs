//! Pipeline error types.

use gnfd_protocol::{ObjectStatus, ProtocolError};
use gnfd_transfer::TransferError;

/// Errors produced by the upload and migration pipelines.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("storage provider: {0}")]
    Sp(#[from] gnfd_sp_client::Error),

    /// Broadcaster-level failure (unreachable node, rejected signature...).
    #[error("chain error: {0}")]
    Chain(String),

    #[error("transaction {tx_hash} failed with code {code}: {log}")]
    TxFailed {
        tx_hash: String,
        code: u32,
        log: String,
    },

    #[error("object not sealed yet (status {status})")]
    NotSealed { status: ObjectStatus },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cancelled")]
    Canceled,
}

impl PipelineError {
    /// True for cancellation raised at any layer.
    pub fn is_canceled(&self) -> bool {
        match self {
            Self::Canceled => true,
            Self::Sp(e) => e.is_canceled(),
            Self::Transfer(TransferError::Canceled) => true,
            _ => false,
        }
    }
}
