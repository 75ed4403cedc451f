//! Wire constants, naming rules and shared types for talking to Greenfield
//! storage providers.
//!
//! Every outbound request and every piece-hash computation agrees on the
//! `(bucket, object)` key through the validators in [`names`].

pub mod constants;
pub mod grn;
pub mod names;
pub mod types;

pub use grn::Grn;
pub use names::{check_bucket, check_object, encode_path, parse_bucket, parse_bucket_object};
pub use types::{
    ErrorBody, ListObjectsResult, ObjectEntry, ObjectInfo, ObjectStatus, Visibility,
};

/// Errors produced while validating names, URLs and protocol values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid bucket name {name:?}: {reason}")]
    InvalidBucketName { name: String, reason: String },

    #[error("invalid object name: {0}")]
    InvalidObjectName(String),

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid resource name {grn:?}: {reason}")]
    InvalidGrn { grn: String, reason: String },

    #[error("invalid visibility {0:?}, expected public-read, private or inherit")]
    InvalidVisibility(String),

    #[error("unknown object status {0:?}")]
    UnknownObjectStatus(String),
}
