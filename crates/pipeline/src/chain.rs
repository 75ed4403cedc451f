//! Chain collaborator seam.
//!
//! Transaction signing and broadcasting live outside this workspace. The
//! pipeline only needs something that accepts messages, returns a
//! transaction hash, and can answer HeadObject.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use gnfd_protocol::{ObjectStatus, Visibility};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Boxed future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PipelineError>> + Send + 'a>>;

/// Default bound on waiting for a transaction receipt.
pub const DEFAULT_TX_WAIT: Duration = Duration::from_secs(20);

/// Chain message creating an object record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateObject {
    pub creator: String,
    pub bucket_name: String,
    pub object_name: String,
    pub payload_size: u64,
    pub visibility: Visibility,
    pub content_type: String,
    /// Primary root first, then one root per shard.
    pub expect_checksums: Vec<Vec<u8>>,
    /// Opaque SP pre-signature.
    pub primary_sp_approval: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expect_secondary_sp_addresses: Vec<String>,
}

/// Chain message creating a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateBucket {
    pub creator: String,
    pub bucket_name: String,
    pub visibility: Visibility,
    pub primary_sp_address: String,
    pub primary_sp_approval: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainMsg {
    CreateObject(MsgCreateObject),
    CreateBucket(MsgCreateBucket),
}

/// Broadcast options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOptions {
    /// Wait for the receipt after broadcasting.
    pub wait: bool,
    pub wait_timeout: Duration,
    pub memo: String,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            wait: true,
            wait_timeout: DEFAULT_TX_WAIT,
            memo: String::new(),
        }
    }
}

/// Broadcast result or receipt. `code == 0` means accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    pub tx_hash: String,
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
}

/// On-chain object record as returned by HeadObject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub owner: String,
    pub bucket_name: String,
    pub object_name: String,
    pub status: ObjectStatus,
    pub payload_size: u64,
    pub content_type: String,
    pub visibility: Visibility,
    /// Primary root first, then one root per shard; callers verifying
    /// downloads compare against these.
    pub checksums: Vec<Vec<u8>>,
}

/// Chain broadcaster and query client.
pub trait ChainClient: Send + Sync {
    /// Signs and broadcasts `msgs` in one transaction.
    fn broadcast<'a>(&'a self, msgs: Vec<ChainMsg>, opts: &'a TxOptions) -> BoxFuture<'a, TxResponse>;

    /// Resolves once `tx_hash` is included in a block.
    fn wait_for_tx<'a>(&'a self, tx_hash: &'a str) -> BoxFuture<'a, TxResponse>;

    fn head_object<'a>(&'a self, bucket: &'a str, object: &'a str) -> BoxFuture<'a, ObjectMeta>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_with_type_tag() {
        let msg = ChainMsg::CreateBucket(MsgCreateBucket {
            creator: "0xabc".into(),
            bucket_name: "data".into(),
            visibility: Visibility::Private,
            primary_sp_address: "0xsp".into(),
            primary_sp_approval: "sig".into(),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "create_bucket");
        assert_eq!(json["visibility"], "private");
        let back: ChainMsg = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn tx_options_default_waits() {
        let opts = TxOptions::default();
        assert!(opts.wait);
        assert_eq!(opts.wait_timeout, Duration::from_secs(20));
    }
}
