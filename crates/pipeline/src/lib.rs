//! Greenfield object pipelines.
//!
//! This crate holds the **orchestration** on top of the SP client: the
//! two-phase upload (CreateObject on chain, PutObject to the SP, then a
//! bounded wait for sealing) and the S3 → Greenfield migration. The chain
//! and the S3 source are collaborators behind [`ChainClient`] and
//! [`S3Source`], so the pipelines run against mocks in tests.
//!
//! # Upload
//!
//! 1. **Validate** bucket and object names, size ≤ 5 GiB
//! 2. **Hash** the payload into its piece-hash root set
//! 3. **Approve** with the SP (`get-approval`)
//! 4. **Broadcast** CreateObject and wait for the receipt
//! 5. **Put** the payload with the transaction hash
//! 6. **Seal** wait via HeadObject

pub mod chain;
pub mod error;
pub mod migrate;
pub mod task;
pub mod upload;

#[cfg(test)]
mod test_util;

pub use chain::{
    BoxFuture, ChainClient, ChainMsg, MsgCreateBucket, MsgCreateObject, ObjectMeta, TxOptions,
    TxResponse,
};
pub use error::PipelineError;
pub use migrate::{
    MigrationEvent, MigrationReport, MigrationRequest, Migrator, ObjectOutcome, ObjectReport,
    S3Object, S3Source, TaskTarget,
};
pub use task::{ObjectState, ObjectTaskStatus, TaskState, TaskStatus};
pub use upload::{
    CreateObjectOptions, CreatedObject, ObjectPipeline, ObjectSource, ObjectUpload, PipelineConfig,
    PutObjectOutcome, SealStatus,
};
