//! Two-phase object upload: CreateObject on chain, then PutObject to the SP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gnfd_protocol::constants::{DEFAULT_EC_SHARDS, DEFAULT_SEGMENT_SIZE, MAX_OBJECT_SIZE};
use gnfd_protocol::{ObjectStatus, Visibility, check_bucket, check_object};
use gnfd_sp_client::{AuthInfo, Body, Client, PutObjectOptions, UploadResult};
use gnfd_transfer::{PieceHashRoots, TransferError, compute_file_piece_hashes, compute_piece_hashes_cancellable};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::{ChainClient, ChainMsg, MsgCreateBucket, MsgCreateObject, TxOptions, TxResponse};
use crate::error::PipelineError;

/// Default pause between HeadObject checks while waiting for sealing.
pub const DEFAULT_SEAL_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on waiting for sealing after PutObject.
pub const DEFAULT_SEAL_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Configuration and options
// ---------------------------------------------------------------------------

/// Pipeline tuning shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub segment_size: usize,
    pub ec_shards: usize,
    pub seal_poll_interval: Duration,
    pub seal_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            ec_shards: DEFAULT_EC_SHARDS,
            seal_poll_interval: DEFAULT_SEAL_POLL_INTERVAL,
            seal_timeout: DEFAULT_SEAL_TIMEOUT,
        }
    }
}

/// Options for CreateObject and the uploads built on it.
#[derive(Debug, Clone, Default)]
pub struct CreateObjectOptions {
    pub visibility: Visibility,
    /// Defaults to `application/octet-stream`.
    pub content_type: Option<String>,
    pub secondary_sps: Vec<String>,
    pub tx: TxOptions,
}

/// Object payload, hashed for CreateObject and sent for PutObject.
#[derive(Debug, Clone)]
pub enum ObjectSource {
    File(PathBuf),
    Bytes(Bytes),
}

impl ObjectSource {
    async fn size(&self) -> Result<u64, PipelineError> {
        Ok(match self {
            Self::File(path) => tokio::fs::metadata(path).await?.len(),
            Self::Bytes(bytes) => bytes.len() as u64,
        })
    }

    async fn piece_hashes(
        &self,
        config: &PipelineConfig,
        cancel: &CancellationToken,
    ) -> Result<PieceHashRoots, TransferError> {
        match self {
            Self::File(path) => {
                compute_file_piece_hashes(
                    path.clone(),
                    config.segment_size,
                    config.ec_shards,
                    cancel.clone(),
                )
                .await
            }
            Self::Bytes(bytes) => compute_piece_hashes_cancellable(
                bytes.as_ref(),
                config.segment_size,
                config.ec_shards,
                cancel,
            ),
        }
    }

    async fn body(&self) -> Result<Body, PipelineError> {
        Ok(match self {
            Self::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                let len = file.metadata().await?.len();
                Body::stream(file, len)
            }
            Self::Bytes(bytes) => Body::Bytes(bytes.clone()),
        })
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of a broadcast CreateObject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedObject {
    pub tx_hash: String,
    pub roots: PieceHashRoots,
}

/// Sealing state observed after PutObject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealStatus {
    Sealed,
    /// The wait ran out; carries the last status HeadObject reported.
    Pending(ObjectStatus),
}

/// Result of PutObject plus the sealing wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutcome {
    pub upload: UploadResult,
    pub seal: SealStatus,
}

impl PutObjectOutcome {
    pub fn is_sealed(&self) -> bool {
        self.seal == SealStatus::Sealed
    }

    /// Turns a pending seal into [`PipelineError::NotSealed`].
    pub fn require_sealed(self) -> Result<UploadResult, PipelineError> {
        match self.seal {
            SealStatus::Sealed => Ok(self.upload),
            SealStatus::Pending(status) => Err(PipelineError::NotSealed { status }),
        }
    }
}

/// Result of a full create-then-put upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUpload {
    pub tx_hash: String,
    pub object_size: u64,
    pub outcome: PutObjectOutcome,
}

// ---------------------------------------------------------------------------
// ObjectPipeline
// ---------------------------------------------------------------------------

/// Drives CreateObject, PutObject and sealing against one SP and one chain.
#[derive(Clone)]
pub struct ObjectPipeline {
    sp: Client,
    chain: Arc<dyn ChainClient>,
    config: PipelineConfig,
}

impl ObjectPipeline {
    pub fn new(sp: Client, chain: Arc<dyn ChainClient>, config: PipelineConfig) -> Self {
        Self { sp, chain, config }
    }

    pub fn sp(&self) -> &Client {
        &self.sp
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Hashes `source`, obtains SP approval and broadcasts CreateObject.
    ///
    /// Nothing is broadcast unless the names validate, the payload is
    /// non-empty and at most 5 GiB, and the full root set is computed.
    pub async fn create_object(
        &self,
        bucket: &str,
        object: &str,
        source: &ObjectSource,
        opts: &CreateObjectOptions,
        cancel: &CancellationToken,
    ) -> Result<CreatedObject, PipelineError> {
        check_bucket(bucket)?;
        check_object(object)?;
        check_cancelled(cancel)?;
        let owner = self.owner()?;

        let size = source.size().await?;
        if size > MAX_OBJECT_SIZE {
            return Err(TransferError::ObjectTooLarge {
                size,
                max: MAX_OBJECT_SIZE,
            }
            .into());
        }

        let roots = source.piece_hashes(&self.config, cancel).await?;
        debug!(
            bucket,
            object,
            size = roots.object_size,
            primary = %roots.primary_root_hex(),
            "piece hashes ready"
        );

        let approval = self
            .sp
            .get_approval(bucket, Some(object), &AuthInfo::V1, cancel)
            .await?;

        let msg = ChainMsg::CreateObject(MsgCreateObject {
            creator: owner,
            bucket_name: bucket.to_string(),
            object_name: object.to_string(),
            payload_size: roots.object_size,
            visibility: opts.visibility,
            content_type: content_type(opts),
            expect_checksums: roots.checksums(),
            primary_sp_approval: approval,
            expect_secondary_sp_addresses: opts.secondary_sps.clone(),
        });
        let tx = self.broadcast(msg, &opts.tx, cancel).await?;

        info!(bucket, object, tx_hash = %tx.tx_hash, "object created on chain");
        Ok(CreatedObject {
            tx_hash: tx.tx_hash,
            roots,
        })
    }

    /// Sends the payload for an object created by `txn_hash`, then waits for
    /// sealing.
    ///
    /// Running out of seal wait is not an error: the outcome reports
    /// [`SealStatus::Pending`].
    pub async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        source: &ObjectSource,
        opts: &PutObjectOptions,
        cancel: &CancellationToken,
    ) -> Result<PutObjectOutcome, PipelineError> {
        check_bucket(bucket)?;
        check_object(object)?;
        check_cancelled(cancel)?;
        let body = source.body().await?;
        let upload = self.sp.put_object(bucket, object, body, opts, cancel).await?;
        let seal = self.wait_for_seal(bucket, object, cancel).await?;
        Ok(PutObjectOutcome { upload, seal })
    }

    /// CreateObject followed by PutObject with the same hashes.
    pub async fn upload(
        &self,
        bucket: &str,
        object: &str,
        source: &ObjectSource,
        opts: &CreateObjectOptions,
        cancel: &CancellationToken,
    ) -> Result<ObjectUpload, PipelineError> {
        let created = self.create_object(bucket, object, source, opts, cancel).await?;
        let put = PutObjectOptions {
            txn_hash: Some(created.tx_hash.clone()),
            content_type: opts.content_type.clone(),
            content_sha256_hex: Some(created.roots.content_sha256_hex()),
        };
        let outcome = self.put_object(bucket, object, source, &put, cancel).await?;
        Ok(ObjectUpload {
            tx_hash: created.tx_hash,
            object_size: created.roots.object_size,
            outcome,
        })
    }

    /// Polls HeadObject until the object is sealed or the seal wait runs out.
    pub async fn wait_for_seal(
        &self,
        bucket: &str,
        object: &str,
        cancel: &CancellationToken,
    ) -> Result<SealStatus, PipelineError> {
        let deadline = tokio::time::Instant::now() + self.config.seal_timeout;
        loop {
            let meta = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Canceled),
                m = self.chain.head_object(bucket, object) => m?,
            };
            if meta.status.is_sealed() {
                info!(bucket, object, "object sealed");
                return Ok(SealStatus::Sealed);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!(bucket, object, status = %meta.status, "object not sealed within wait");
                return Ok(SealStatus::Pending(meta.status));
            }
            debug!(bucket, object, status = %meta.status, "waiting for seal");

            let pause = self.config.seal_poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Canceled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Obtains SP approval and broadcasts CreateBucket, returning the
    /// transaction hash.
    pub async fn create_bucket(
        &self,
        bucket: &str,
        visibility: Visibility,
        primary_sp_address: &str,
        tx: &TxOptions,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        check_bucket(bucket)?;
        check_cancelled(cancel)?;
        let owner = self.owner()?;
        let approval = self
            .sp
            .get_approval(bucket, None, &AuthInfo::V1, cancel)
            .await?;

        let msg = ChainMsg::CreateBucket(MsgCreateBucket {
            creator: owner,
            bucket_name: bucket.to_string(),
            visibility,
            primary_sp_address: primary_sp_address.to_string(),
            primary_sp_approval: approval,
        });
        let resp = self.broadcast(msg, tx, cancel).await?;
        info!(bucket, tx_hash = %resp.tx_hash, "bucket created on chain");
        Ok(resp.tx_hash)
    }

    async fn broadcast(
        &self,
        msg: ChainMsg,
        opts: &TxOptions,
        cancel: &CancellationToken,
    ) -> Result<TxResponse, PipelineError> {
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Canceled),
            r = self.chain.broadcast(vec![msg], opts) => r?,
        };
        check_tx(&resp)?;
        if !opts.wait {
            return Ok(resp);
        }

        let wait = tokio::time::timeout(opts.wait_timeout, self.chain.wait_for_tx(&resp.tx_hash));
        let receipt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Canceled),
            r = wait => r.map_err(|_| {
                PipelineError::Chain(format!(
                    "transaction {} not confirmed within {:?}",
                    resp.tx_hash, opts.wait_timeout
                ))
            })??,
        };
        check_tx(&receipt)?;
        Ok(resp)
    }

    fn owner(&self) -> Result<String, PipelineError> {
        self.sp
            .address()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::InvalidArgument("no signing account configured".into()))
    }
}

fn check_tx(resp: &TxResponse) -> Result<(), PipelineError> {
    if resp.code == 0 {
        return Ok(());
    }
    Err(PipelineError::TxFailed {
        tx_hash: resp.tx_hash.clone(),
        code: resp.code,
        log: resp.raw_log.clone(),
    })
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Canceled)
    } else {
        Ok(())
    }
}

fn content_type(opts: &CreateObjectOptions) -> String {
    opts.content_type
        .clone()
        .unwrap_or_else(|| gnfd_protocol::constants::CONTENT_TYPE_DEFAULT.to_string())
}
