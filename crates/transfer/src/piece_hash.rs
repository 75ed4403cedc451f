use std::io::Read;
use std::path::{Path, PathBuf};

use gnfd_protocol::constants::MAX_OBJECT_SIZE;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::TransferError;

const READ_BUF_SIZE: usize = 64 * 1024;
const ZEROS: [u8; 4096] = [0u8; 4096];

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// PieceHashRoots
// ---------------------------------------------------------------------------

/// The two-level hash root set embedded in a CreateObject message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceHashRoots {
    /// SHA-256 over the concatenated segment hashes.
    pub primary_root: [u8; 32],
    /// One running SHA-256 per erasure shard index.
    pub shard_roots: Vec<[u8; 32]>,
    pub object_size: u64,
    pub segment_count: u64,
    /// SHA-256 of the whole payload, sent as `X-Gnfd-Content-Sha256`.
    pub content_sha256: [u8; 32],
}

impl PieceHashRoots {
    /// Checksums in chain order: primary root first, then each shard root.
    pub fn checksums(&self) -> Vec<Vec<u8>> {
        std::iter::once(self.primary_root.to_vec())
            .chain(self.shard_roots.iter().map(|r| r.to_vec()))
            .collect()
    }

    pub fn primary_root_hex(&self) -> String {
        hex::encode(self.primary_root)
    }

    pub fn shard_roots_hex(&self) -> Vec<String> {
        self.shard_roots.iter().map(hex::encode).collect()
    }

    pub fn content_sha256_hex(&self) -> String {
        hex::encode(self.content_sha256)
    }
}

// ---------------------------------------------------------------------------
// PieceHasher
// ---------------------------------------------------------------------------

/// Streaming piece-hash engine.
///
/// Input is cut into `segment_size` segments; the last one may be short.
/// Each segment is split into `ec_shards` pieces of
/// `ceil(segment_len / ec_shards)` bytes. Piece `i` takes the bytes at
/// `[i * piece_len, (i + 1) * piece_len)` and is zero-padded to `piece_len`
/// when the segment runs out, so every shard receives the same number of
/// bytes per segment. Piece `i` of every segment feeds shard hasher `i`.
pub struct PieceHasher {
    segment_size: usize,
    ec_shards: usize,
    buf: Vec<u8>,
    primary: Sha256,
    shards: Vec<Sha256>,
    content: Sha256,
    object_size: u64,
    segment_count: u64,
}

impl PieceHasher {
    pub fn new(segment_size: usize, ec_shards: usize) -> Result<Self, TransferError> {
        if segment_size == 0 {
            return Err(TransferError::InvalidParams(
                "segment size must be positive".into(),
            ));
        }
        if ec_shards == 0 {
            return Err(TransferError::InvalidParams(
                "shard count must be positive".into(),
            ));
        }
        Ok(Self {
            segment_size,
            ec_shards,
            buf: Vec::with_capacity(segment_size.min(READ_BUF_SIZE * 16)),
            primary: Sha256::new(),
            shards: (0..ec_shards).map(|_| Sha256::new()).collect(),
            content: Sha256::new(),
            object_size: 0,
            segment_count: 0,
        })
    }

    /// Feeds more payload bytes.
    pub fn update(&mut self, mut data: &[u8]) -> Result<(), TransferError> {
        let size = self.object_size + data.len() as u64;
        if size > MAX_OBJECT_SIZE {
            return Err(TransferError::ObjectTooLarge {
                size,
                max: MAX_OBJECT_SIZE,
            });
        }
        self.object_size = size;
        self.content.update(data);

        while !data.is_empty() {
            let take = (self.segment_size - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == self.segment_size {
                self.flush_segment();
            }
        }
        Ok(())
    }

    /// Bytes consumed so far.
    pub fn object_size(&self) -> u64 {
        self.object_size
    }

    /// Hashes the trailing short segment and returns the root set.
    pub fn finish(mut self) -> Result<PieceHashRoots, TransferError> {
        if !self.buf.is_empty() {
            self.flush_segment();
        }
        if self.object_size == 0 {
            return Err(TransferError::EmptyObject);
        }

        Ok(PieceHashRoots {
            primary_root: self.primary.finalize().into(),
            shard_roots: self
                .shards
                .into_iter()
                .map(|h| h.finalize().into())
                .collect(),
            object_size: self.object_size,
            segment_count: self.segment_count,
            content_sha256: self.content.finalize().into(),
        })
    }

    fn flush_segment(&mut self) {
        let segment = &self.buf;
        let segment_hash = Sha256::digest(segment);
        self.primary.update(segment_hash);

        let len = segment.len();
        let piece_len = len.div_ceil(self.ec_shards);
        for (i, shard) in self.shards.iter_mut().enumerate() {
            let start = (i * piece_len).min(len);
            let end = (start + piece_len).min(len);
            shard.update(&segment[start..end]);

            let mut pad = piece_len - (end - start);
            while pad > 0 {
                let n = pad.min(ZEROS.len());
                shard.update(&ZEROS[..n]);
                pad -= n;
            }
        }

        self.segment_count += 1;
        self.buf.clear();
    }
}

// ---------------------------------------------------------------------------
// Reader entry points
// ---------------------------------------------------------------------------

/// Computes the piece-hash root set of everything `reader` yields.
///
/// Fails on an empty reader, on payloads above 5 GiB and on any read error.
pub fn compute_piece_hashes<R: Read>(
    reader: R,
    segment_size: usize,
    ec_shards: usize,
) -> Result<PieceHashRoots, TransferError> {
    compute_piece_hashes_cancellable(reader, segment_size, ec_shards, &CancellationToken::new())
}

/// Like [`compute_piece_hashes`], checking `cancel` between reads.
pub fn compute_piece_hashes_cancellable<R: Read>(
    mut reader: R,
    segment_size: usize,
    ec_shards: usize,
    cancel: &CancellationToken,
) -> Result<PieceHashRoots, TransferError> {
    let mut hasher = PieceHasher::new(segment_size, ec_shards)?;
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Canceled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n])?;
    }
    hasher.finish()
}

/// Hashes a local file on the blocking pool.
pub async fn compute_file_piece_hashes(
    path: PathBuf,
    segment_size: usize,
    ec_shards: usize,
    cancel: CancellationToken,
) -> Result<PieceHashRoots, TransferError> {
    let meta = tokio::fs::metadata(&path).await?;
    if meta.len() > MAX_OBJECT_SIZE {
        return Err(TransferError::ObjectTooLarge {
            size: meta.len(),
            max: MAX_OBJECT_SIZE,
        });
    }

    let roots = tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        compute_piece_hashes_cancellable(file, segment_size, ec_shards, &cancel)
    })
    .await
    .map_err(|e| TransferError::Task(e.to_string()))??;

    debug!(
        size = roots.object_size,
        segments = roots.segment_count,
        primary = %roots.primary_root_hex(),
        "computed piece hashes"
    );
    Ok(roots)
}
