use std::path::Path;

use bytes::{Bytes, BytesMut};
use gnfd_protocol::constants::UPLOAD_TRANSACTION_QUERY;
use gnfd_protocol::{ListObjectsResult, ObjectInfo, check_bucket, check_object};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderMap};
use reqwest::{Method, Response};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::request::{Body, ByteRange, RequestMeta, SendOptions};
use crate::signer::AuthInfo;
use crate::{Client, Error};

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// Options for [`Client::put_object`].
#[derive(Debug, Clone, Default)]
pub struct PutObjectOptions {
    /// Hash of the CreateObject transaction this payload belongs to.
    pub txn_hash: Option<String>,
    pub content_type: Option<String>,
    /// Whole-object SHA-256, the same value used in the chain message.
    pub content_sha256_hex: Option<String>,
}

/// What the SP answered to a successful PutObject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub bucket: String,
    pub object: String,
    pub etag: String,
}

/// Options for [`Client::get_object`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetObjectOptions {
    /// Inclusive `(start, end)`; `(0, 0)` reads the whole object.
    pub range: Option<(u64, u64)>,
}

impl GetObjectOptions {
    pub fn range(start: u64, end: u64) -> Self {
        Self {
            range: Some((start, end)),
        }
    }
}

// ---------------------------------------------------------------------------
// Download body
// ---------------------------------------------------------------------------

/// Streaming body of a GetObject response.
///
/// Dropping it closes the underlying connection.
#[derive(Debug)]
pub struct ObjectBody {
    resp: Response,
}

impl ObjectBody {
    /// Next chunk of the payload, or `None` at end of body.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        Ok(self.resp.chunk().await?)
    }

    /// Buffers the whole remaining body.
    pub async fn bytes(mut self, cancel: &CancellationToken) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Canceled),
                c = self.next_chunk() => c?,
            };
            match chunk {
                Some(chunk) => buf.extend_from_slice(&chunk),
                None => return Ok(buf.freeze()),
            }
        }
    }

    /// Streams the remaining body into `writer`, returning bytes written.
    pub async fn copy_to<W>(mut self, writer: &mut W, cancel: &CancellationToken) -> Result<u64, Error>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Canceled),
                c = self.next_chunk() => c?,
            };
            let Some(chunk) = chunk else {
                break;
            };
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Object operations
// ---------------------------------------------------------------------------

impl Client {
    /// Uploads the payload of an object created on chain by `txn_hash`.
    ///
    /// SP refusals come back as [`Error::UploadRejected`]. A streamed body
    /// is sent once even when retries are configured.
    pub async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        body: Body,
        opts: &PutObjectOptions,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, Error> {
        check_bucket(bucket)?;
        check_object(object)?;
        let txn_hash = opts
            .txn_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "put {bucket}/{object}: transaction hash is required"
                ))
            })?;

        let size = body.len();
        let meta = RequestMeta {
            bucket: Some(bucket.to_string()),
            object: Some(object.to_string()),
            query: vec![(UPLOAD_TRANSACTION_QUERY.to_string(), String::new())],
            content_type: opts.content_type.clone(),
            content_sha256_hex: opts.content_sha256_hex.clone(),
            txn_hash: Some(txn_hash.to_string()),
            body,
            ..Default::default()
        };

        debug!(bucket, object, size, txn_hash, "putting object payload");
        let resp = self
            .send_with_retry(meta, &SendOptions::data(Method::PUT), &AuthInfo::V1, cancel)
            .await
            .map_err(|e| match e {
                Error::Response(r) | Error::NotFound(r) => Error::UploadRejected(r),
                other => other,
            })?;

        let etag = header_string(resp.headers(), ETAG.as_str());
        info!(bucket, object, size, %etag, "object payload uploaded");
        Ok(UploadResult {
            bucket: bucket.to_string(),
            object: object.to_string(),
            etag,
        })
    }

    /// Opens a download of `bucket/object`, optionally ranged.
    pub async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        opts: &GetObjectOptions,
        cancel: &CancellationToken,
    ) -> Result<(ObjectBody, ObjectInfo), Error> {
        check_bucket(bucket)?;
        check_object(object)?;
        let range = match opts.range {
            Some((start, end)) => ByteRange::new(start, end)?,
            None => None,
        };

        let meta = RequestMeta {
            bucket: Some(bucket.to_string()),
            object: Some(object.to_string()),
            range,
            ..Default::default()
        };
        let resp = self
            .send_with_retry(meta, &SendOptions::data(Method::GET), &AuthInfo::V1, cancel)
            .await?;

        let info = object_info(object, resp.headers());
        debug!(bucket, object, ?range, size = ?info.size, "object download opened");
        Ok((ObjectBody { resp }, info))
    }

    /// Downloads `bucket/object` into `path`, returning bytes written.
    ///
    /// The file is opened create+append and refused when `path` is a
    /// directory.
    pub async fn fget_object(
        &self,
        bucket: &str,
        object: &str,
        path: &Path,
        opts: &GetObjectOptions,
        cancel: &CancellationToken,
    ) -> Result<(u64, ObjectInfo), Error> {
        if let Ok(meta) = tokio::fs::metadata(path).await
            && meta.is_dir()
        {
            return Err(Error::InvalidArgument(format!(
                "{} is a directory",
                path.display()
            )));
        }

        let (body, info) = self.get_object(bucket, object, opts, cancel).await?;

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).append(true).write(true);
        #[cfg(unix)]
        options.mode(0o660);
        let mut file = options.open(path).await?;

        let written = body.copy_to(&mut file, cancel).await?;
        info!(bucket, object, path = %path.display(), written, "object downloaded");
        Ok((written, info))
    }

    /// Lists objects in `bucket`, optionally filtered by `prefix`.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_keys: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<ListObjectsResult, Error> {
        check_bucket(bucket)?;
        let mut query = Vec::new();
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            query.push(("prefix".to_string(), prefix.to_string()));
        }
        if let Some(max_keys) = max_keys {
            query.push(("max-keys".to_string(), max_keys.to_string()));
        }

        let meta = RequestMeta {
            bucket: Some(bucket.to_string()),
            query,
            ..Default::default()
        };
        let resp = self
            .send_with_retry(meta, &SendOptions::data(Method::GET), &AuthInfo::V1, cancel)
            .await?;

        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Canceled),
            t = resp.text() => t?,
        };
        let result = ListObjectsResult::from_xml(&text)?;
        debug!(bucket, count = result.objects.len(), "listed objects");
        Ok(result)
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().trim_matches('"').to_string())
        .unwrap_or_default()
}

fn object_info(object: &str, headers: &HeaderMap) -> ObjectInfo {
    ObjectInfo {
        object_name: object.to_string(),
        etag: header_string(headers, ETAG.as_str()),
        content_type: header_string(headers, CONTENT_TYPE.as_str()),
        size: headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok()),
    }
}
