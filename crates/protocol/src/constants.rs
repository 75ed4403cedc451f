/// Maximum object size accepted by CreateObject: 5 GiB.
pub const MAX_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default segment size used by the piece-hash engine: 16 MiB.
pub const DEFAULT_SEGMENT_SIZE: usize = 16 * 1024 * 1024;

/// Default number of erasure-coded shards per segment.
pub const DEFAULT_EC_SHARDS: usize = 6;

/// Path prefix of the storage provider admin API.
pub const ADMIN_PREFIX: &str = "/greenfield/admin/v1";

/// Admin API endpoint returning a pre-signature for CreateBucket/CreateObject.
pub const GET_APPROVAL_PATH: &str = "get-approval";

/// Query key marking a PUT as the payload half of a two-phase upload.
pub const UPLOAD_TRANSACTION_QUERY: &str = "uploadtransaction";

/// Scheme prefix of `gnfd://bucket/object` URLs.
pub const GNFD_SCHEME: &str = "gnfd://";

/// Hex SHA-256 of the empty string, sent for requests without a body.
pub const EMPTY_STRING_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub const CONTENT_TYPE_DEFAULT: &str = "application/octet-stream";
pub const CONTENT_TYPE_XML: &str = "application/xml";

// ---------------------------------------------------------------------------
// Header names
// ---------------------------------------------------------------------------

pub const HEADER_DATE: &str = "x-gnfd-date";
pub const HEADER_TXN_HASH: &str = "x-gnfd-txn-hash";
pub const HEADER_RESOURCE: &str = "x-gnfd-resource";
pub const HEADER_PRE_SIGNATURE: &str = "x-gnfd-pre-signature";
pub const HEADER_CONTENT_SHA256: &str = "x-gnfd-content-sha256";
pub const HEADER_REQUEST_ID: &str = "x-gnfd-request-id";

// ---------------------------------------------------------------------------
// Approval actions
// ---------------------------------------------------------------------------

pub const ACTION_CREATE_BUCKET: &str = "CreateBucket";
pub const ACTION_CREATE_OBJECT: &str = "CreateObject";
