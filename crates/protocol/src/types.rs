use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Read visibility of a bucket or object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    PublicRead,
    Private,
    /// Objects inherit the visibility of their bucket.
    #[default]
    Inherit,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PublicRead => "public-read",
            Self::Private => "private",
            Self::Inherit => "inherit",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public-read" => Ok(Self::PublicRead),
            "private" => Ok(Self::Private),
            "inherit" => Ok(Self::Inherit),
            other => Err(ProtocolError::InvalidVisibility(other.to_string())),
        }
    }
}

/// On-chain object status as reported by HeadObject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectStatus {
    #[serde(rename = "OBJECT_STATUS_CREATED")]
    Created,
    #[serde(rename = "OBJECT_STATUS_UPLOADING")]
    Uploading,
    #[serde(rename = "OBJECT_STATUS_SEALED")]
    Sealed,
    #[serde(rename = "OBJECT_STATUS_DISCONTINUED")]
    Discontinued,
}

impl ObjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "OBJECT_STATUS_CREATED",
            Self::Uploading => "OBJECT_STATUS_UPLOADING",
            Self::Sealed => "OBJECT_STATUS_SEALED",
            Self::Discontinued => "OBJECT_STATUS_DISCONTINUED",
        }
    }

    pub fn is_sealed(self) -> bool {
        self == Self::Sealed
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OBJECT_STATUS_CREATED" => Ok(Self::Created),
            "OBJECT_STATUS_UPLOADING" => Ok(Self::Uploading),
            "OBJECT_STATUS_SEALED" => Ok(Self::Sealed),
            "OBJECT_STATUS_DISCONTINUED" => Ok(Self::Discontinued),
            other => Err(ProtocolError::UnknownObjectStatus(other.to_string())),
        }
    }
}

/// Object metadata parsed from GetObject response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub object_name: String,
    pub etag: String,
    pub content_type: String,
    /// Bytes carried by this response (`Content-Length`), which is the
    /// ranged length for partial reads. The object size of record comes
    /// from HeadObject.
    pub size: Option<u64>,
}

// ---------------------------------------------------------------------------
// XML bodies
// ---------------------------------------------------------------------------

/// One entry of a ListObjects response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "ETag", default)]
    pub etag: String,
    #[serde(rename = "ContentType", default)]
    pub content_type: String,
    #[serde(rename = "LastModified", default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// XML body returned by `GET /?prefix=..&max-keys=..`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "ListBucketResult")]
pub struct ListObjectsResult {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Prefix", default)]
    pub prefix: String,
    #[serde(rename = "MaxKeys", default)]
    pub max_keys: u64,
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "Contents", default)]
    pub objects: Vec<ObjectEntry>,
}

impl ListObjectsResult {
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }
}

/// Structured error body returned by storage providers:
/// `<Error><Code/><Message/><RequestId/><Resource/></Error>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "Error")]
pub struct ErrorBody {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "RequestId", alias = "RequestID", default)]
    pub request_id: String,
    #[serde(rename = "Resource", default)]
    pub resource: String,
}

impl ErrorBody {
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }
}
