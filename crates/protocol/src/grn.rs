use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;
use crate::names::{check_bucket, check_object};

const GRN_PREFIX: &str = "grn:";

/// A Greenfield resource name.
///
/// - `grn:b::<bucket>`
/// - `grn:o::<bucket>/<object>` (the object may be `*` for every object)
/// - `grn:g:<owner>:<group>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Grn {
    Bucket { bucket: String },
    Object { bucket: String, object: String },
    Group { owner: String, group: String },
}

impl Grn {
    /// Parses a GRN string, validating bucket and object names.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let invalid = |reason: &str| ProtocolError::InvalidGrn {
            grn: s.to_string(),
            reason: reason.to_string(),
        };

        let rest = s
            .strip_prefix(GRN_PREFIX)
            .ok_or_else(|| invalid("missing grn: prefix"))?;
        let mut parts = rest.splitn(3, ':');
        let kind = parts.next().unwrap_or_default();
        let owner = parts.next().ok_or_else(|| invalid("missing owner field"))?;
        let name = parts.next().ok_or_else(|| invalid("missing resource name"))?;

        match kind {
            "b" => {
                check_bucket(name)?;
                Ok(Self::Bucket {
                    bucket: name.to_string(),
                })
            }
            "o" => {
                let (bucket, object) = name
                    .split_once('/')
                    .ok_or_else(|| invalid("object resource must be bucket/object"))?;
                check_bucket(bucket)?;
                check_object(object)?;
                Ok(Self::Object {
                    bucket: bucket.to_string(),
                    object: object.to_string(),
                })
            }
            "g" => {
                if owner.is_empty() {
                    return Err(invalid("group resource requires an owner"));
                }
                if name.is_empty() {
                    return Err(invalid("group name is empty"));
                }
                Ok(Self::Group {
                    owner: owner.to_string(),
                    group: name.to_string(),
                })
            }
            _ => Err(invalid("resource type must be b, o or g")),
        }
    }

    /// Bucket the resource lives in, if any.
    pub fn bucket(&self) -> Option<&str> {
        match self {
            Self::Bucket { bucket } | Self::Object { bucket, .. } => Some(bucket),
            Self::Group { .. } => None,
        }
    }
}

impl FromStr for Grn {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Grn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bucket { bucket } => write!(f, "grn:b::{bucket}"),
            Self::Object { bucket, object } => write!(f, "grn:o::{bucket}/{object}"),
            Self::Group { owner, group } => write!(f, "grn:g:{owner}:{group}"),
        }
    }
}
