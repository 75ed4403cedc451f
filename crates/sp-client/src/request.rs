use std::net::IpAddr;

use bytes::Bytes;
use gnfd_protocol::constants::ADMIN_PREFIX;
use gnfd_protocol::encode_path;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, Url};
use tokio::io::AsyncRead;

use crate::Error;

/// Characters left as-is in query keys and values: `A-Z a-z 0-9 - _ . ~`.
pub(crate) const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Request payload.
pub enum Body {
    Empty,
    /// In-memory payload; can be replayed by the retry decorator.
    Bytes(Bytes),
    /// Streamed payload of a declared length; sent at most once.
    Stream {
        reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
        len: u64,
    },
    /// Serialized XML document; forces `Content-Type: application/xml`.
    Xml(String),
}

impl Body {
    pub fn stream(reader: impl AsyncRead + Send + Sync + Unpin + 'static, len: u64) -> Self {
        Self::Stream {
            reader: Box::new(reader),
            len,
        }
    }

    /// Declared length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::Empty => 0,
            Self::Bytes(b) => b.len() as u64,
            Self::Stream { len, .. } => *len,
            Self::Xml(s) => s.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies a replayable body; streams return `None`.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Bytes(b) => Some(Self::Bytes(b.clone())),
            Self::Xml(s) => Some(Self::Xml(s.clone())),
            Self::Stream { .. } => None,
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::Stream { len, .. } => write!(f, "Stream({len} bytes)"),
            Self::Xml(s) => write!(f, "Xml({} bytes)", s.len()),
        }
    }
}

/// Inclusive byte range `start..=end` for GET requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Validates a `(start, end)` pair. `(0, 0)` means the whole object.
    pub fn new(start: u64, end: u64) -> Result<Option<Self>, Error> {
        if start == 0 && end == 0 {
            return Ok(None);
        }
        if start > end {
            return Err(Error::InvalidArgument(format!(
                "range start {start} is after end {end}"
            )));
        }
        Ok(Some(Self { start, end }))
    }

    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Everything the transport needs to assemble one SP request.
#[derive(Debug)]
pub struct RequestMeta {
    pub bucket: Option<String>,
    pub object: Option<String>,
    /// Extra path appended after the admin prefix or object.
    pub rel_path: Option<String>,
    pub query: Vec<(String, String)>,
    /// Only sent on GET.
    pub range: Option<ByteRange>,
    /// Admin action, sent as the `action` query value.
    pub action: Option<String>,
    pub content_type: Option<String>,
    pub content_md5_b64: Option<String>,
    pub content_sha256_hex: Option<String>,
    pub txn_hash: Option<String>,
    pub body: Body,
}

impl Default for RequestMeta {
    fn default() -> Self {
        Self {
            bucket: None,
            object: None,
            rel_path: None,
            query: Vec::new(),
            range: None,
            action: None,
            content_type: None,
            content_md5_b64: None,
            content_sha256_hex: None,
            txn_hash: None,
            body: Body::Empty,
        }
    }
}

impl RequestMeta {
    /// Copies the metadata when its body can be replayed.
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            bucket: self.bucket.clone(),
            object: self.object.clone(),
            rel_path: self.rel_path.clone(),
            query: self.query.clone(),
            range: self.range,
            action: self.action.clone(),
            content_type: self.content_type.clone(),
            content_md5_b64: self.content_md5_b64.clone(),
            content_sha256_hex: self.content_sha256_hex.clone(),
            txn_hash: self.txn_hash.clone(),
            body: self.body.try_clone()?,
        })
    }

    /// `X-Gnfd-Resource` value: `bucket` or `bucket/object`.
    pub(crate) fn resource(&self) -> Option<String> {
        let bucket = self.bucket.as_deref()?;
        Some(match self.object.as_deref() {
            Some(object) => format!("{bucket}/{object}"),
            None => bucket.to_string(),
        })
    }
}

/// Per-call transport options.
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub method: Method,
    /// Route to the admin API instead of the data API.
    pub admin_api: bool,
}

impl SendOptions {
    pub fn data(method: Method) -> Self {
        Self {
            method,
            admin_api: false,
        }
    }

    pub fn admin(method: Method) -> Self {
        Self {
            method,
            admin_api: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Parsed SP endpoint: scheme plus `host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    scheme: String,
    host: String,
    virtual_host: bool,
}

impl Endpoint {
    /// Accepts `host[:port]` (scheme from `secure`) or a full `http(s)://` URL.
    pub(crate) fn parse(endpoint: &str, secure: bool) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidArgument(format!("endpoint {endpoint:?}: {reason}"));

        let endpoint = endpoint.trim().trim_end_matches('/');
        let (scheme, host) = if endpoint.contains("://") {
            let url = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
            let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
            let host = match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            (url.scheme().to_string(), host)
        } else {
            let scheme = if secure { "https" } else { "http" };
            (scheme.to_string(), endpoint.to_string())
        };

        if !matches!(scheme.as_str(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if host.is_empty() || host.contains('/') {
            return Err(invalid("expected host[:port]"));
        }

        let virtual_host = is_domain_name(&host);
        Ok(Self {
            scheme,
            host,
            virtual_host,
        })
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    /// Builds the request URL. For path-style data requests it also returns
    /// the `Host` header that routes the request to the bucket.
    pub(crate) fn target_url(
        &self,
        meta: &RequestMeta,
        admin_api: bool,
    ) -> Result<(Url, Option<String>), Error> {
        let mut host = self.host.clone();
        let mut host_header = None;
        let mut path = String::new();

        if admin_api {
            path.push_str(ADMIN_PREFIX);
            path.push('/');
        } else {
            if let Some(bucket) = meta.bucket.as_deref() {
                let bucket_host = format!("{bucket}.{}", self.host);
                if self.virtual_host {
                    host = bucket_host;
                } else {
                    host_header = Some(bucket_host);
                }
            }
            path.push('/');
            if let Some(object) = meta.object.as_deref() {
                path.push_str(&encode_path(object));
            }
        }

        if let Some(rel) = meta.rel_path.as_deref() {
            if !path.ends_with('/') && !rel.starts_with('/') {
                path.push('/');
            }
            path.push_str(&encode_path(rel));
        }

        let mut url = format!("{}://{host}{path}", self.scheme);
        let query = encode_query(meta);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        let url = Url::parse(&url)
            .map_err(|e| Error::InvalidArgument(format!("cannot build url {url:?}: {e}")))?;
        Ok((url, host_header))
    }
}

/// Registered domain names get virtual-hosted URLs; IP literals and bare
/// hosts such as `localhost` get path-style URLs.
fn is_domain_name(host: &str) -> bool {
    let name = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    let name = name.trim_start_matches('[').trim_end_matches(']');
    if name.parse::<IpAddr>().is_ok() || host.starts_with('[') {
        return false;
    }
    name.contains('.') && !name.ends_with('.')
}

fn encode_query(meta: &RequestMeta) -> String {
    let action = meta
        .action
        .as_deref()
        .map(|a| ("action", a));
    let pairs = meta
        .query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(action);

    let mut out = Vec::new();
    for (k, v) in pairs {
        let key = utf8_percent_encode(k, QUERY_ESCAPE);
        if v.is_empty() {
            out.push(key.to_string());
        } else {
            out.push(format!("{key}={}", utf8_percent_encode(v, QUERY_ESCAPE)));
        }
    }
    out.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(bucket: &str, object: Option<&str>) -> RequestMeta {
        RequestMeta {
            bucket: Some(bucket.into()),
            object: object.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn range_validation() {
        assert_eq!(ByteRange::new(0, 0).unwrap(), None);
        let r = ByteRange::new(0, 9).unwrap().unwrap();
        assert_eq!(r.header_value(), "bytes=0-9");
        let r = ByteRange::new(5, 5).unwrap().unwrap();
        assert_eq!(r.header_value(), "bytes=5-5");
        assert!(ByteRange::new(9, 3).is_err());
    }

    #[test]
    fn endpoint_parsing() {
        let ep = Endpoint::parse("sp.example.com", true).unwrap();
        assert_eq!(ep.scheme, "https");
        assert!(ep.virtual_host);

        let ep = Endpoint::parse("http://127.0.0.1:9033/", true).unwrap();
        assert_eq!(ep.scheme, "http");
        assert_eq!(ep.host(), "127.0.0.1:9033");
        assert!(!ep.virtual_host);

        let ep = Endpoint::parse("localhost:9033", false).unwrap();
        assert_eq!(ep.scheme, "http");
        assert!(!ep.virtual_host);

        assert!(Endpoint::parse("", false).is_err());
        assert!(Endpoint::parse("ftp://sp.example.com", false).is_err());
        assert!(Endpoint::parse("sp.example.com/path", false).is_err());
    }

    #[test]
    fn virtual_hosted_data_url() {
        let ep = Endpoint::parse("https://sp.example.com", false).unwrap();
        let (url, host) = ep
            .target_url(&meta("data", Some("dir/a b.txt")), false)
            .unwrap();
        assert_eq!(url.as_str(), "https://data.sp.example.com/dir/a%20b.txt");
        assert_eq!(host, None);
    }

    #[test]
    fn path_style_data_url_routes_by_host_header() {
        let ep = Endpoint::parse("http://10.0.0.1:9033", false).unwrap();
        let (url, host) = ep.target_url(&meta("data", Some("obj")), false).unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.1:9033/obj");
        assert_eq!(host.as_deref(), Some("data.10.0.0.1:9033"));
    }

    #[test]
    fn admin_url_keeps_resource_out_of_path() {
        let ep = Endpoint::parse("https://sp.example.com", false).unwrap();
        let mut m = meta("data", Some("obj"));
        m.rel_path = Some("get-approval".into());
        m.action = Some("CreateObject".into());
        let (url, host) = ep.target_url(&m, true).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sp.example.com/greenfield/admin/v1/get-approval?action=CreateObject"
        );
        assert_eq!(host, None);
        assert_eq!(m.resource().as_deref(), Some("data/obj"));
    }

    #[test]
    fn query_encoding() {
        let ep = Endpoint::parse("https://sp.example.com", false).unwrap();
        let mut m = meta("data", None);
        m.query = vec![
            ("prefix".into(), "logs 2024/".into()),
            ("max-keys".into(), "10".into()),
        ];
        let (url, _) = ep.target_url(&m, false).unwrap();
        assert_eq!(
            url.as_str(),
            "https://data.sp.example.com/?prefix=logs%202024%2F&max-keys=10"
        );

        let mut m = meta("data", Some("obj"));
        m.query = vec![("uploadtransaction".into(), String::new())];
        let (url, _) = ep.target_url(&m, false).unwrap();
        assert_eq!(url.query(), Some("uploadtransaction"));
    }

    #[test]
    fn body_cloning() {
        assert!(Body::Bytes(Bytes::from_static(b"abc")).try_clone().is_some());
        assert!(Body::Xml("<a/>".into()).try_clone().is_some());
        let stream = Body::stream(&b"abc"[..], 3);
        assert!(stream.try_clone().is_none());
        assert_eq!(stream.len(), 3);

        let m = RequestMeta {
            body: Body::stream(&b"abc"[..], 3),
            ..Default::default()
        };
        assert!(m.try_clone().is_none());
    }
}
