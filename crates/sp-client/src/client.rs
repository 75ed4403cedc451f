use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{SecondsFormat, Utc};
use gnfd_protocol::ErrorBody;
use gnfd_protocol::constants::{
    CONTENT_TYPE_DEFAULT, CONTENT_TYPE_XML, EMPTY_STRING_SHA256, HEADER_CONTENT_SHA256,
    HEADER_DATE, HEADER_REQUEST_ID, HEADER_RESOURCE, HEADER_TXN_HASH,
};
use md5::{Digest, Md5};
use percent_encoding::percent_decode_str;
use reqwest::header::{
    CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderMap, HeaderName, HeaderValue, RANGE, USER_AGENT,
};
use reqwest::{Method, Response, StatusCode, Url};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::request::{Body, Endpoint, RequestMeta, SendOptions};
use crate::retry::RetryOptions;
use crate::signer::{self, AuthInfo};
use crate::{Account, ErrResponse, Error};

/// `Content-MD5` header (not provided as a constant by `http` 1.x).
const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Immutable client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host[:port]` or a full `http(s)://host[:port]` URL.
    pub endpoint: String,
    /// Scheme for endpoints given without one.
    pub secure: bool,
    pub timeout: Duration,
    /// Overrides the default `Greenfield (<os>; <arch>) ...` product string.
    pub user_agent: Option<String>,
    pub retry: RetryOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            secure: true,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
            retry: RetryOptions::default(),
        }
    }
}

/// Builder yielding an immutable [`Client`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    account: Option<Account>,
}

impl ClientBuilder {
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            account: None,
        }
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.config.retry = retry;
        self
    }

    /// Account whose key signs [`AuthInfo::V1`] requests.
    pub fn account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }

    pub fn build(self) -> Result<Client, Error> {
        Client::new(self.config, self.account)
    }
}

/// Storage provider client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint: Endpoint,
    account: Option<Arc<Account>>,
    user_agent: String,
    retry: RetryOptions,
}

impl Client {
    pub fn builder(endpoint: impl Into<String>) -> ClientBuilder {
        ClientBuilder::from_config(ClientConfig {
            endpoint: endpoint.into(),
            ..Default::default()
        })
    }

    pub fn new(config: ClientConfig, account: Option<Account>) -> Result<Self, Error> {
        let endpoint = Endpoint::parse(&config.endpoint, config.secure)?;
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            account: account.map(Arc::new),
            user_agent: config.user_agent.unwrap_or_else(default_user_agent),
            retry: config.retry,
        })
    }

    /// Address of the signing account, if one is configured.
    pub fn address(&self) -> Option<&str> {
        self.account.as_deref().map(Account::address)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn endpoint_host(&self) -> &str {
        self.endpoint.host()
    }

    /// Builds, signs and executes one request.
    ///
    /// 2xx responses are returned with their body unread; dropping the
    /// response closes it. Other statuses become [`Error::NotFound`] (404)
    /// or [`Error::Response`].
    pub async fn send(
        &self,
        meta: RequestMeta,
        opts: &SendOptions,
        auth: &AuthInfo,
        cancel: &CancellationToken,
    ) -> Result<Response, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }
        let has_object = meta.object.is_some();
        let request = self.build_request(meta, opts, auth)?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending request");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Canceled),
            r = self.http.execute(request) => r,
        };
        let resp = match result {
            Ok(resp) => resp,
            Err(_) if cancel.is_cancelled() => return Err(Error::Canceled),
            Err(e) => return Err(transport_error(e, &url)),
        };

        let status = resp.status();
        debug!(%method, %url, status = status.as_u16(), "received response");
        if status.is_success() {
            return Ok(resp);
        }
        Err(error_from_response(resp, &method, &url, has_object, cancel).await)
    }

    /// [`send`](Self::send) under the client's [`RetryOptions`].
    ///
    /// Only retryable failures are retried, and only while the body can be
    /// replayed; a streamed body is sent once.
    pub async fn send_with_retry(
        &self,
        meta: RequestMeta,
        opts: &SendOptions,
        auth: &AuthInfo,
        cancel: &CancellationToken,
    ) -> Result<Response, Error> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            let replay = if attempt < attempts {
                meta.try_clone()
            } else {
                None
            };
            let Some(current) = replay else {
                return self.send(meta, opts, auth, cancel).await;
            };

            match self.send(current, opts, auth, cancel).await {
                Err(e) if e.is_retryable(&self.retry.retry_statuses) => {
                    let delay = self.retry.delay(attempt);
                    warn!(attempt, error = %e, ?delay, "request failed, retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Canceled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn build_request(
        &self,
        meta: RequestMeta,
        opts: &SendOptions,
        auth: &AuthInfo,
    ) -> Result<reqwest::Request, Error> {
        let (url, host_header) = self.endpoint.target_url(&meta, opts.admin_api)?;
        let mut headers = HeaderMap::new();

        let date = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        headers.insert(HEADER_DATE, HeaderValue::from_str(&date)?);
        headers.insert(USER_AGENT, HeaderValue::from_str(&self.user_agent)?);
        if let Some(host) = host_header {
            headers.insert(HOST, HeaderValue::from_str(&host)?);
        }

        let content_type = match &meta.body {
            Body::Xml(_) => CONTENT_TYPE_XML,
            _ => meta.content_type.as_deref().unwrap_or(CONTENT_TYPE_DEFAULT),
        };
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);

        if !meta.body.is_empty() {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(meta.body.len()));
        }

        let md5 = match (&meta.content_md5_b64, &meta.body) {
            (Some(md5), _) => Some(md5.clone()),
            (None, Body::Xml(xml)) => Some(BASE64.encode(Md5::digest(xml.as_bytes()))),
            _ => None,
        };
        if let Some(md5) = md5 {
            headers.insert(CONTENT_MD5, HeaderValue::from_str(&md5)?);
        }

        match (&meta.content_sha256_hex, &meta.body) {
            (Some(sha), _) => {
                headers.insert(HEADER_CONTENT_SHA256, HeaderValue::from_str(sha)?);
            }
            (None, Body::Empty) => {
                headers.insert(
                    HEADER_CONTENT_SHA256,
                    HeaderValue::from_static(EMPTY_STRING_SHA256),
                );
            }
            _ => {}
        }

        if opts.method == Method::GET
            && let Some(range) = meta.range
        {
            headers.insert(RANGE, HeaderValue::from_str(&range.header_value())?);
        }
        if let Some(txn) = &meta.txn_hash {
            headers.insert(HEADER_TXN_HASH, HeaderValue::from_str(txn)?);
        }
        if opts.admin_api
            && let Some(resource) = meta.resource()
        {
            headers.insert(HEADER_RESOURCE, HeaderValue::from_str(&resource)?);
        }

        let body = match meta.body {
            Body::Empty => reqwest::Body::from(Vec::new()),
            Body::Bytes(bytes) => reqwest::Body::from(bytes),
            Body::Xml(xml) => reqwest::Body::from(xml),
            Body::Stream { reader, .. } => reqwest::Body::wrap_stream(ReaderStream::new(reader)),
        };

        let request = self
            .http
            .request(opts.method.clone(), url)
            .headers(headers)
            .body(body)
            .build()?;

        let key = self.account.as_deref().map(Account::signing_key);
        signer::sign(request, key, auth)
    }
}

/// `Greenfield (<os>; <arch>) gnfd-sp-client/<version>`.
fn default_user_agent() -> String {
    format!(
        "Greenfield ({}; {}) gnfd-sp-client/{}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        env!("CARGO_PKG_VERSION")
    )
}

/// URL with percent-escapes decoded, for error messages.
pub(crate) fn decoded_url(url: &Url) -> String {
    percent_decode_str(url.as_str())
        .decode_utf8_lossy()
        .into_owned()
}

/// Rewraps an EOF on the connection as a retryable "connection closed".
fn transport_error(err: reqwest::Error, url: &Url) -> Error {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::UnexpectedEof
        {
            return Error::ConnectionClosed {
                url: decoded_url(url),
            };
        }
        let msg = e.to_string();
        if msg.contains("connection closed before message completed") || msg.ends_with("EOF") {
            return Error::ConnectionClosed {
                url: decoded_url(url),
            };
        }
        source = e.source();
    }
    Error::Http(err)
}

async fn error_from_response(
    resp: Response,
    method: &Method,
    url: &Url,
    has_object: bool,
    cancel: &CancellationToken,
) -> Error {
    let status = resp.status();
    let header_request_id = resp
        .headers()
        .get(HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_default();

    let text = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Error::Canceled,
        t = resp.text() => t.unwrap_or_default(),
    };

    let parsed = if text.trim().is_empty() {
        None
    } else {
        ErrorBody::from_xml(&text).ok().filter(|b| !b.code.is_empty())
    };
    let body = parsed.unwrap_or_else(|| fallback_body(status, has_object, &text));

    let err = ErrResponse {
        status: status.as_u16(),
        code: body.code,
        message: body.message,
        request_id: if body.request_id.is_empty() {
            header_request_id
        } else {
            body.request_id
        },
        resource: body.resource,
        method: method.to_string(),
        url: decoded_url(url),
    };
    warn!(
        status = err.status,
        code = %err.code,
        request_id = %err.request_id,
        "storage provider returned an error"
    );

    if status == StatusCode::NOT_FOUND {
        Error::NotFound(Box::new(err))
    } else {
        Error::Response(Box::new(err))
    }
}

fn fallback_body(status: StatusCode, has_object: bool, text: &str) -> ErrorBody {
    let (code, message) = match status {
        StatusCode::NOT_FOUND if has_object => {
            ("NoSuchObject", "The specified object does not exist.".to_string())
        }
        StatusCode::NOT_FOUND => ("NoSuchBucket", "The specified bucket does not exist.".to_string()),
        StatusCode::FORBIDDEN => ("AccessDenied", "Access Denied.".to_string()),
        _ => {
            let message = if text.trim().is_empty() {
                "unknown error".to_string()
            } else {
                text.trim().to_string()
            };
            (status.canonical_reason().unwrap_or("Unknown"), message)
        }
    };
    ErrorBody {
        code: code.to_string(),
        message,
        ..Default::default()
    }
}
