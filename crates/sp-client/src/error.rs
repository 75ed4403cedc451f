use std::fmt;

use gnfd_protocol::ProtocolError;

/// Structured error answered by a storage provider.
///
/// Built from the `<Error>` XML body when present, otherwise from the HTTP
/// status. Nothing is dropped: code, message, request id, status, method and
/// decoded URL all surface to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrResponse {
    pub status: u16,
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub resource: String,
    pub method: String,
    /// Request URL with percent-escapes decoded.
    pub url: String,
}

impl fmt::Display for ErrResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} {}(Message: {})",
            self.method, self.url, self.status, self.code, self.message
        )
    }
}

impl std::error::Error for ErrResponse {}

/// Errors from the storage provider client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("approval rejected: {reason}")]
    ApprovalRejected {
        reason: String,
        response: Option<Box<ErrResponse>>,
    },

    #[error("upload rejected: {0}")]
    UploadRejected(Box<ErrResponse>),

    #[error("not found: {0}")]
    NotFound(Box<ErrResponse>),

    #[error("{0}")]
    Response(Box<ErrResponse>),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connection closed by foreign host {url}. Retry again.")]
    ConnectionClosed { url: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("operation canceled")]
    Canceled,
}

impl Error {
    /// The SP error body behind this error, if any.
    pub fn response(&self) -> Option<&ErrResponse> {
        match self {
            Self::UploadRejected(r) | Self::NotFound(r) | Self::Response(r) => Some(r),
            Self::ApprovalRejected { response, .. } => response.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of the SP answer, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Whether a retry decorator may resend the request.
    ///
    /// Connection-level failures always qualify; SP answers qualify when
    /// their status is listed in `retry_statuses`.
    pub fn is_retryable(&self, retry_statuses: &[u16]) -> bool {
        match self {
            Self::ConnectionClosed { .. } => true,
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Response(r) => retry_statuses.contains(&r.status),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: u16) -> ErrResponse {
        ErrResponse {
            status,
            code: "AccessDenied".into(),
            message: "Access Denied".into(),
            request_id: "req-1".into(),
            resource: String::new(),
            method: "GET".into(),
            url: "http://sp.example.com/a b".into(),
        }
    }

    #[test]
    fn err_response_display() {
        assert_eq!(
            sample(403).to_string(),
            "GET http://sp.example.com/a b: 403 AccessDenied(Message: Access Denied)"
        );
    }

    #[test]
    fn retryable_classification() {
        let statuses = [500, 503];
        assert!(Error::Response(Box::new(sample(503))).is_retryable(&statuses));
        assert!(!Error::Response(Box::new(sample(403))).is_retryable(&statuses));
        assert!(!Error::UploadRejected(Box::new(sample(503))).is_retryable(&statuses));
        assert!(
            Error::ConnectionClosed {
                url: "http://x".into()
            }
            .is_retryable(&statuses)
        );
        assert!(!Error::Canceled.is_retryable(&statuses));
    }

    #[test]
    fn response_accessors() {
        let err = Error::NotFound(Box::new(sample(404)));
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.response().unwrap().request_id, "req-1");

        let rejected = Error::ApprovalRejected {
            reason: "missing signature".into(),
            response: None,
        };
        assert_eq!(rejected.status(), None);
    }

    #[test]
    fn connection_closed_message() {
        let err = Error::ConnectionClosed {
            url: "http://sp:9033/obj".into(),
        };
        assert_eq!(
            err.to_string(),
            "Connection closed by foreign host http://sp:9033/obj. Retry again."
        );
    }
}
