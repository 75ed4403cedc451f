//! Request canonicalization and `ECDSA-secp256k1` signing.
//!
//! ```text
//! METHOD
//! encode_path(decoded URL path)
//! sorted query (space as %20)
//! canonical headers, one `name:value` per line
//! signed header names joined by `;`
//! ```
//!
//! The string to sign is `ECDSA-secp256k1\n<X-Gnfd-Date>\n<hex sha256(canonical)>`
//! and is signed over its Keccak-256 digest with a recoverable signature
//! (`r || s || recovery_id + 27`).

use std::collections::BTreeMap;

use gnfd_protocol::constants::HEADER_DATE;
use gnfd_protocol::encode_path;
use k256::ecdsa::SigningKey;
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HOST, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, Request, Url};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

use crate::Error;
use crate::request::QUERY_ESCAPE;

/// Algorithm tag used in the string to sign and the authorization header.
pub const AUTH_ALGORITHM: &str = "ECDSA-secp256k1";

/// How a request is authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthInfo {
    /// Sign now with the client's private key.
    V1,
    /// Attach a signature produced elsewhere (e.g. a wallet).
    Offline(String),
    /// Send unsigned.
    None,
}

/// Builds the canonical request string.
pub fn canonical_request(method: &Method, url: &Url, headers: &HeaderMap) -> String {
    let path = percent_decode_str(url.path()).decode_utf8_lossy();
    let (canonical_headers, signed_headers) = canonical_headers(url, headers);
    [
        method.as_str().to_string(),
        encode_path(&path),
        canonical_query(url),
        canonical_headers,
        signed_headers,
    ]
    .join("\n")
}

/// Query pairs sorted by key and re-escaped; spaces become `%20`.
fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, QUERY_ESCAPE),
                utf8_percent_encode(v, QUERY_ESCAPE)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Returns the canonical header block and the signed header names.
fn canonical_headers(url: &Url, headers: &HeaderMap) -> (String, String) {
    let mut set: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        if *name == AUTHORIZATION || *name == USER_AGENT || *name == HOST {
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes());
        set.entry(name.as_str().to_ascii_lowercase())
            .or_default()
            .push(collapse_whitespace(&value));
    }
    set.insert("host".to_string(), vec![effective_host(url, headers)]);

    let lines = set
        .iter()
        .map(|(name, values)| format!("{name}:{}", values.join(",")))
        .collect::<Vec<_>>()
        .join("\n");
    let names = set.keys().cloned().collect::<Vec<_>>().join(";");
    (lines, names)
}

/// Explicit `Host` header first, then the URL authority.
fn effective_host(url: &Url, headers: &HeaderMap) -> String {
    if let Some(host) = headers.get(HOST).and_then(|h| h.to_str().ok()) {
        return host.trim().to_string();
    }
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `ECDSA-secp256k1\n<date>\n<hex sha256(canonical_request)>`.
pub fn string_to_sign(canonical_request: &str, date: &str) -> String {
    let digest = Sha256::digest(canonical_request.as_bytes());
    format!("{AUTH_ALGORITHM}\n{date}\n{}", hex::encode(digest))
}

/// Signs `Keccak256(message)` and returns `r || s || v` with `v = recid + 27`.
pub fn sign_message(key: &SigningKey, message: &[u8]) -> Result<[u8; 65], Error> {
    let digest = Keccak256::digest(message);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| Error::Signing(e.to_string()))?;

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte() + 27;
    Ok(out)
}

/// Computes the `Authorization` header value for a request.
///
/// Returns `None` for [`AuthInfo::None`]. Line breaks inside the string to
/// sign are written as `%0A` because header values cannot carry them.
pub fn authorization(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    key: Option<&SigningKey>,
    auth: &AuthInfo,
) -> Result<Option<String>, Error> {
    match auth {
        AuthInfo::None => Ok(None),
        AuthInfo::Offline(signature) => Ok(Some(format!(
            "{AUTH_ALGORITHM} Signature={signature}"
        ))),
        AuthInfo::V1 => {
            let key = key.ok_or_else(|| Error::Signing("no private key configured".into()))?;
            let date = headers
                .get(HEADER_DATE)
                .and_then(|d| d.to_str().ok())
                .ok_or_else(|| Error::Signing(format!("missing {HEADER_DATE} header")))?;

            let canonical = canonical_request(method, url, headers);
            let to_sign = string_to_sign(&canonical, date);
            let signature = sign_message(key, to_sign.as_bytes())?;
            Ok(Some(format!(
                "{AUTH_ALGORITHM} SignedRequest={}, Signature={}",
                to_sign.replace('\n', "%0A"),
                hex::encode(signature)
            )))
        }
    }
}

/// Attaches the authorization header to `request`.
pub fn sign(
    mut request: Request,
    key: Option<&SigningKey>,
    auth: &AuthInfo,
) -> Result<Request, Error> {
    let value = authorization(request.method(), request.url(), request.headers(), key, auth)?;
    if let Some(value) = value {
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&value)?);
    }
    Ok(request)
}
