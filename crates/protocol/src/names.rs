use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::ProtocolError;
use crate::constants::GNFD_SCHEME;

const BUCKET_MIN_LEN: usize = 3;
const BUCKET_MAX_LEN: usize = 63;

/// Splits `gnfd://bucket/object` into its bucket and object parts.
///
/// The scheme is optional. The split happens at the first `/`, so the object
/// part keeps any further separators (`gnfd://data/foo/bar.bin` yields
/// `("data", "foo/bar.bin")`).
pub fn parse_bucket_object(url: &str) -> Result<(String, String), ProtocolError> {
    let rest = url.strip_prefix(GNFD_SCHEME).unwrap_or(url);
    match rest.find('/') {
        Some(idx) => Ok((rest[..idx].to_string(), rest[idx + 1..].to_string())),
        None => Err(ProtocolError::InvalidUrl {
            url: url.to_string(),
            reason: "expected gnfd://bucket/object".into(),
        }),
    }
}

/// Extracts the bucket from `gnfd://bucket` or `gnfd://bucket/...`.
pub fn parse_bucket(url: &str) -> Result<String, ProtocolError> {
    let rest = url.strip_prefix(GNFD_SCHEME).unwrap_or(url);
    let bucket = match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    if bucket.is_empty() {
        return Err(ProtocolError::InvalidUrl {
            url: url.to_string(),
            reason: "missing bucket name".into(),
        });
    }
    Ok(bucket.to_string())
}

/// Validates a bucket name: 3 to 63 characters of lowercase letters, digits
/// and `-`, starting and ending with a letter or digit.
pub fn check_bucket(name: &str) -> Result<(), ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidBucketName {
        name: name.to_string(),
        reason,
    };

    let len = name.len();
    if !(BUCKET_MIN_LEN..=BUCKET_MAX_LEN).contains(&len) {
        return Err(invalid(format!(
            "length must be between {BUCKET_MIN_LEN} and {BUCKET_MAX_LEN}, got {len}"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid(
            "only lowercase letters, digits and '-' are allowed".into(),
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid(
            "must start and end with a lowercase letter or digit".into(),
        ));
    }
    Ok(())
}

/// Validates an object name. Any non-empty string is accepted.
pub fn check_object(name: &str) -> Result<(), ProtocolError> {
    if name.is_empty() {
        return Err(ProtocolError::InvalidObjectName("object name is empty".into()));
    }
    Ok(())
}

/// Bytes left as-is in request paths: `A-Z a-z 0-9 - _ . ~ /`.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encodes `s` for use in request paths and canonical requests.
///
/// Strings made only of unreserved characters and `/` are returned as-is.
/// Every other byte of the UTF-8 encoding becomes `%XX` with uppercase hex.
pub fn encode_path(s: &str) -> String {
    utf8_percent_encode(s, PATH_ESCAPE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bucket_object_splits_at_first_slash() {
        let (bucket, object) = parse_bucket_object("gnfd://data/foo/bar.bin").unwrap();
        assert_eq!(bucket, "data");
        assert_eq!(object, "foo/bar.bin");
    }

    #[test]
    fn parse_bucket_object_without_scheme() {
        let (bucket, object) = parse_bucket_object("b/o").unwrap();
        assert_eq!((bucket.as_str(), object.as_str()), ("b", "o"));
    }

    #[test]
    fn parse_bucket_object_requires_object() {
        let err = parse_bucket_object("gnfd://data").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidUrl { .. }));
    }

    #[test]
    fn parse_bucket_variants() {
        assert_eq!(parse_bucket("gnfd://data").unwrap(), "data");
        assert_eq!(parse_bucket("gnfd://data/obj").unwrap(), "data");
        assert_eq!(parse_bucket("data").unwrap(), "data");
        assert!(parse_bucket("gnfd://").is_err());
    }

    #[test]
    fn bucket_name_scenarios() {
        assert!(check_bucket("ab").is_err());
        assert!(check_bucket("valid-bucket-1").is_ok());
        assert!(check_bucket("-bad").is_err());
        assert!(check_bucket("bad-").is_err());
        assert!(check_bucket(&"a".repeat(64)).is_err());
        assert!(check_bucket(&"a".repeat(63)).is_ok());
        assert!(check_bucket("abc").is_ok());
    }

    #[test]
    fn bucket_name_rejects_uppercase_and_symbols() {
        assert!(check_bucket(&"A".repeat(10)).is_err());
        assert!(check_bucket("my_bucket").is_err());
        assert!(check_bucket("my.bucket").is_err());
        assert!(check_bucket("buck\u{e9}t").is_err());
    }

    #[test]
    fn object_name_must_not_be_empty() {
        assert!(check_object("").is_err());
        assert!(check_object("a").is_ok());
        assert!(check_object("dir/file with spaces.txt").is_ok());
    }

    #[test]
    fn encode_path_escapes_utf8_and_spaces() {
        assert_eq!(
            encode_path("a b/\u{6d4b}\u{8bd5}.txt"),
            "a%20b/%E6%B5%8B%E8%AF%95.txt"
        );
    }

    #[test]
    fn encode_path_passes_safe_strings_through() {
        let safe = "dir/sub-dir/file_name.v1~tmp";
        assert_eq!(encode_path(safe), safe);
        assert_eq!(encode_path(&encode_path(safe)), safe);
    }

    #[test]
    fn encode_path_escapes_reserved_ascii() {
        assert_eq!(encode_path("a+b=c&d"), "a%2Bb%3Dc%26d");
        assert_eq!(encode_path("100%"), "100%25");
    }

    #[test]
    fn encode_path_uses_uppercase_hex_for_every_byte() {
        assert_eq!(encode_path("a:b?c#d"), "a%3Ab%3Fc%23d");
        assert_eq!(encode_path("\u{ff}"), "%C3%BF");
        assert_eq!(encode_path("\n\t"), "%0A%09");
    }
}
