use crate::TransferError;

/// Maps a remote object key to its flat file name inside the staging area.
///
/// Keys containing `/` are flattened to their last segment, which also becomes
/// the destination object name. Segments that could name a different
/// location on some platform (`\`, drive `:`, NUL) are rejected.
pub fn staging_file_name(key: &str) -> Result<String, TransferError> {
    let name = key.rsplit('/').next().unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(TransferError::InvalidPath(format!(
            "key has no usable file name: {key}"
        )));
    }
    if name.contains(['\\', ':', '\0']) {
        return Err(TransferError::InvalidPath(format!(
            "key file name is not portable: {key}"
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_name_flattens_nested_keys() {
        assert_eq!(staging_file_name("photos/2024/cat.jpg").unwrap(), "cat.jpg");
        assert_eq!(staging_file_name("top.txt").unwrap(), "top.txt");
        assert_eq!(staging_file_name("/etc/passwd").unwrap(), "passwd");
        assert_eq!(staging_file_name("../x").unwrap(), "x");
    }

    #[test]
    fn staging_name_rejects_directory_like_keys() {
        assert!(staging_file_name("photos/").is_err());
        assert!(staging_file_name("a/..").is_err());
        assert!(staging_file_name("x/.").is_err());
        assert!(staging_file_name("").is_err());
    }

    #[test]
    fn staging_name_rejects_windows_separators_and_prefixes() {
        for key in ["..\\..\\z", "dir/a\\b.txt", "C:\\x", "\\\\srv\\share", "C:evil", "nul\0byte"] {
            let err = staging_file_name(key).unwrap_err();
            assert!(
                matches!(err, TransferError::InvalidPath(ref msg) if msg.contains("not portable")),
                "{key:?}: {err}"
            );
        }
    }
}
