//! Various utility functions/macros used throughout the kernel
use std::path::PathBuf;

use crate::{Error, IcebergResult};

use url::Url;

/// convenient way to return an error if a condition isn't true
macro_rules! require {
    ( $cond:expr, $err:expr ) => {
        if !($cond) {
            return Err($err);
        }
    };
}

pub(crate) use require;

/// Resolve a file location (either a `file://` url or a plain local path) to a local path.
/// Locations on any other scheme are rejected.
pub(crate) fn try_parse_local_path(location: impl AsRef<str>) -> IcebergResult<PathBuf> {
    let location = location.as_ref();
    match Url::parse(location) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| Error::invalid_table_location(location)),
        // a single character scheme is a windows drive letter, not a url
        Ok(url) if url.scheme().len() == 1 => Ok(PathBuf::from(location)),
        Ok(url) => Err(Error::invalid_table_location(format!(
            "{location}: scheme '{}' is not a local filesystem",
            url.scheme()
        ))),
        Err(_) => Ok(PathBuf::from(location)),
    }
}

/// Return the directory portion of a file location, including the trailing separator. A location
/// without a separator has an empty parent.
pub(crate) fn parent_location(location: &str) -> &str {
    match location.rfind('/') {
        Some(idx) => &location[..=idx],
        None => "",
    }
}

/// Lowercase hex rendering for binary values
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_paths() {
        let path = try_parse_local_path("/tmp/warehouse/t/metadata/v1.metadata.json").unwrap();
        assert_eq!(
            path,
            PathBuf::from("/tmp/warehouse/t/metadata/v1.metadata.json")
        );
        let path = try_parse_local_path("file:///tmp/warehouse/t/metadata/v1.json").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/warehouse/t/metadata/v1.json"));
        assert!(matches!(
            try_parse_local_path("s3://bucket/t/metadata/v1.json"),
            Err(Error::InvalidTableLocation(_))
        ));
    }

    #[test]
    fn test_parent_location() {
        assert_eq!(parent_location("s3://b/t/metadata/v3.json"), "s3://b/t/metadata/");
        assert_eq!(parent_location("v3.json"), "");
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0xab, 0x10]), "00ab10");
        assert_eq!(to_hex(&[]), "");
    }
}
