//! Link creation arguments, link values and the external link record.
//!
//! An external link's target is an opaque byte record:
//!
//! ```text
//! ┌──────────────┬──────────────────┬─────┬───────────────────┬─────┐
//! │ version|flags│ target file name │ NUL │ object path       │ NUL │
//! │   (1 byte)   │                  │     │ (absolute)        │     │
//! └──────────────┴──────────────────┴─────┴───────────────────┴─────┘
//! ```
//!
//! The version lives in the high nibble, flags in the low nibble.

use crate::error::{Result, VolError};
use crate::object::Location;

/// Current external link record version.
pub const EXTERNAL_LINK_VERSION: u8 = 0;

/// Every flag bit this version defines (none).
pub const EXTERNAL_LINK_FLAGS_ALL: u8 = 0;

/// What a new link points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCreate<'a> {
    /// Another name for an existing object in the same container.
    Hard {
        target: Location,
        target_name: &'a str,
    },
    /// A path resolved lazily each time the link is traversed.
    Soft { target_path: &'a str },
    /// An encoded external link record.
    External { record: &'a [u8] },
}

/// A stored link, as reported by `link_value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkValue {
    Hard,
    Soft(String),
    /// The raw external link record.
    External(Vec<u8>),
}

/// A decoded external link record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLinkTarget {
    /// Name of the container holding the target.
    pub filename: String,
    /// Path of the target inside that container.
    pub object_path: String,
}

impl ExternalLinkTarget {
    /// Decode an external link record.
    pub fn decode(record: &[u8]) -> Result<Self> {
        let (&header, rest) = record
            .split_first()
            .ok_or_else(|| VolError::DataError("empty external link record".into()))?;

        let version = header >> 4;
        if version != EXTERNAL_LINK_VERSION {
            return Err(VolError::DataError(format!(
                "unsupported external link version {version}"
            )));
        }
        let flags = header & 0x0f;
        if flags & !EXTERNAL_LINK_FLAGS_ALL != 0 {
            return Err(VolError::DataError(format!(
                "invalid external link flags {flags:#x}"
            )));
        }

        let (filename, rest) = take_cstr(rest, "file name")?;
        let (object_path, rest) = take_cstr(rest, "object path")?;
        if !rest.is_empty() {
            return Err(VolError::DataError(format!(
                "{} trailing bytes after external link record",
                rest.len()
            )));
        }
        if filename.is_empty() {
            return Err(VolError::DataError("external link has an empty file name".into()));
        }

        Ok(Self {
            filename,
            object_path,
        })
    }
}

fn take_cstr<'a>(data: &'a [u8], what: &str) -> Result<(String, &'a [u8])> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| VolError::DataError(format!("external link {what} is not NUL-terminated")))?;
    let s = std::str::from_utf8(&data[..nul])
        .map_err(|e| VolError::DataError(format!("external link {what}: {e}")))?;
    Ok((s.to_string(), &data[nul + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_well_formed_record() {
        let mut rec = vec![0u8];
        rec.extend_from_slice(b"child.split\0/dset\0");
        let t = ExternalLinkTarget::decode(&rec).unwrap();
        assert_eq!(t.filename, "child.split");
        assert_eq!(t.object_path, "/dset");
    }

    #[test]
    fn reject_unknown_version() {
        let mut rec = vec![1u8 << 4];
        rec.extend_from_slice(b"a\0/b\0");
        let err = ExternalLinkTarget::decode(&rec).unwrap_err();
        assert!(err.to_string().contains("version 1"));
    }

    #[test]
    fn reject_flags() {
        let mut rec = vec![0x01u8];
        rec.extend_from_slice(b"a\0/b\0");
        assert!(ExternalLinkTarget::decode(&rec).is_err());
    }

    #[test]
    fn reject_missing_terminator() {
        assert!(ExternalLinkTarget::decode(&[]).is_err());
        assert!(ExternalLinkTarget::decode(b"\0file-only\0/no-nul").is_err());
        assert!(ExternalLinkTarget::decode(b"\0no-nul-at-all").is_err());
    }

    #[test]
    fn reject_trailing_bytes_and_empty_name() {
        assert!(ExternalLinkTarget::decode(b"\0a\0/b\0junk").is_err());
        assert!(ExternalLinkTarget::decode(b"\0\0/b\0").is_err());
    }
}
