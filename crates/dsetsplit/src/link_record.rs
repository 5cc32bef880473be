//! Encoder for the external link record installed in the parent.
//!
//! ```text
//! ┌────────┬───────────────────┬─────┬──────────┬─────┐
//! │ 0x00   │ child file name   │ NUL │ "/"+leaf │ NUL │
//! └────────┴───────────────────┴─────┴──────────┴─────┘
//! ```
//!
//! The header byte carries the version (high nibble) and flags (low nibble),
//! both zero. Backends decode the record when they traverse the link.

use dsetsplit_vol::link::{EXTERNAL_LINK_FLAGS_ALL, EXTERNAL_LINK_VERSION};

use crate::error::{Result, SplitError};

/// Version written into the record header.
pub const EXT_LINK_VERSION: u8 = EXTERNAL_LINK_VERSION;

/// Flags written into the record header.
pub const EXT_LINK_FLAGS: u8 = EXTERNAL_LINK_FLAGS_ALL;

/// Byte length of the record for `child_name` and `object_path`.
pub fn record_len(child_name: &str, object_path: &str) -> usize {
    1 + child_name.len() + 1 + object_path.len() + 1
}

/// Encode an external link to `object_path` inside `child_name`.
pub fn encode_external_link(child_name: &str, object_path: &str) -> Result<Vec<u8>> {
    for field in [child_name, object_path] {
        if field.contains('\0') {
            return Err(SplitError::InteriorNul(field.to_string()));
        }
    }

    let mut record = Vec::with_capacity(record_len(child_name, object_path));
    record.push((EXT_LINK_VERSION << 4) | EXT_LINK_FLAGS);
    record.extend_from_slice(child_name.as_bytes());
    record.push(0);
    record.extend_from_slice(object_path.as_bytes());
    record.push(0);
    Ok(record)
}
