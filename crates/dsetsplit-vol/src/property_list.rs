//! Property list types for configuring files, datasets and links.
//!
//! Property lists group related configuration into reusable bundles. Copying
//! a list is a `clone()`, closing one is dropping it.

use serde::{Deserialize, Serialize};

/// Default metadata cache size: 2 MiB.
pub const DEFAULT_METADATA_CACHE_BYTES: usize = 2 * 1024 * 1024;

/// Default dataset chunk cache size: 1 MiB.
pub const DEFAULT_CHUNK_CACHE_BYTES: usize = 1024 * 1024;

/// Default number of soft/external links followed while resolving one path.
pub const DEFAULT_MAX_LINK_TRAVERSALS: u32 = 16;

/// File creation properties.
///
/// Fixed when the container is created and stored with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCreateProps {
    /// User block size in bytes (0 or a power of two >= 512).
    pub userblock_size: u64,
    /// Size of file addresses in bytes.
    pub offset_size: u8,
    /// Size of lengths in bytes.
    pub length_size: u8,
}

impl Default for FileCreateProps {
    fn default() -> Self {
        Self {
            userblock_size: 0,
            offset_size: 8,
            length_size: 8,
        }
    }
}

impl FileCreateProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user block size.
    pub fn userblock(mut self, bytes: u64) -> Self {
        self.userblock_size = bytes;
        self
    }

    /// Set address and length sizes.
    pub fn sizes(mut self, offset_size: u8, length_size: u8) -> Self {
        self.offset_size = offset_size;
        self.length_size = length_size;
        self
    }
}

/// File access properties.
///
/// Controls caching and alignment for one open session of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAccessProps {
    /// Maximum bytes for the metadata cache.
    pub metadata_cache_bytes: usize,
    /// Alignment of allocations in bytes (1 = unaligned).
    pub alignment: u64,
}

impl Default for FileAccessProps {
    fn default() -> Self {
        Self {
            metadata_cache_bytes: DEFAULT_METADATA_CACHE_BYTES,
            alignment: 1,
        }
    }
}

impl FileAccessProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata_cache(mut self, bytes: usize) -> Self {
        self.metadata_cache_bytes = bytes;
        self
    }

    pub fn align(mut self, bytes: u64) -> Self {
        self.alignment = bytes;
        self
    }
}

/// Dataset creation properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetCreateProps {
    /// Chunk dimensions (enables chunked storage). Rank must match the dataspace.
    pub chunk_dims: Option<Vec<u64>>,
    /// Deflate compression level (0-9).
    pub deflate_level: Option<u32>,
    /// Raw bytes of one element used to initialise the dataset.
    pub fill_value: Option<Vec<u8>>,
}

impl DatasetCreateProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set chunk dimensions.
    pub fn chunk(mut self, dims: &[u64]) -> Self {
        self.chunk_dims = Some(dims.to_vec());
        self
    }

    /// Set deflate compression level (0-9).
    pub fn deflate(mut self, level: u32) -> Self {
        self.deflate_level = Some(level);
        self
    }

    pub fn fill_value(mut self, element: &[u8]) -> Self {
        self.fill_value = Some(element.to_vec());
        self
    }
}

/// Dataset access properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetAccessProps {
    pub chunk_cache_bytes: usize,
}

impl Default for DatasetAccessProps {
    fn default() -> Self {
        Self {
            chunk_cache_bytes: DEFAULT_CHUNK_CACHE_BYTES,
        }
    }
}

impl DatasetAccessProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_cache(mut self, bytes: usize) -> Self {
        self.chunk_cache_bytes = bytes;
        self
    }
}

/// Link creation properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCreateProps {
    /// Create missing groups along the path.
    pub create_intermediate_groups: bool,
}

impl LinkCreateProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intermediate_groups(mut self) -> Self {
        self.create_intermediate_groups = true;
        self
    }
}

/// Link access properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAccessProps {
    /// Soft and external links followed before resolution gives up.
    pub max_traversals: u32,
}

impl Default for LinkAccessProps {
    fn default() -> Self {
        Self {
            max_traversals: DEFAULT_MAX_LINK_TRAVERSALS,
        }
    }
}

impl LinkAccessProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_traversals(mut self, n: u32) -> Self {
        self.max_traversals = n;
        self
    }
}

/// How `file_create` treats an existing container of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateMode {
    /// Replace it. Fails if it is currently open.
    Truncate,
    /// Fail if it exists.
    Exclusive,
}

/// How `file_open` opens a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    /// Read-write, and only if nothing else holds the container open.
    Exclusive,
}

impl OpenMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_props_builder() {
        let props = DatasetCreateProps::new()
            .chunk(&[20, 20])
            .deflate(6)
            .fill_value(&[0xff; 4]);
        assert_eq!(props.chunk_dims, Some(vec![20, 20]));
        assert_eq!(props.deflate_level, Some(6));
        assert_eq!(props.fill_value.as_deref(), Some(&[0xff; 4][..]));
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let fcpl = FileCreateProps::new().userblock(512).sizes(4, 4);
        let mut copy = fcpl.clone();
        assert_eq!(copy, fcpl);
        copy.userblock_size = 1024;
        assert_eq!(fcpl.userblock_size, 512);
    }

    #[test]
    fn defaults() {
        assert_eq!(FileAccessProps::default().metadata_cache_bytes, DEFAULT_METADATA_CACHE_BYTES);
        assert_eq!(LinkAccessProps::default().max_traversals, DEFAULT_MAX_LINK_TRAVERSALS);
        assert!(!LinkCreateProps::default().create_intermediate_groups);
        assert!(LinkCreateProps::new().intermediate_groups().create_intermediate_groups);
        assert!(OpenMode::Exclusive.is_writable());
        assert!(!OpenMode::ReadOnly.is_writable());
    }
}
