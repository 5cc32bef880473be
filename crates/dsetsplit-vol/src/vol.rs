//! Virtual Object Layer (VOL) abstraction for pluggable container backends.
//!
//! The [`Vol`] trait is the full object-model surface a connector exposes:
//! files, groups, datasets, attributes, committed datatypes, links and
//! asynchronous requests. Connectors can be stacked: a pass-through connector
//! implements `Vol` itself and forwards to the `Vol` beneath it.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────┐
//! │        application        │
//! ├───────────────────────────┤
//! │   pass-through connector  │  ← implements Vol, wraps ids
//! ├───────────────────────────┤
//! │   terminal connector      │  ← implements Vol, owns storage
//! └───────────────────────────┘
//! ```
//!
//! Every id handed out by a connector is an [`ObjectId`] that only that
//! connector can interpret.

use std::time::Duration;

use crate::error::{Result, VolError};
use crate::link::{LinkCreate, LinkValue};
use crate::object::{Location, ObjectId, ObjectType};
use crate::property_list::{
    CreateMode, DatasetAccessProps, DatasetCreateProps, FileAccessProps, FileCreateProps,
    LinkAccessProps, LinkCreateProps, OpenMode,
};
use crate::types::{Dataspace, Datatype};

/// Capabilities that a VOL connector supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolCapability {
    /// Can read existing datasets.
    ReadData,
    /// Can write new datasets.
    WriteData,
    /// Can list groups and links.
    ListObjects,
    /// Can read/write attributes.
    Attributes,
    /// Accepts chunked storage layouts.
    ChunkedStorage,
    /// Resolves external links.
    ExternalLinks,
    /// Can commit named datatypes.
    CommittedDatatypes,
    /// Hands back request tokens for deferred operations.
    AsyncRequests,
}

/// State of an asynchronous request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

/// Where a connector stores the request token of a deferred operation.
///
/// `None` asks for synchronous completion. `Some(slot)` lets the connector
/// defer the work and leave a request id in `slot`.
pub type RequestSlot<'a> = Option<&'a mut Option<ObjectId>>;

/// Callback invoked once a request reaches a final state.
pub type RequestCallback = Box<dyn FnOnce(RequestStatus) + Send>;

pub(crate) fn unsupported(connector: &str, op: &str) -> VolError {
    VolError::Unsupported(format!("{connector}: {op} not supported"))
}

/// Virtual Object Layer trait for pluggable storage backends.
///
/// Implement this trait to add support for a new backend. Each operation has
/// a default implementation that returns [`VolError::Unsupported`], so
/// connectors only need to implement the operations they support.
///
/// Close operations consume the id only when they succeed; after a failed
/// close the id is still valid and the close may be retried.
#[allow(clippy::too_many_arguments)]
pub trait Vol: Send + Sync {
    /// Returns the connector name (e.g., "memory", "dset-split").
    fn name(&self) -> &str;

    /// Returns the set of capabilities this connector supports.
    fn capabilities(&self) -> Vec<VolCapability>;

    /// Check if a specific capability is supported.
    fn supports(&self, cap: VolCapability) -> bool {
        self.capabilities().contains(&cap)
    }

    // -- files ---------------------------------------------------------------

    /// Create a container named `name`.
    fn file_create(
        &self,
        _name: &str,
        _mode: CreateMode,
        _fcpl: &FileCreateProps,
        _fapl: &FileAccessProps,
        _req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        Err(unsupported(self.name(), "file_create"))
    }

    fn file_open(
        &self,
        _name: &str,
        _mode: OpenMode,
        _fapl: &FileAccessProps,
        _req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        Err(unsupported(self.name(), "file_open"))
    }

    /// Name of the container holding `obj` (which may be any open object).
    fn file_name(&self, _obj: Location) -> Result<String> {
        Err(unsupported(self.name(), "file_name"))
    }

    /// Copy of the creation properties of the container holding `obj`.
    fn file_fcpl(&self, _obj: Location) -> Result<FileCreateProps> {
        Err(unsupported(self.name(), "file_fcpl"))
    }

    /// Copy of the access properties of the container holding `obj`.
    fn file_fapl(&self, _obj: Location) -> Result<FileAccessProps> {
        Err(unsupported(self.name(), "file_fapl"))
    }

    fn file_flush(&self, _obj: Location, _req: RequestSlot<'_>) -> Result<()> {
        Err(unsupported(self.name(), "file_flush"))
    }

    fn file_close(&self, _file: ObjectId, _req: RequestSlot<'_>) -> Result<()> {
        Err(unsupported(self.name(), "file_close"))
    }

    // -- groups --------------------------------------------------------------

    fn group_create(
        &self,
        _loc: Location,
        _name: &str,
        _lcpl: &LinkCreateProps,
        _req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        Err(unsupported(self.name(), "group_create"))
    }

    fn group_open(&self, _loc: Location, _name: &str, _req: RequestSlot<'_>) -> Result<ObjectId> {
        Err(unsupported(self.name(), "group_open"))
    }

    /// Number of links in a group (or in a file's root group).
    fn group_link_count(&self, _grp: Location) -> Result<usize> {
        Err(unsupported(self.name(), "group_link_count"))
    }

    fn group_close(&self, _grp: ObjectId, _req: RequestSlot<'_>) -> Result<()> {
        Err(unsupported(self.name(), "group_close"))
    }

    // -- datasets ------------------------------------------------------------

    /// Create a dataset and link it at `name` relative to `loc`.
    fn dataset_create(
        &self,
        _loc: Location,
        _name: &str,
        _lcpl: &LinkCreateProps,
        _dtype: &Datatype,
        _space: &Dataspace,
        _dcpl: &DatasetCreateProps,
        _dapl: &DatasetAccessProps,
        _req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        Err(unsupported(self.name(), "dataset_create"))
    }

    fn dataset_open(
        &self,
        _loc: Location,
        _name: &str,
        _dapl: &DatasetAccessProps,
        _req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        Err(unsupported(self.name(), "dataset_open"))
    }

    /// Read the raw bytes of a whole dataset.
    fn dataset_read(&self, _dset: ObjectId, _req: RequestSlot<'_>) -> Result<Vec<u8>> {
        Err(unsupported(self.name(), "dataset_read"))
    }

    /// Overwrite a whole dataset with raw bytes.
    fn dataset_write(&self, _dset: ObjectId, _data: &[u8], _req: RequestSlot<'_>) -> Result<()> {
        Err(unsupported(self.name(), "dataset_write"))
    }

    fn dataset_space(&self, _dset: ObjectId) -> Result<Dataspace> {
        Err(unsupported(self.name(), "dataset_space"))
    }

    fn dataset_type(&self, _dset: ObjectId) -> Result<Datatype> {
        Err(unsupported(self.name(), "dataset_type"))
    }

    fn dataset_dcpl(&self, _dset: ObjectId) -> Result<DatasetCreateProps> {
        Err(unsupported(self.name(), "dataset_dcpl"))
    }

    fn dataset_close(&self, _dset: ObjectId, _req: RequestSlot<'_>) -> Result<()> {
        Err(unsupported(self.name(), "dataset_close"))
    }

    // -- attributes ----------------------------------------------------------

    fn attr_create(
        &self,
        _loc: Location,
        _name: &str,
        _dtype: &Datatype,
        _space: &Dataspace,
        _req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        Err(unsupported(self.name(), "attr_create"))
    }

    fn attr_open(&self, _loc: Location, _name: &str, _req: RequestSlot<'_>) -> Result<ObjectId> {
        Err(unsupported(self.name(), "attr_open"))
    }

    fn attr_read(&self, _attr: ObjectId, _req: RequestSlot<'_>) -> Result<Vec<u8>> {
        Err(unsupported(self.name(), "attr_read"))
    }

    fn attr_write(&self, _attr: ObjectId, _data: &[u8], _req: RequestSlot<'_>) -> Result<()> {
        Err(unsupported(self.name(), "attr_write"))
    }

    fn attr_exists(&self, _loc: Location, _name: &str) -> Result<bool> {
        Err(unsupported(self.name(), "attr_exists"))
    }

    fn attr_close(&self, _attr: ObjectId, _req: RequestSlot<'_>) -> Result<()> {
        Err(unsupported(self.name(), "attr_close"))
    }

    // -- committed datatypes -------------------------------------------------

    fn datatype_commit(
        &self,
        _loc: Location,
        _name: &str,
        _dtype: &Datatype,
        _lcpl: &LinkCreateProps,
        _req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        Err(unsupported(self.name(), "datatype_commit"))
    }

    fn datatype_open(&self, _loc: Location, _name: &str, _req: RequestSlot<'_>) -> Result<ObjectId> {
        Err(unsupported(self.name(), "datatype_open"))
    }

    fn datatype_get(&self, _dt: ObjectId) -> Result<Datatype> {
        Err(unsupported(self.name(), "datatype_get"))
    }

    fn datatype_close(&self, _dt: ObjectId, _req: RequestSlot<'_>) -> Result<()> {
        Err(unsupported(self.name(), "datatype_close"))
    }

    // -- links ---------------------------------------------------------------

    /// Create a link at `name` relative to `loc`.
    fn link_create(
        &self,
        _link: LinkCreate<'_>,
        _loc: Location,
        _name: &str,
        _lcpl: &LinkCreateProps,
        _lapl: &LinkAccessProps,
        _req: RequestSlot<'_>,
    ) -> Result<()> {
        Err(unsupported(self.name(), "link_create"))
    }

    fn link_exists(&self, _loc: Location, _name: &str, _lapl: &LinkAccessProps) -> Result<bool> {
        Err(unsupported(self.name(), "link_exists"))
    }

    /// The stored value of the link itself (the link is not traversed).
    fn link_value(&self, _loc: Location, _name: &str, _lapl: &LinkAccessProps) -> Result<LinkValue> {
        Err(unsupported(self.name(), "link_value"))
    }

    fn link_delete(
        &self,
        _loc: Location,
        _name: &str,
        _lapl: &LinkAccessProps,
        _req: RequestSlot<'_>,
    ) -> Result<()> {
        Err(unsupported(self.name(), "link_delete"))
    }

    // -- generic objects -----------------------------------------------------

    /// Open whatever object `name` resolves to.
    fn object_open(
        &self,
        _loc: Location,
        _name: &str,
        _req: RequestSlot<'_>,
    ) -> Result<(ObjectId, ObjectType)> {
        Err(unsupported(self.name(), "object_open"))
    }

    // -- requests ------------------------------------------------------------

    fn request_wait(&self, _req: ObjectId, _timeout: Duration) -> Result<RequestStatus> {
        Err(unsupported(self.name(), "request_wait"))
    }

    /// Cancel a request. On success the request id is released.
    fn request_cancel(&self, _req: ObjectId) -> Result<RequestStatus> {
        Err(unsupported(self.name(), "request_cancel"))
    }

    fn request_notify(&self, _req: ObjectId, _callback: RequestCallback) -> Result<()> {
        Err(unsupported(self.name(), "request_notify"))
    }

    fn request_free(&self, _req: ObjectId) -> Result<()> {
        Err(unsupported(self.name(), "request_free"))
    }
}
