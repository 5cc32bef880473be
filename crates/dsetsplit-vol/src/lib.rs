//! Backend capability for stacked container connectors.
//!
//! Defines the object model every connector speaks: object ids and
//! locations, property lists, element types and dataspaces, links, the
//! [`Vol`] trait itself, and a per-thread error stack. [`MemVol`] is a
//! complete terminal connector that keeps containers in memory and can
//! persist them under a directory.

pub mod error;
pub mod errstack;
pub mod link;
pub mod mem;
pub mod object;
pub mod property_list;
pub mod types;
pub mod vol;

pub use error::{Result, VolError};
pub use link::{ExternalLinkTarget, LinkCreate, LinkValue};
pub use mem::{MemVol, MemVolConfig};
pub use object::{HandleTable, Location, ObjectId, ObjectType};
pub use property_list::{
    CreateMode, DatasetAccessProps, DatasetCreateProps, FileAccessProps, FileCreateProps,
    LinkAccessProps, LinkCreateProps, OpenMode,
};
pub use types::{Dataspace, Datatype};
pub use vol::{RequestCallback, RequestSlot, RequestStatus, Vol, VolCapability};
