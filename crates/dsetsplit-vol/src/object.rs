//! Opaque object references and the id-indexed handle table connectors use
//! to issue them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolError};

/// Opaque reference to an object issued by a VOL connector.
///
/// Ids are only meaningful to the connector that issued them; layers above
/// pass them back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Build an id from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value of this id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of object an [`ObjectId`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    File,
    Group,
    Dataset,
    Attribute,
    Datatype,
    Request,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectType::File => "file",
            ObjectType::Group => "group",
            ObjectType::Dataset => "dataset",
            ObjectType::Attribute => "attribute",
            ObjectType::Datatype => "datatype",
            ObjectType::Request => "request",
        };
        f.write_str(s)
    }
}

/// The object an operation is anchored at, together with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub id: ObjectId,
    pub obj_type: ObjectType,
}

impl Location {
    pub const fn new(id: ObjectId, obj_type: ObjectType) -> Self {
        Self { id, obj_type }
    }

    /// A file (its root group).
    pub const fn file(id: ObjectId) -> Self {
        Self::new(id, ObjectType::File)
    }

    pub const fn group(id: ObjectId) -> Self {
        Self::new(id, ObjectType::Group)
    }

    pub const fn dataset(id: ObjectId) -> Self {
        Self::new(id, ObjectType::Dataset)
    }
}

/// Id-indexed arena of live handles.
///
/// Ids are issued from a monotonically increasing counter starting at 1 and
/// are never reused within one table.
#[derive(Debug)]
pub struct HandleTable<T> {
    next: u64,
    entries: HashMap<ObjectId, T>,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            next: 1,
            entries: HashMap::new(),
        }
    }

    /// Store `value` and return the id that now refers to it.
    pub fn insert(&mut self, value: T) -> ObjectId {
        let id = ObjectId(self.next);
        self.next += 1;
        self.entries.insert(id, value);
        id
    }

    pub fn get(&self, id: ObjectId) -> Result<&T> {
        self.entries.get(&id).ok_or(VolError::InvalidHandle(id))
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut T> {
        self.entries.get_mut(&id).ok_or(VolError::InvalidHandle(id))
    }

    /// Remove the entry for `id`, handing ownership back to the caller.
    pub fn remove(&mut self, id: ObjectId) -> Result<T> {
        self.entries.remove(&id).ok_or(VolError::InvalidHandle(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
