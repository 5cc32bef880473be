//! Proxy handles issued by the split connector.

use std::fmt;
use std::sync::Arc;

use dsetsplit_vol::{ObjectId, ObjectType, Vol};

/// Child container owned by a split dataset handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedChild {
    /// Backend file handle on the child.
    pub file: ObjectId,
    pub name: String,
}

/// One backend object, plus the backend that issued it.
///
/// Holding the `Arc` keeps the backend alive while the handle exists. A
/// dataset created through the split path also owns its child container.
pub struct ProxyHandle {
    pub under_object: ObjectId,
    pub under_vol: Arc<dyn Vol>,
    pub obj_type: ObjectType,
    pub(crate) child: Option<OwnedChild>,
}

impl ProxyHandle {
    pub fn new(under_object: ObjectId, under_vol: Arc<dyn Vol>, obj_type: ObjectType) -> Self {
        Self {
            under_object,
            under_vol,
            obj_type,
            child: None,
        }
    }

    /// A dataset handle that closes `child` when the dataset is closed.
    pub fn split_dataset(dataset: ObjectId, child: OwnedChild, under_vol: Arc<dyn Vol>) -> Self {
        Self {
            under_object: dataset,
            under_vol,
            obj_type: ObjectType::Dataset,
            child: Some(child),
        }
    }

    pub fn owns_child(&self) -> bool {
        self.child.is_some()
    }

    pub fn child(&self) -> Option<&OwnedChild> {
        self.child.as_ref()
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("under_object", &self.under_object)
            .field("under_vol", &self.under_vol.name())
            .field("obj_type", &self.obj_type)
            .field("child", &self.child)
            .finish()
    }
}
