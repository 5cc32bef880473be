//! The split connector.
//!
//! [`DsetSplitVol`] stacks on another [`Vol`]. Every id it hands out is a
//! [`ProxyHandle`] around the backend's id; calls unwrap, forward, and wrap
//! whatever new ids (objects or request tokens) come back. Dataset creation
//! is the one operation with behavior of its own, see [`crate::split`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dsetsplit_vol::errstack::{self, ErrorContext};
use dsetsplit_vol::{
    CreateMode, DatasetAccessProps, DatasetCreateProps, Dataspace, Datatype, FileAccessProps,
    FileCreateProps, HandleTable, LinkAccessProps, LinkCreate, LinkCreateProps, LinkValue,
    Location, ObjectId, ObjectType, OpenMode, RequestCallback, RequestSlot, RequestStatus,
    Result, Vol, VolCapability, VolError,
};
use log::{debug, warn};

use crate::config::ConnectorInfo;
use crate::error::SplitError;
use crate::handle::{OwnedChild, ProxyHandle};
use crate::naming::NameSynthesizer;
use crate::split::{create_split_dataset, DatasetCreateArgs};
use crate::CONNECTOR_NAME;

/// Pass-through connector that splits every new dataset into its own
/// child container.
pub struct DsetSplitVol {
    info: ConnectorInfo,
    names: NameSynthesizer,
    handles: Mutex<HandleTable<ProxyHandle>>,
}

impl DsetSplitVol {
    pub fn new(info: ConnectorInfo) -> Self {
        Self::with_names(info, NameSynthesizer::new())
    }

    /// Use a custom name synthesizer (e.g. one with a fixed clock).
    pub fn with_names(info: ConnectorInfo, names: NameSynthesizer) -> Self {
        debug!(
            "{CONNECTOR_NAME}: stacking on {} with {:?}",
            info.under_vol.name(),
            info.config
        );
        Self {
            info,
            names,
            handles: Mutex::new(HandleTable::new()),
        }
    }

    pub fn info(&self) -> &ConnectorInfo {
        &self.info
    }

    pub fn under_vol(&self) -> &Arc<dyn Vol> {
        &self.info.under_vol
    }

    /// Whether `id` is a dataset handle that owns a child container.
    pub fn owns_child(&self, id: ObjectId) -> Result<bool> {
        Ok(self.lock().get(id)?.owns_child())
    }

    /// Name of the child container owned by `id`, if any.
    pub fn child_name(&self, id: ObjectId) -> Result<Option<String>> {
        Ok(self.lock().get(id)?.child().map(|c| c.name.clone()))
    }

    /// Number of live proxy handles.
    pub fn handle_count(&self) -> usize {
        self.lock().len()
    }

    /// Strong references to the backend: the connector's own plus one per
    /// live handle and per other holder of the same `ConnectorInfo`.
    pub fn backend_refs(&self) -> usize {
        Arc::strong_count(&self.info.under_vol)
    }

    fn lock(&self) -> MutexGuard<'_, HandleTable<ProxyHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, handle: ProxyHandle) -> ObjectId {
        self.lock().insert(handle)
    }

    fn wrap(&self, under: ObjectId, obj_type: ObjectType) -> ObjectId {
        self.insert(ProxyHandle::new(under, Arc::clone(&self.info.under_vol), obj_type))
    }

    fn release(&self, id: ObjectId) -> Result<()> {
        self.lock().remove(id).map(drop)
    }

    fn under(&self, id: ObjectId) -> Result<ObjectId> {
        Ok(self.lock().get(id)?.under_object)
    }

    fn under_typed(&self, id: ObjectId, expected: ObjectType) -> Result<ObjectId> {
        let handles = self.lock();
        let handle = handles.get(id)?;
        if handle.obj_type != expected {
            return Err(VolError::WrongType {
                expected,
                actual: handle.obj_type,
            });
        }
        Ok(handle.under_object)
    }

    fn under_loc(&self, loc: Location) -> Result<Location> {
        Ok(Location::new(self.under(loc.id)?, loc.obj_type))
    }

    /// Run a backend call, wrapping any request token it hands back.
    ///
    /// A token issued by a call that then failed is freed on the backend and
    /// the caller's slot is left empty.
    fn forward<T>(
        &self,
        req: RequestSlot<'_>,
        call: impl FnOnce(RequestSlot<'_>) -> Result<T>,
    ) -> Result<T> {
        let Some(slot) = req else {
            return call(None);
        };
        let mut under_req = None;
        let result = call(Some(&mut under_req));
        if let Some(token) = under_req {
            if result.is_ok() {
                *slot = Some(self.wrap(token, ObjectType::Request));
            } else {
                let _ctx = ErrorContext::save();
                if let Err(e) = self.under_vol().request_free(token) {
                    debug!("{CONNECTOR_NAME}: freeing request {token} of a failed call: {e}");
                }
            }
        }
        result
    }
}

/// Generates the forwarding methods.
///
/// * `query` - no request slot, result returned as is
/// * `call` - takes a request slot, result returned as is
/// * `open` - takes a request slot, the new backend id is wrapped
/// * `close` - takes a request slot, the proxy is released on success
macro_rules! pass_through {
    (query $method:ident(id $(, $arg:ident: $ty:ty)*) -> $ret:ty) => {
        fn $method(&self, id: ObjectId $(, $arg: $ty)*) -> Result<$ret> {
            let under = self.under(id)?;
            self.under_vol().$method(under $(, $arg)*)
        }
    };
    (query $method:ident(loc $(, $arg:ident: $ty:ty)*) -> $ret:ty) => {
        fn $method(&self, loc: Location $(, $arg: $ty)*) -> Result<$ret> {
            let under = self.under_loc(loc)?;
            self.under_vol().$method(under $(, $arg)*)
        }
    };
    (call $method:ident(id $(, $arg:ident: $ty:ty)*) -> $ret:ty) => {
        fn $method(&self, id: ObjectId $(, $arg: $ty)*, req: RequestSlot<'_>) -> Result<$ret> {
            let under = self.under(id)?;
            self.forward(req, |r| self.under_vol().$method(under $(, $arg)*, r))
        }
    };
    (call $method:ident(loc $(, $arg:ident: $ty:ty)*) -> $ret:ty) => {
        fn $method(&self, loc: Location $(, $arg: $ty)*, req: RequestSlot<'_>) -> Result<$ret> {
            let under = self.under_loc(loc)?;
            self.forward(req, |r| self.under_vol().$method(under $(, $arg)*, r))
        }
    };
    (open $method:ident(loc $(, $arg:ident: $ty:ty)*) -> $kind:expr) => {
        fn $method(&self, loc: Location $(, $arg: $ty)*, req: RequestSlot<'_>) -> Result<ObjectId> {
            let under = self.under_loc(loc)?;
            let id = self.forward(req, |r| self.under_vol().$method(under $(, $arg)*, r))?;
            debug!("{}: {} -> {}", CONNECTOR_NAME, stringify!($method), $kind);
            Ok(self.wrap(id, $kind))
        }
    };
    (close $method:ident -> $kind:expr) => {
        fn $method(&self, id: ObjectId, req: RequestSlot<'_>) -> Result<()> {
            let under = self.under_typed(id, $kind)?;
            self.forward(req, |r| self.under_vol().$method(under, r))?;
            self.release(id)
        }
    };
}

impl Vol for DsetSplitVol {
    fn name(&self) -> &str {
        CONNECTOR_NAME
    }

    fn capabilities(&self) -> Vec<VolCapability> {
        self.info.under_vol.capabilities()
    }

    // -- files ---------------------------------------------------------------

    fn file_create(
        &self,
        name: &str,
        mode: CreateMode,
        fcpl: &FileCreateProps,
        fapl: &FileAccessProps,
        req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        let under = self.forward(req, |r| self.under_vol().file_create(name, mode, fcpl, fapl, r))?;
        debug!("{CONNECTOR_NAME}: created file {name}");
        Ok(self.wrap(under, ObjectType::File))
    }

    fn file_open(
        &self,
        name: &str,
        mode: OpenMode,
        fapl: &FileAccessProps,
        req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        let under = self.forward(req, |r| self.under_vol().file_open(name, mode, fapl, r))?;
        debug!("{CONNECTOR_NAME}: opened file {name} ({mode:?})");
        Ok(self.wrap(under, ObjectType::File))
    }

    pass_through!(query file_name(loc) -> String);
    pass_through!(query file_fcpl(loc) -> FileCreateProps);
    pass_through!(query file_fapl(loc) -> FileAccessProps);
    pass_through!(call file_flush(loc) -> ());
    pass_through!(close file_close -> ObjectType::File);

    // -- groups --------------------------------------------------------------

    pass_through!(open group_create(loc, name: &str, lcpl: &LinkCreateProps) -> ObjectType::Group);
    pass_through!(open group_open(loc, name: &str) -> ObjectType::Group);
    pass_through!(query group_link_count(loc) -> usize);
    pass_through!(close group_close -> ObjectType::Group);

    // -- datasets ------------------------------------------------------------

    fn dataset_create(
        &self,
        loc: Location,
        name: &str,
        lcpl: &LinkCreateProps,
        dtype: &Datatype,
        space: &Dataspace,
        dcpl: &DatasetCreateProps,
        dapl: &DatasetAccessProps,
        req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        let parent = self.under_loc(loc)?;
        let args = DatasetCreateArgs {
            path: name,
            lcpl,
            dtype,
            space,
            dcpl,
            dapl,
        };
        let split = self
            .forward(req, |r| {
                create_split_dataset(
                    self.under_vol().as_ref(),
                    &self.info.config,
                    &self.names,
                    parent,
                    &args,
                    r,
                )
                .map_err(VolError::from)
            })
            .map_err(|e| {
                warn!("{CONNECTOR_NAME}: dataset_create {name} failed: {e}");
                errstack::push("dataset_create", &e);
                e
            })?;

        let child = OwnedChild {
            file: split.child_file,
            name: split.child_name,
        };
        Ok(self.insert(ProxyHandle::split_dataset(
            split.dataset,
            child,
            Arc::clone(&self.info.under_vol),
        )))
    }

    pass_through!(open dataset_open(loc, name: &str, dapl: &DatasetAccessProps) -> ObjectType::Dataset);
    pass_through!(call dataset_read(id) -> Vec<u8>);
    pass_through!(call dataset_write(id, data: &[u8]) -> ());
    pass_through!(query dataset_space(id) -> Dataspace);
    pass_through!(query dataset_type(id) -> Datatype);
    pass_through!(query dataset_dcpl(id) -> DatasetCreateProps);

    /// Close the dataset, then the child container it owns.
    ///
    /// The child is closed even when the dataset close fails; the proxy is
    /// only released once the dataset close succeeds. A failed dataset close
    /// is reported unchanged, otherwise a failed child close is reported as
    /// [`SplitError::ChildClose`].
    fn dataset_close(&self, dset: ObjectId, req: RequestSlot<'_>) -> Result<()> {
        let (under, child) = {
            let handles = self.lock();
            let handle = handles.get(dset)?;
            if handle.obj_type != ObjectType::Dataset {
                return Err(VolError::WrongType {
                    expected: ObjectType::Dataset,
                    actual: handle.obj_type,
                });
            }
            (handle.under_object, handle.child.clone())
        };

        let closed = self.forward(req, |r| self.under_vol().dataset_close(under, r));

        let child_closed = match child {
            Some(child) => {
                // Keep the dataset-close failure as the caller's error state.
                let _ctx = closed.is_err().then(ErrorContext::save);
                match self.under_vol().file_close(child.file, None) {
                    Ok(()) => {
                        debug!("{CONNECTOR_NAME}: closed child {}", child.name);
                        if let Ok(handle) = self.lock().get_mut(dset) {
                            handle.child = None;
                        }
                        Ok(())
                    }
                    Err(source) => {
                        warn!("{CONNECTOR_NAME}: closing child {} failed: {source}", child.name);
                        Err(SplitError::ChildClose {
                            child_file: child.name,
                            source,
                        })
                    }
                }
            }
            None => Ok(()),
        };

        if let Err(e) = closed {
            warn!("{CONNECTOR_NAME}: dataset_close failed, keeping handle {dset}: {e}");
            return Err(e);
        }
        self.release(dset)?;
        child_closed.map_err(|e| {
            let e = VolError::from(e);
            errstack::push("dataset_close", &e);
            e
        })
    }

    // -- attributes ----------------------------------------------------------

    pass_through!(open attr_create(loc, name: &str, dtype: &Datatype, space: &Dataspace) -> ObjectType::Attribute);
    pass_through!(open attr_open(loc, name: &str) -> ObjectType::Attribute);
    pass_through!(call attr_read(id) -> Vec<u8>);
    pass_through!(call attr_write(id, data: &[u8]) -> ());
    pass_through!(query attr_exists(loc, name: &str) -> bool);
    pass_through!(close attr_close -> ObjectType::Attribute);

    // -- committed datatypes -------------------------------------------------

    pass_through!(open datatype_commit(loc, name: &str, dtype: &Datatype, lcpl: &LinkCreateProps) -> ObjectType::Datatype);
    pass_through!(open datatype_open(loc, name: &str) -> ObjectType::Datatype);
    pass_through!(query datatype_get(id) -> Datatype);
    pass_through!(close datatype_close -> ObjectType::Datatype);

    // -- links ---------------------------------------------------------------

    fn link_create(
        &self,
        link: LinkCreate<'_>,
        loc: Location,
        name: &str,
        lcpl: &LinkCreateProps,
        lapl: &LinkAccessProps,
        req: RequestSlot<'_>,
    ) -> Result<()> {
        let link = match link {
            LinkCreate::Hard {
                target,
                target_name,
            } => LinkCreate::Hard {
                target: self.under_loc(target)?,
                target_name,
            },
            other => other,
        };
        let under = self.under_loc(loc)?;
        self.forward(req, |r| {
            self.under_vol().link_create(link, under, name, lcpl, lapl, r)
        })
    }

    pass_through!(query link_exists(loc, name: &str, lapl: &LinkAccessProps) -> bool);
    pass_through!(query link_value(loc, name: &str, lapl: &LinkAccessProps) -> LinkValue);
    pass_through!(call link_delete(loc, name: &str, lapl: &LinkAccessProps) -> ());

    // -- objects -------------------------------------------------------------

    fn object_open(
        &self,
        loc: Location,
        name: &str,
        req: RequestSlot<'_>,
    ) -> Result<(ObjectId, ObjectType)> {
        let under = self.under_loc(loc)?;
        let (id, kind) = self.forward(req, |r| self.under_vol().object_open(under, name, r))?;
        Ok((self.wrap(id, kind), kind))
    }

    // -- requests ------------------------------------------------------------

    fn request_wait(&self, req: ObjectId, timeout: Duration) -> Result<RequestStatus> {
        let under = self.under_typed(req, ObjectType::Request)?;
        self.under_vol().request_wait(under, timeout)
    }

    fn request_cancel(&self, req: ObjectId) -> Result<RequestStatus> {
        let under = self.under_typed(req, ObjectType::Request)?;
        let status = self.under_vol().request_cancel(under)?;
        self.release(req)?;
        Ok(status)
    }

    fn request_notify(&self, req: ObjectId, callback: RequestCallback) -> Result<()> {
        let under = self.under_typed(req, ObjectType::Request)?;
        self.under_vol().request_notify(under, callback)
    }

    fn request_free(&self, req: ObjectId) -> Result<()> {
        let under = self.under_typed(req, ObjectType::Request)?;
        self.under_vol().request_free(under)?;
        self.release(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsetsplit_vol::MemVol;

    fn connector() -> DsetSplitVol {
        DsetSplitVol::new(ConnectorInfo::new(Arc::new(MemVol::new())))
    }

    fn create_file(vol: &DsetSplitVol, name: &str) -> ObjectId {
        vol.file_create(
            name,
            CreateMode::Truncate,
            &FileCreateProps::default(),
            &FileAccessProps::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn identity() {
        let vol = connector();
        assert_eq!(vol.name(), "dset-split");
        assert!(vol.supports(VolCapability::ExternalLinks));
    }

    #[test]
    fn proxies_hold_the_backend() {
        let vol = connector();
        assert_eq!(vol.backend_refs(), 1);
        let f = create_file(&vol, "a.h5");
        let g = vol
            .group_create(Location::file(f), "g", &LinkCreateProps::default(), None)
            .unwrap();
        assert_eq!(vol.handle_count(), 2);
        assert_eq!(vol.backend_refs(), 3);
        vol.group_close(g, None).unwrap();
        vol.file_close(f, None).unwrap();
        assert_eq!(vol.handle_count(), 0);
        assert_eq!(vol.backend_refs(), 1);
    }

    #[test]
    fn closing_with_the_wrong_kind_is_refused() {
        let vol = connector();
        let f = create_file(&vol, "a.h5");
        assert!(matches!(
            vol.group_close(f, None),
            Err(VolError::WrongType { .. })
        ));
        assert!(matches!(
            vol.dataset_close(f, None),
            Err(VolError::WrongType { .. })
        ));
        assert_eq!(vol.handle_count(), 1);
        vol.file_close(f, None).unwrap();
    }

    #[test]
    fn unknown_ids_are_invalid() {
        let vol = connector();
        let bogus = ObjectId::from_raw(99);
        assert!(matches!(
            vol.dataset_read(bogus, None),
            Err(VolError::InvalidHandle(_))
        ));
        assert!(matches!(
            vol.file_name(Location::file(bogus)),
            Err(VolError::InvalidHandle(_))
        ));
    }

    #[test]
    fn hard_link_target_is_unwrapped() {
        let vol = connector();
        let f = create_file(&vol, "a.h5");
        let loc = Location::file(f);
        let g = vol
            .group_create(loc, "g", &LinkCreateProps::default(), None)
            .unwrap();
        vol.link_create(
            LinkCreate::Hard {
                target: Location::group(g),
                target_name: ".",
            },
            loc,
            "alias",
            &LinkCreateProps::default(),
            &LinkAccessProps::default(),
            None,
        )
        .unwrap();
        let (obj, kind) = vol.object_open(loc, "alias", None).unwrap();
        assert_eq!(kind, ObjectType::Group);
        assert!(!vol.owns_child(obj).unwrap());
        vol.group_close(obj, None).unwrap();
        vol.group_close(g, None).unwrap();
        vol.file_close(f, None).unwrap();
    }
}
