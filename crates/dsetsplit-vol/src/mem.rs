//! Reference terminal connector.
//!
//! [`MemVol`] keeps containers in a namespace keyed by container name. With
//! [`MemVol::with_root`] names resolve under a directory: a container image is
//! written there when it is created, flushed, or closed for the last time, and
//! read back when a container that is not cached is opened.
//!
//! A container stays open while any handle refers to it: its file handles and
//! every group, dataset, attribute or datatype opened inside it. Objects
//! reached through an external link keep the *target* container open.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::errstack;
use crate::error::{Result, VolError};
use crate::link::{ExternalLinkTarget, LinkCreate, LinkValue};
use crate::object::{HandleTable, Location, ObjectId, ObjectType};
use crate::property_list::{
    CreateMode, DatasetAccessProps, DatasetCreateProps, FileAccessProps, FileCreateProps,
    LinkAccessProps, LinkCreateProps, OpenMode,
};
use crate::types::{Dataspace, Datatype};
use crate::vol::{RequestCallback, RequestSlot, RequestStatus, Vol, VolCapability};

const ROOT: usize = 0;

/// Configuration for [`MemVol`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemVolConfig {
    /// Hand back an (already completed) request token whenever the caller
    /// offers a request slot.
    pub issue_requests: bool,
}

impl MemVolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue_requests(mut self, on: bool) -> Self {
        self.issue_requests = on;
        self
    }
}

/// In-memory, optionally file-backed, connector.
pub struct MemVol {
    state: Mutex<State>,
}

impl MemVol {
    pub fn new() -> Self {
        Self::with_config(MemVolConfig::default())
    }

    pub fn with_config(config: MemVolConfig) -> Self {
        Self {
            state: Mutex::new(State {
                root: None,
                config,
                containers: HashMap::new(),
                handles: HandleTable::new(),
            }),
        }
    }

    /// Persist containers under `dir`.
    pub fn with_root(mut self, dir: impl AsRef<Path>) -> Self {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.root = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Whether a container called `name` exists (cached or on disk).
    pub fn exists(&self, name: &str) -> bool {
        self.lock().exists(name)
    }

    /// Whether any handle currently keeps `name` open.
    pub fn is_open(&self, name: &str) -> bool {
        self.lock()
            .containers
            .get(name)
            .is_some_and(|c| c.open_refs > 0)
    }

    /// Number of live handles, requests included.
    pub fn open_handles(&self) -> usize {
        self.lock().handles.len()
    }

    /// Names of the containers cached in memory, sorted.
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().containers.keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the state, recording a failure on the error stack.
    fn with_state<T>(&self, op: &str, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let result = f(&mut *self.lock());
        if let Err(e) = &result {
            debug!("memory vol: {op} failed: {e}");
            errstack::push(op, e);
        }
        result
    }
}

impl Default for MemVol {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Container images
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Container {
    fcpl: FileCreateProps,
    fapl: FileAccessProps,
    /// Object arena; `nodes[ROOT]` is the root group.
    nodes: Vec<Node>,
    #[serde(skip)]
    open_refs: usize,
}

impl Container {
    fn new(fcpl: FileCreateProps, fapl: FileAccessProps) -> Self {
        Self {
            fcpl,
            fapl,
            nodes: vec![Node::new(NodeKind::Group {
                links: BTreeMap::new(),
            })],
            open_refs: 0,
        }
    }

    fn push_node(&mut self, kind: NodeKind) -> usize {
        self.nodes.push(Node::new(kind));
        self.nodes.len() - 1
    }

    fn node(&self, idx: usize) -> Result<&Node> {
        self.nodes.get(idx).ok_or_else(|| dangling(idx))
    }

    fn node_mut(&mut self, idx: usize) -> Result<&mut Node> {
        self.nodes.get_mut(idx).ok_or_else(|| dangling(idx))
    }

    fn links(&self, node: usize) -> Result<&BTreeMap<String, Link>> {
        match &self.node(node)?.kind {
            NodeKind::Group { links } => Ok(links),
            other => Err(VolError::WrongType {
                expected: ObjectType::Group,
                actual: other.obj_type(),
            }),
        }
    }

    fn links_mut(&mut self, node: usize) -> Result<&mut BTreeMap<String, Link>> {
        match &mut self.node_mut(node)?.kind {
            NodeKind::Group { links } => Ok(links),
            other => Err(VolError::WrongType {
                expected: ObjectType::Group,
                actual: other.obj_type(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    attrs: BTreeMap<String, Attribute>,
    kind: NodeKind,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            attrs: BTreeMap::new(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum NodeKind {
    Group {
        links: BTreeMap<String, Link>,
    },
    Dataset {
        dtype: Datatype,
        space: Dataspace,
        dcpl: DatasetCreateProps,
        data: Vec<u8>,
    },
    Datatype {
        dtype: Datatype,
    },
}

impl NodeKind {
    fn obj_type(&self) -> ObjectType {
        match self {
            NodeKind::Group { .. } => ObjectType::Group,
            NodeKind::Dataset { .. } => ObjectType::Dataset,
            NodeKind::Datatype { .. } => ObjectType::Datatype,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Link {
    Hard(usize),
    Soft(String),
    External(Vec<u8>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Attribute {
    dtype: Datatype,
    space: Dataspace,
    data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Handle {
    Open(OpenObject),
    Request(RequestStatus),
}

#[derive(Debug, Clone)]
struct OpenObject {
    container: String,
    target: Target,
    obj_type: ObjectType,
    writable: bool,
}

#[derive(Debug, Clone)]
enum Target {
    File,
    Node(usize),
    Attribute { node: usize, name: String },
}

/// Where a path walk ends: a node of a (loaded) container.
type Resolved = (String, usize);

struct State {
    root: Option<PathBuf>,
    config: MemVolConfig,
    containers: HashMap<String, Container>,
    handles: HandleTable<Handle>,
}

impl State {
    fn disk_path(&self, name: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(name))
    }

    fn exists(&self, name: &str) -> bool {
        self.containers.contains_key(name) || self.disk_path(name).is_some_and(|p| p.is_file())
    }

    fn container(&self, name: &str) -> Result<&Container> {
        self.containers
            .get(name)
            .ok_or_else(|| VolError::NotFound(format!("container {name}")))
    }

    fn container_mut(&mut self, name: &str) -> Result<&mut Container> {
        self.containers
            .get_mut(name)
            .ok_or_else(|| VolError::NotFound(format!("container {name}")))
    }

    /// Make sure `name` is cached, reading its image from disk if needed.
    fn load(&mut self, name: &str) -> Result<()> {
        if self.containers.contains_key(name) {
            return Ok(());
        }
        let path = self
            .disk_path(name)
            .filter(|p| p.is_file())
            .ok_or_else(|| VolError::NotFound(format!("container {name}")))?;
        let bytes = std::fs::read(&path)?;
        let image: Container = serde_json::from_slice(&bytes)?;
        trace!("memory vol: loaded {} from {}", name, path.display());
        self.containers.insert(name.to_string(), image);
        Ok(())
    }

    fn persist(&self, name: &str) -> Result<()> {
        if let Some(path) = self.disk_path(name) {
            let bytes = serde_json::to_vec(self.container(name)?)?;
            std::fs::write(&path, bytes)?;
            trace!("memory vol: wrote {}", path.display());
        }
        Ok(())
    }

    fn issue_request(&mut self, req: RequestSlot<'_>) {
        if !self.config.issue_requests {
            return;
        }
        if let Some(slot) = req {
            *slot = Some(self.handles.insert(Handle::Request(RequestStatus::Succeeded)));
        }
    }

    /// Register a new handle; it keeps its container open.
    fn open(&mut self, obj: OpenObject) -> Result<ObjectId> {
        self.container_mut(&obj.container)?.open_refs += 1;
        Ok(self.handles.insert(Handle::Open(obj)))
    }

    fn close(&mut self, id: ObjectId, expected: ObjectType) -> Result<()> {
        let obj = self.object(id)?;
        if obj.obj_type != expected {
            return Err(VolError::WrongType {
                expected,
                actual: obj.obj_type,
            });
        }
        let name = obj.container.clone();
        // The last reference writes the image; a failed write keeps the handle.
        if self.container(&name)?.open_refs <= 1 {
            self.persist(&name)?;
        }
        self.handles.remove(id)?;
        let container = self.container_mut(&name)?;
        container.open_refs = container.open_refs.saturating_sub(1);
        Ok(())
    }

    fn object(&self, id: ObjectId) -> Result<&OpenObject> {
        match self.handles.get(id)? {
            Handle::Open(obj) => Ok(obj),
            Handle::Request(_) => Err(VolError::WrongType {
                expected: ObjectType::File,
                actual: ObjectType::Request,
            }),
        }
    }

    fn typed_object(&self, id: ObjectId, expected: ObjectType) -> Result<&OpenObject> {
        let obj = self.object(id)?;
        if obj.obj_type != expected {
            return Err(VolError::WrongType {
                expected,
                actual: obj.obj_type,
            });
        }
        Ok(obj)
    }

    fn request_mut(&mut self, id: ObjectId) -> Result<&mut RequestStatus> {
        match self.handles.get_mut(id)? {
            Handle::Request(status) => Ok(status),
            Handle::Open(obj) => Err(VolError::WrongType {
                expected: ObjectType::Request,
                actual: obj.obj_type,
            }),
        }
    }

    /// The node a location refers to, plus whether it was opened writable.
    fn anchor(&self, loc: Location) -> Result<(String, usize, bool)> {
        let obj = self.object(loc.id)?;
        if obj.obj_type != loc.obj_type {
            return Err(VolError::WrongType {
                expected: loc.obj_type,
                actual: obj.obj_type,
            });
        }
        let node = match obj.target {
            Target::File => ROOT,
            Target::Node(n) => n,
            Target::Attribute { .. } => {
                return Err(VolError::WrongType {
                    expected: ObjectType::Group,
                    actual: ObjectType::Attribute,
                })
            }
        };
        Ok((obj.container.clone(), node, obj.writable))
    }

    fn writable_anchor(&self, loc: Location) -> Result<(String, usize)> {
        let (container, node, writable) = self.anchor(loc)?;
        if !writable {
            return Err(VolError::ReadOnly(container));
        }
        Ok((container, node))
    }

    fn node(&self, (container, node): &Resolved) -> Result<&Node> {
        self.container(container)?.node(*node)
    }

    fn node_mut(&mut self, (container, node): &Resolved) -> Result<&mut Node> {
        self.container_mut(container)?.node_mut(*node)
    }

    // -- path resolution -----------------------------------------------------

    /// Follow `path` from `start`, traversing soft and external links.
    fn resolve(&mut self, start: Resolved, path: &str, budget: &mut u32) -> Result<Resolved> {
        let (mut container, mut node) = start;
        if path.starts_with('/') {
            node = ROOT;
        }
        for seg in segments(path) {
            let link = self
                .container(&container)?
                .links(node)?
                .get(seg)
                .cloned()
                .ok_or_else(|| VolError::NotFound(format!("{seg} in {path}")))?;
            (container, node) = self.follow((container, node), link, budget)?;
        }
        Ok((container, node))
    }

    fn follow(&mut self, group: Resolved, link: Link, budget: &mut u32) -> Result<Resolved> {
        match link {
            Link::Hard(node) => Ok((group.0, node)),
            Link::Soft(target) => {
                spend(budget)?;
                self.resolve(group, &target, budget)
            }
            Link::External(record) => {
                spend(budget)?;
                let target = ExternalLinkTarget::decode(&record)?;
                self.load(&target.filename)?;
                self.resolve((target.filename, ROOT), &target.object_path, budget)
            }
        }
    }

    /// Resolve every segment of `path` but the last, optionally creating
    /// missing groups. Returns the parent group and the final segment.
    fn resolve_parent(
        &mut self,
        start: Resolved,
        path: &str,
        create_missing: bool,
        budget: &mut u32,
    ) -> Result<(Resolved, String)> {
        let mut segs: Vec<&str> = segments(path).collect();
        let leaf = segs
            .pop()
            .ok_or_else(|| VolError::DataError(format!("no link name in path {path:?}")))?
            .to_string();

        let (mut container, mut node) = start;
        if path.starts_with('/') {
            node = ROOT;
        }
        for seg in segs {
            let existing = self.container(&container)?.links(node)?.get(seg).cloned();
            (container, node) = match existing {
                Some(link) => self.follow((container, node), link, budget)?,
                None if create_missing => {
                    let c = self.container_mut(&container)?;
                    let child = c.push_node(NodeKind::Group {
                        links: BTreeMap::new(),
                    });
                    c.links_mut(node)?.insert(seg.to_string(), Link::Hard(child));
                    (container, child)
                }
                None => return Err(VolError::NotFound(format!("{seg} in {path}"))),
            };
        }
        Ok(((container, node), leaf))
    }

    fn insert_link(&mut self, (container, group): &Resolved, name: &str, link: Link) -> Result<()> {
        let links = self.container_mut(container)?.links_mut(*group)?;
        if links.contains_key(name) {
            return Err(VolError::AlreadyExists(name.to_string()));
        }
        links.insert(name.to_string(), link);
        Ok(())
    }

    /// Create a node and link it at `name`, returning where it landed.
    fn create_object(
        &mut self,
        loc: Location,
        name: &str,
        lcpl: &LinkCreateProps,
        kind: NodeKind,
    ) -> Result<Resolved> {
        let start = self.writable_anchor(loc)?;
        let mut budget = crate::property_list::DEFAULT_MAX_LINK_TRAVERSALS;
        let (parent, leaf) =
            self.resolve_parent(start, name, lcpl.create_intermediate_groups, &mut budget)?;
        if self.container(&parent.0)?.links(parent.1)?.contains_key(&leaf) {
            return Err(VolError::AlreadyExists(name.to_string()));
        }
        let node = self.container_mut(&parent.0)?.push_node(kind);
        self.insert_link(&parent, &leaf, Link::Hard(node))?;
        Ok((parent.0, node))
    }

    /// Resolve `name` from `loc` and open a handle on the object found.
    fn open_object(
        &mut self,
        loc: Location,
        name: &str,
        expected: Option<ObjectType>,
    ) -> Result<(ObjectId, ObjectType)> {
        let (container, node, writable) = self.anchor(loc)?;
        let mut budget = crate::property_list::DEFAULT_MAX_LINK_TRAVERSALS;
        let found = self.resolve((container, node), name, &mut budget)?;
        let obj_type = self.node(&found)?.kind.obj_type();
        if let Some(expected) = expected {
            if obj_type != expected {
                return Err(VolError::WrongType {
                    expected,
                    actual: obj_type,
                });
            }
        }
        let id = self.open(OpenObject {
            container: found.0,
            target: Target::Node(found.1),
            obj_type,
            writable,
        })?;
        Ok((id, obj_type))
    }

    fn dataset_node(&self, id: ObjectId) -> Result<&NodeKind> {
        let obj = self.typed_object(id, ObjectType::Dataset)?;
        let node = target_node(obj)?;
        Ok(&self.container(&obj.container)?.node(node)?.kind)
    }

    fn attribute(&self, id: ObjectId) -> Result<(&OpenObject, &Attribute)> {
        let obj = self.typed_object(id, ObjectType::Attribute)?;
        let Target::Attribute { node, name } = &obj.target else {
            return Err(VolError::InvalidHandle(id));
        };
        let attr = self
            .container(&obj.container)?
            .node(*node)?
            .attrs
            .get(name)
            .ok_or_else(|| VolError::NotFound(format!("attribute {name}")))?;
        Ok((obj, attr))
    }
}

/// A link or handle that names an object the container image does not hold.
fn dangling(idx: usize) -> VolError {
    VolError::DataError(format!("object index {idx} is not in the container image"))
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

fn spend(budget: &mut u32) -> Result<()> {
    *budget = budget
        .checked_sub(1)
        .ok_or_else(|| VolError::DataError("too many soft/external link traversals".into()))?;
    Ok(())
}

fn target_node(obj: &OpenObject) -> Result<usize> {
    match obj.target {
        Target::Node(n) => Ok(n),
        Target::File => Ok(ROOT),
        Target::Attribute { .. } => Err(VolError::WrongType {
            expected: ObjectType::Dataset,
            actual: ObjectType::Attribute,
        }),
    }
}

fn check_len(what: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(VolError::DataError(format!(
            "{what}: buffer is {got} bytes, expected {expected}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Vol implementation
// ---------------------------------------------------------------------------

impl Vol for MemVol {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> Vec<VolCapability> {
        let mut caps = vec![
            VolCapability::ReadData,
            VolCapability::WriteData,
            VolCapability::ListObjects,
            VolCapability::Attributes,
            VolCapability::ChunkedStorage,
            VolCapability::ExternalLinks,
            VolCapability::CommittedDatatypes,
        ];
        if self.lock().config.issue_requests {
            caps.push(VolCapability::AsyncRequests);
        }
        caps
    }

    fn file_create(
        &self,
        name: &str,
        mode: CreateMode,
        fcpl: &FileCreateProps,
        fapl: &FileAccessProps,
        req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        self.with_state("file_create", |st| {
            if st.exists(name) {
                match mode {
                    CreateMode::Exclusive => return Err(VolError::AlreadyExists(name.to_string())),
                    CreateMode::Truncate => {
                        if st.containers.get(name).is_some_and(|c| c.open_refs > 0) {
                            return Err(VolError::Busy(format!("cannot truncate open container {name}")));
                        }
                    }
                }
            }
            st.containers
                .insert(name.to_string(), Container::new(fcpl.clone(), fapl.clone()));
            st.persist(name)?;
            let id = st.open(OpenObject {
                container: name.to_string(),
                target: Target::File,
                obj_type: ObjectType::File,
                writable: true,
            })?;
            debug!("memory vol: created container {name} as {id}");
            st.issue_request(req);
            Ok(id)
        })
    }

    fn file_open(
        &self,
        name: &str,
        mode: OpenMode,
        fapl: &FileAccessProps,
        req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        self.with_state("file_open", |st| {
            st.load(name)?;
            let container = st.container_mut(name)?;
            if container.open_refs > 0 {
                if mode == OpenMode::Exclusive {
                    return Err(VolError::Busy(format!("{name} is already open")));
                }
            } else {
                container.fapl = fapl.clone();
            }
            let id = st.open(OpenObject {
                container: name.to_string(),
                target: Target::File,
                obj_type: ObjectType::File,
                writable: mode.is_writable(),
            })?;
            st.issue_request(req);
            Ok(id)
        })
    }

    fn file_name(&self, obj: Location) -> Result<String> {
        self.with_state("file_name", |st| Ok(st.object(obj.id)?.container.clone()))
    }

    fn file_fcpl(&self, obj: Location) -> Result<FileCreateProps> {
        self.with_state("file_fcpl", |st| {
            let name = &st.object(obj.id)?.container;
            Ok(st.container(name)?.fcpl.clone())
        })
    }

    fn file_fapl(&self, obj: Location) -> Result<FileAccessProps> {
        self.with_state("file_fapl", |st| {
            let name = &st.object(obj.id)?.container;
            Ok(st.container(name)?.fapl.clone())
        })
    }

    fn file_flush(&self, obj: Location, req: RequestSlot<'_>) -> Result<()> {
        self.with_state("file_flush", |st| {
            let name = st.object(obj.id)?.container.clone();
            st.persist(&name)?;
            st.issue_request(req);
            Ok(())
        })
    }

    fn file_close(&self, file: ObjectId, req: RequestSlot<'_>) -> Result<()> {
        self.with_state("file_close", |st| {
            st.close(file, ObjectType::File)?;
            st.issue_request(req);
            Ok(())
        })
    }

    fn group_create(
        &self,
        loc: Location,
        name: &str,
        lcpl: &LinkCreateProps,
        req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        self.with_state("group_create", |st| {
            let (container, node) = st.create_object(
                loc,
                name,
                lcpl,
                NodeKind::Group {
                    links: BTreeMap::new(),
                },
            )?;
            let id = st.open(OpenObject {
                container,
                target: Target::Node(node),
                obj_type: ObjectType::Group,
                writable: true,
            })?;
            st.issue_request(req);
            Ok(id)
        })
    }

    fn group_open(&self, loc: Location, name: &str, req: RequestSlot<'_>) -> Result<ObjectId> {
        self.with_state("group_open", |st| {
            let (id, _) = st.open_object(loc, name, Some(ObjectType::Group))?;
            st.issue_request(req);
            Ok(id)
        })
    }

    fn group_link_count(&self, grp: Location) -> Result<usize> {
        self.with_state("group_link_count", |st| {
            let (container, node, _) = st.anchor(grp)?;
            Ok(st.container(&container)?.links(node)?.len())
        })
    }

    fn group_close(&self, grp: ObjectId, req: RequestSlot<'_>) -> Result<()> {
        self.with_state("group_close", |st| {
            st.close(grp, ObjectType::Group)?;
            st.issue_request(req);
            Ok(())
        })
    }

    fn dataset_create(
        &self,
        loc: Location,
        name: &str,
        lcpl: &LinkCreateProps,
        dtype: &Datatype,
        space: &Dataspace,
        dcpl: &DatasetCreateProps,
        _dapl: &DatasetAccessProps,
        req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        self.with_state("dataset_create", |st| {
            if let Some(chunk) = &dcpl.chunk_dims {
                if chunk.len() != space.rank() || chunk.contains(&0) {
                    return Err(VolError::DataError(format!(
                        "chunk dims {chunk:?} do not fit dataspace {:?}",
                        space.dims()
                    )));
                }
            }
            let len = space.byte_len(*dtype)?;
            let data = match &dcpl.fill_value {
                Some(fill) => {
                    check_len("fill value", fill.len(), dtype.size())?;
                    fill.iter().copied().cycle().take(len).collect()
                }
                None => vec![0u8; len],
            };
            let (container, node) = st.create_object(
                loc,
                name,
                lcpl,
                NodeKind::Dataset {
                    dtype: *dtype,
                    space: space.clone(),
                    dcpl: dcpl.clone(),
                    data,
                },
            )?;
            let id = st.open(OpenObject {
                container,
                target: Target::Node(node),
                obj_type: ObjectType::Dataset,
                writable: true,
            })?;
            st.issue_request(req);
            Ok(id)
        })
    }

    fn dataset_open(
        &self,
        loc: Location,
        name: &str,
        _dapl: &DatasetAccessProps,
        req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        self.with_state("dataset_open", |st| {
            let (id, _) = st.open_object(loc, name, Some(ObjectType::Dataset))?;
            st.issue_request(req);
            Ok(id)
        })
    }

    fn dataset_read(&self, dset: ObjectId, req: RequestSlot<'_>) -> Result<Vec<u8>> {
        self.with_state("dataset_read", |st| {
            let NodeKind::Dataset { data, .. } = st.dataset_node(dset)? else {
                return Err(VolError::InvalidHandle(dset));
            };
            let data = data.clone();
            st.issue_request(req);
            Ok(data)
        })
    }

    fn dataset_write(&self, dset: ObjectId, buf: &[u8], req: RequestSlot<'_>) -> Result<()> {
        self.with_state("dataset_write", |st| {
            let obj = st.typed_object(dset, ObjectType::Dataset)?;
            if !obj.writable {
                return Err(VolError::ReadOnly(obj.container.clone()));
            }
            let at = (obj.container.clone(), target_node(obj)?);
            let NodeKind::Dataset { data, .. } = &mut st.node_mut(&at)?.kind else {
                return Err(VolError::InvalidHandle(dset));
            };
            check_len("dataset write", buf.len(), data.len())?;
            data.copy_from_slice(buf);
            st.issue_request(req);
            Ok(())
        })
    }

    fn dataset_space(&self, dset: ObjectId) -> Result<Dataspace> {
        self.with_state("dataset_space", |st| match st.dataset_node(dset)? {
            NodeKind::Dataset { space, .. } => Ok(space.clone()),
            _ => Err(VolError::InvalidHandle(dset)),
        })
    }

    fn dataset_type(&self, dset: ObjectId) -> Result<Datatype> {
        self.with_state("dataset_type", |st| match st.dataset_node(dset)? {
            NodeKind::Dataset { dtype, .. } => Ok(*dtype),
            _ => Err(VolError::InvalidHandle(dset)),
        })
    }

    fn dataset_dcpl(&self, dset: ObjectId) -> Result<DatasetCreateProps> {
        self.with_state("dataset_dcpl", |st| match st.dataset_node(dset)? {
            NodeKind::Dataset { dcpl, .. } => Ok(dcpl.clone()),
            _ => Err(VolError::InvalidHandle(dset)),
        })
    }

    fn dataset_close(&self, dset: ObjectId, req: RequestSlot<'_>) -> Result<()> {
        self.with_state("dataset_close", |st| {
            st.close(dset, ObjectType::Dataset)?;
            st.issue_request(req);
            Ok(())
        })
    }

    fn attr_create(
        &self,
        loc: Location,
        name: &str,
        dtype: &Datatype,
        space: &Dataspace,
        req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        self.with_state("attr_create", |st| {
            let at = st.writable_anchor(loc)?;
            let len = space.byte_len(*dtype)?;
            let node = st.node_mut(&at)?;
            if node.attrs.contains_key(name) {
                return Err(VolError::AlreadyExists(format!("attribute {name}")));
            }
            node.attrs.insert(
                name.to_string(),
                Attribute {
                    dtype: *dtype,
                    space: space.clone(),
                    data: vec![0u8; len],
                },
            );
            let id = st.open(OpenObject {
                container: at.0,
                target: Target::Attribute {
                    node: at.1,
                    name: name.to_string(),
                },
                obj_type: ObjectType::Attribute,
                writable: true,
            })?;
            st.issue_request(req);
            Ok(id)
        })
    }

    fn attr_open(&self, loc: Location, name: &str, req: RequestSlot<'_>) -> Result<ObjectId> {
        self.with_state("attr_open", |st| {
            let (container, node, writable) = st.anchor(loc)?;
            if !st.container(&container)?.node(node)?.attrs.contains_key(name) {
                return Err(VolError::NotFound(format!("attribute {name}")));
            }
            let id = st.open(OpenObject {
                container,
                target: Target::Attribute {
                    node,
                    name: name.to_string(),
                },
                obj_type: ObjectType::Attribute,
                writable,
            })?;
            st.issue_request(req);
            Ok(id)
        })
    }

    fn attr_read(&self, attr: ObjectId, req: RequestSlot<'_>) -> Result<Vec<u8>> {
        self.with_state("attr_read", |st| {
            let data = st.attribute(attr)?.1.data.clone();
            st.issue_request(req);
            Ok(data)
        })
    }

    fn attr_write(&self, attr: ObjectId, buf: &[u8], req: RequestSlot<'_>) -> Result<()> {
        self.with_state("attr_write", |st| {
            let (obj, current) = st.attribute(attr)?;
            if !obj.writable {
                return Err(VolError::ReadOnly(obj.container.clone()));
            }
            check_len("attribute write", buf.len(), current.data.len())?;
            let Target::Attribute { node, name } = obj.target.clone() else {
                return Err(VolError::InvalidHandle(attr));
            };
            let at = (obj.container.clone(), node);
            if let Some(stored) = st.node_mut(&at)?.attrs.get_mut(&name) {
                stored.data.copy_from_slice(buf);
            }
            st.issue_request(req);
            Ok(())
        })
    }

    fn attr_exists(&self, loc: Location, name: &str) -> Result<bool> {
        self.with_state("attr_exists", |st| {
            let (container, node, _) = st.anchor(loc)?;
            Ok(st.container(&container)?.node(node)?.attrs.contains_key(name))
        })
    }

    fn attr_close(&self, attr: ObjectId, req: RequestSlot<'_>) -> Result<()> {
        self.with_state("attr_close", |st| {
            st.close(attr, ObjectType::Attribute)?;
            st.issue_request(req);
            Ok(())
        })
    }

    fn datatype_commit(
        &self,
        loc: Location,
        name: &str,
        dtype: &Datatype,
        lcpl: &LinkCreateProps,
        req: RequestSlot<'_>,
    ) -> Result<ObjectId> {
        self.with_state("datatype_commit", |st| {
            let (container, node) =
                st.create_object(loc, name, lcpl, NodeKind::Datatype { dtype: *dtype })?;
            let id = st.open(OpenObject {
                container,
                target: Target::Node(node),
                obj_type: ObjectType::Datatype,
                writable: true,
            })?;
            st.issue_request(req);
            Ok(id)
        })
    }

    fn datatype_open(&self, loc: Location, name: &str, req: RequestSlot<'_>) -> Result<ObjectId> {
        self.with_state("datatype_open", |st| {
            let (id, _) = st.open_object(loc, name, Some(ObjectType::Datatype))?;
            st.issue_request(req);
            Ok(id)
        })
    }

    fn datatype_get(&self, dt: ObjectId) -> Result<Datatype> {
        self.with_state("datatype_get", |st| {
            let obj = st.typed_object(dt, ObjectType::Datatype)?;
            let at = (obj.container.clone(), target_node(obj)?);
            match &st.node(&at)?.kind {
                NodeKind::Datatype { dtype } => Ok(*dtype),
                _ => Err(VolError::InvalidHandle(dt)),
            }
        })
    }

    fn datatype_close(&self, dt: ObjectId, req: RequestSlot<'_>) -> Result<()> {
        self.with_state("datatype_close", |st| {
            st.close(dt, ObjectType::Datatype)?;
            st.issue_request(req);
            Ok(())
        })
    }

    fn link_create(
        &self,
        link: LinkCreate<'_>,
        loc: Location,
        name: &str,
        lcpl: &LinkCreateProps,
        lapl: &LinkAccessProps,
        req: RequestSlot<'_>,
    ) -> Result<()> {
        self.with_state("link_create", |st| {
            let start = st.writable_anchor(loc)?;
            let mut budget = lapl.max_traversals;
            let stored = match link {
                LinkCreate::Hard {
                    target,
                    target_name,
                } => {
                    let (container, node, _) = st.anchor(target)?;
                    let found = st.resolve((container, node), target_name, &mut budget)?;
                    if found.0 != start.0 {
                        return Err(VolError::DataError(format!(
                            "hard link cannot point from {} into {}",
                            start.0, found.0
                        )));
                    }
                    Link::Hard(found.1)
                }
                LinkCreate::Soft { target_path } => Link::Soft(target_path.to_string()),
                LinkCreate::External { record } => {
                    ExternalLinkTarget::decode(record)?;
                    Link::External(record.to_vec())
                }
            };
            let (parent, leaf) =
                st.resolve_parent(start, name, lcpl.create_intermediate_groups, &mut budget)?;
            st.insert_link(&parent, &leaf, stored)?;
            st.issue_request(req);
            Ok(())
        })
    }

    fn link_exists(&self, loc: Location, name: &str, lapl: &LinkAccessProps) -> Result<bool> {
        self.with_state("link_exists", |st| {
            let (container, node, _) = st.anchor(loc)?;
            let mut budget = lapl.max_traversals;
            match st.resolve_parent((container, node), name, false, &mut budget) {
                Ok((parent, leaf)) => Ok(st.container(&parent.0)?.links(parent.1)?.contains_key(&leaf)),
                Err(VolError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    fn link_value(&self, loc: Location, name: &str, lapl: &LinkAccessProps) -> Result<LinkValue> {
        self.with_state("link_value", |st| {
            let (container, node, _) = st.anchor(loc)?;
            let mut budget = lapl.max_traversals;
            let (parent, leaf) = st.resolve_parent((container, node), name, false, &mut budget)?;
            let link = st
                .container(&parent.0)?
                .links(parent.1)?
                .get(&leaf)
                .ok_or_else(|| VolError::NotFound(format!("link {name}")))?;
            Ok(match link {
                Link::Hard(_) => LinkValue::Hard,
                Link::Soft(path) => LinkValue::Soft(path.clone()),
                Link::External(record) => LinkValue::External(record.clone()),
            })
        })
    }

    fn link_delete(
        &self,
        loc: Location,
        name: &str,
        lapl: &LinkAccessProps,
        req: RequestSlot<'_>,
    ) -> Result<()> {
        self.with_state("link_delete", |st| {
            let start = st.writable_anchor(loc)?;
            let mut budget = lapl.max_traversals;
            let (parent, leaf) = st.resolve_parent(start, name, false, &mut budget)?;
            st.container_mut(&parent.0)?
                .links_mut(parent.1)?
                .remove(&leaf)
                .ok_or_else(|| VolError::NotFound(format!("link {name}")))?;
            st.issue_request(req);
            Ok(())
        })
    }

    fn object_open(
        &self,
        loc: Location,
        name: &str,
        req: RequestSlot<'_>,
    ) -> Result<(ObjectId, ObjectType)> {
        self.with_state("object_open", |st| {
            let opened = st.open_object(loc, name, None)?;
            st.issue_request(req);
            Ok(opened)
        })
    }

    fn request_wait(&self, req: ObjectId, _timeout: Duration) -> Result<RequestStatus> {
        self.with_state("request_wait", |st| Ok(*st.request_mut(req)?))
    }

    fn request_cancel(&self, req: ObjectId) -> Result<RequestStatus> {
        self.with_state("request_cancel", |st| {
            let status = st.request_mut(req)?;
            if *status == RequestStatus::InProgress {
                *status = RequestStatus::Canceled;
            }
            let status = *status;
            st.handles.remove(req)?;
            Ok(status)
        })
    }

    fn request_notify(&self, req: ObjectId, callback: RequestCallback) -> Result<()> {
        let status = self.with_state("request_notify", |st| Ok(*st.request_mut(req)?))?;
        callback(status);
        Ok(())
    }

    fn request_free(&self, req: ObjectId) -> Result<()> {
        self.with_state("request_free", |st| {
            st.request_mut(req)?;
            st.handles.remove(req)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_file(vol: &MemVol, name: &str) -> ObjectId {
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
    fn memory_vol_name() {
        let vol = MemVol::new();
        assert_eq!(vol.name(), "memory");
        assert!(vol.supports(VolCapability::ExternalLinks));
        assert!(!vol.supports(VolCapability::AsyncRequests));
    }

    #[test]
    fn file_refcount_follows_handles() {
        let vol = MemVol::new();
        let f = new_file(&vol, "a.h5");
        let g = vol
            .group_create(Location::file(f), "g", &LinkCreateProps::default(), None)
            .unwrap();
        vol.file_close(f, None).unwrap();
        assert!(vol.is_open("a.h5"), "group keeps the container open");
        vol.group_close(g, None).unwrap();
        assert!(!vol.is_open("a.h5"));
        assert_eq!(vol.open_handles(), 0);
    }

    #[test]
    fn close_with_wrong_type_keeps_handle() {
        let vol = MemVol::new();
        let f = new_file(&vol, "a.h5");
        assert!(matches!(
            vol.dataset_close(f, None),
            Err(VolError::WrongType { .. })
        ));
        vol.file_close(f, None).unwrap();
        assert!(matches!(vol.file_close(f, None), Err(VolError::InvalidHandle(_))));
    }

    #[test]
    fn truncate_refuses_open_container() {
        let vol = MemVol::new();
        let f = new_file(&vol, "a.h5");
        let err = vol
            .file_create(
                "a.h5",
                CreateMode::Truncate,
                &FileCreateProps::default(),
                &FileAccessProps::default(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, VolError::Busy(_)));
        vol.file_close(f, None).unwrap();
        let again = new_file(&vol, "a.h5");
        vol.file_close(again, None).unwrap();
    }

    #[test]
    fn soft_link_loop_is_bounded() {
        let vol = MemVol::new();
        let f = new_file(&vol, "a.h5");
        let loc = Location::file(f);
        let lcpl = LinkCreateProps::default();
        let lapl = LinkAccessProps::default();
        vol.link_create(LinkCreate::Soft { target_path: "/b" }, loc, "a", &lcpl, &lapl, None)
            .unwrap();
        vol.link_create(LinkCreate::Soft { target_path: "/a" }, loc, "b", &lcpl, &lapl, None)
            .unwrap();
        let err = vol.object_open(loc, "a", None).unwrap_err();
        assert!(err.to_string().contains("too many"));
    }

    #[test]
    fn dangling_link_is_a_data_error() {
        let vol = MemVol::new();
        let f = new_file(&vol, "a.h5");
        vol.lock()
            .container_mut("a.h5")
            .unwrap()
            .links_mut(ROOT)
            .unwrap()
            .insert("broken".into(), Link::Hard(99));

        let loc = Location::file(f);
        assert!(matches!(vol.object_open(loc, "broken", None), Err(VolError::DataError(_))));
        assert!(matches!(
            vol.object_open(loc, "broken/deeper", None),
            Err(VolError::DataError(_))
        ));
        assert_eq!(vol.open_handles(), 1);
        vol.file_close(f, None).unwrap();
    }

    #[test]
    fn failures_land_on_error_stack() {
        errstack::clear();
        let vol = MemVol::new();
        assert!(vol
            .file_open("missing.h5", OpenMode::ReadOnly, &FileAccessProps::default(), None)
            .is_err());
        let stack = errstack::current();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].op, "file_open");
        errstack::clear();
    }

    #[test]
    fn requests_are_issued_when_configured() {
        let vol = MemVol::with_config(MemVolConfig::new().issue_requests(true));
        assert!(vol.supports(VolCapability::AsyncRequests));
        let mut req = None;
        let f = vol
            .file_create(
                "a.h5",
                CreateMode::Truncate,
                &FileCreateProps::default(),
                &FileAccessProps::default(),
                Some(&mut req),
            )
            .unwrap();
        let req = req.expect("request token");
        assert_eq!(
            vol.request_wait(req, Duration::from_millis(1)).unwrap(),
            RequestStatus::Succeeded
        );
        assert!(matches!(
            vol.request_wait(f, Duration::ZERO),
            Err(VolError::WrongType { .. })
        ));
        vol.request_free(req).unwrap();
        assert!(vol.request_free(req).is_err());
        vol.file_close(f, None).unwrap();
    }
}
