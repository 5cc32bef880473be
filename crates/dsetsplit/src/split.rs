//! Split-create: put a new dataset in its own child container.
//!
//! ```text
//!   parent.h5                         parent-dset-<ts>.split
//!   ┌──────────────────────┐          ┌──────────────────────┐
//!   │ /grp/dset ──external─┼────────▶ │ @split_file = 1      │
//!   │                      │          │ /dset  (the data)    │
//!   └──────────────────────┘          └──────────────────────┘
//! ```
//!
//! Steps run in order and the first failure aborts. Nothing already done is
//! undone: a failure after the child was created leaves it on disk, and the
//! returned error names it (see [`SplitError::orphan`]).

use dsetsplit_vol::errstack::ErrorContext;
use dsetsplit_vol::{
    CreateMode, DatasetAccessProps, DatasetCreateProps, Dataspace, Datatype, LinkAccessProps,
    LinkCreate, LinkCreateProps, Location, ObjectId, RequestSlot, Vol, VolError,
};
use log::{debug, warn};

use crate::config::SplitConfig;
use crate::error::{Result, SplitError};
use crate::link_record::encode_external_link;
use crate::naming::{dataset_leaf_name, parent_base_name, NameSynthesizer};

/// Value of the marker attribute written to every child root.
pub const MARKER_VALUE: i32 = 1;

/// Caller arguments of a dataset create.
#[derive(Debug, Clone, Copy)]
pub struct DatasetCreateArgs<'a> {
    /// Path of the new dataset, relative to the location or absolute.
    pub path: &'a str,
    pub lcpl: &'a LinkCreateProps,
    pub dtype: &'a Datatype,
    pub space: &'a Dataspace,
    pub dcpl: &'a DatasetCreateProps,
    pub dapl: &'a DatasetAccessProps,
}

/// Backend objects produced by a successful split-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDataset {
    /// The dataset, at the root of the child container.
    pub dataset: ObjectId,
    /// Open file handle on the child container.
    pub child_file: ObjectId,
    pub child_name: String,
}

/// Create `args.path` under `parent` with its storage in a fresh child
/// container.
///
/// A request token the backend issues for the dataset create is stored in
/// `req`.
pub fn create_split_dataset(
    vol: &dyn Vol,
    config: &SplitConfig,
    names: &NameSynthesizer,
    parent: Location,
    args: &DatasetCreateArgs<'_>,
    req: RequestSlot<'_>,
) -> Result<SplitDataset> {
    let leaf = dataset_leaf_name(args.path)
        .ok_or_else(|| SplitError::EmptyDatasetName(args.path.to_string()))?;

    let parent_name = query_parent_name(vol, parent);
    let base = parent_base_name(parent_name.as_deref(), config);
    let child_name = names.child_name(base, leaf, config);
    debug!("split: {} -> {child_name}", args.path);

    let child_file = create_child(vol, parent, &child_name)?;

    write_marker(vol, child_file, config).map_err(|source| {
        warn!("split: marker attribute on {child_name} failed: {source}");
        SplitError::MarkerAttribute {
            child: child_name.clone(),
            source,
        }
    })?;

    let dataset = vol
        .dataset_create(
            Location::file(child_file),
            leaf,
            args.lcpl,
            args.dtype,
            args.space,
            args.dcpl,
            args.dapl,
            req,
        )
        .map_err(|source| {
            warn!("split: dataset {leaf} in {child_name} failed: {source}");
            SplitError::DatasetCreate {
                child: child_name.clone(),
                leaf: leaf.to_string(),
                source,
            }
        })?;

    let record = encode_external_link(&child_name, &format!("/{leaf}"))?;
    vol.link_create(
        LinkCreate::External { record: &record },
        parent,
        args.path,
        args.lcpl,
        &LinkAccessProps::default(),
        None,
    )
    .map_err(|source| {
        warn!("split: link {} -> {child_name} failed: {source}", args.path);
        SplitError::LinkInstall {
            path: args.path.to_string(),
            child: child_name.clone(),
            source,
        }
    })?;

    debug!("split: {} stored in {child_name}", args.path);
    Ok(SplitDataset {
        dataset,
        child_file,
        child_name,
    })
}

/// Name of the container holding `parent`, if the backend can tell.
fn query_parent_name(vol: &dyn Vol, parent: Location) -> Option<String> {
    // A failed lookup only selects the fallback name.
    let _ctx = ErrorContext::save();
    match vol.file_name(parent) {
        Ok(name) => Some(name),
        Err(e) => {
            debug!("split: parent name unavailable ({e}), using fallback");
            None
        }
    }
}

/// Create the child with copies of the parent's creation and access lists.
fn create_child(vol: &dyn Vol, parent: Location, child_name: &str) -> Result<ObjectId> {
    let wrap = |source: VolError| {
        warn!("split: child container {child_name} failed: {source}");
        SplitError::ChildCreate {
            child: child_name.to_string(),
            source,
        }
    };
    let fcpl = vol.file_fcpl(parent).map_err(wrap)?;
    let fapl = vol.file_fapl(parent).map_err(wrap)?;
    vol.file_create(child_name, CreateMode::Truncate, &fcpl, &fapl, None)
        .map_err(wrap)
}

fn write_marker(vol: &dyn Vol, child_file: ObjectId, config: &SplitConfig) -> dsetsplit_vol::Result<()> {
    let attr = vol.attr_create(
        Location::file(child_file),
        &config.marker_attribute,
        &Datatype::I32,
        &Dataspace::Scalar,
        None,
    )?;
    let written = vol.attr_write(attr, bytemuck::bytes_of(&MARKER_VALUE), None);
    let closed = vol.attr_close(attr, None);
    written.and(closed)
}
