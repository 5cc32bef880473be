//! Dataset-split VOL connector.
//!
//! Stacks on any [`Vol`](dsetsplit_vol::Vol) backend and gives every dataset
//! created through it a container of its own. The dataset stays reachable at
//! the path the caller asked for through an external link in the parent:
//!
//! ```text
//! application ──▶ DsetSplitVol ──▶ backend (e.g. MemVol)
//!                     │
//!                     ├─ dataset_create: child container + external link
//!                     ├─ dataset_close:  closes the child too
//!                     └─ everything else: forwarded, ids re-wrapped
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dsetsplit::{ConnectorInfo, DsetSplitVol};
//! use dsetsplit_vol::{
//!     CreateMode, DatasetAccessProps, DatasetCreateProps, Dataspace, Datatype,
//!     FileAccessProps, FileCreateProps, LinkCreateProps, Location, MemVol, Vol,
//! };
//!
//! let vol = DsetSplitVol::new(ConnectorInfo::new(Arc::new(MemVol::new())));
//! let file = vol
//!     .file_create("master.h5", CreateMode::Truncate, &FileCreateProps::default(),
//!                  &FileAccessProps::default(), None)
//!     .unwrap();
//! let dset = vol
//!     .dataset_create(Location::file(file), "temperature", &LinkCreateProps::default(),
//!                     &Datatype::F64, &Dataspace::simple(&[8]),
//!                     &DatasetCreateProps::default(), &DatasetAccessProps::default(), None)
//!     .unwrap();
//! assert!(vol.child_name(dset).unwrap().unwrap().starts_with("master-temperature-"));
//! vol.dataset_close(dset, None).unwrap();
//! vol.file_close(file, None).unwrap();
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod handle;
pub mod link_record;
pub mod naming;
pub mod registry;
pub mod split;

/// Registered connector name.
pub const CONNECTOR_NAME: &str = "dset-split";

/// Registered connector value.
pub const CONNECTOR_VALUE: i32 = 909;

/// Connector version.
pub const CONNECTOR_VERSION: u32 = 0;

pub use config::{ConnectorInfo, SplitConfig};
pub use connector::DsetSplitVol;
pub use error::{Result, SplitError};
pub use handle::{OwnedChild, ProxyHandle};
pub use link_record::encode_external_link;
pub use naming::NameSynthesizer;
pub use registry::{register, registered, unregister, ConnectorHandle};
pub use split::{create_split_dataset, DatasetCreateArgs, SplitDataset, MARKER_VALUE};
