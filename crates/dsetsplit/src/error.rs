use dsetsplit_vol::VolError;

use crate::CONNECTOR_NAME;

/// Errors raised by the steps the split connector performs itself.
///
/// Backend failures are carried as the `source`, so the original
/// [`VolError`] stays reachable through [`std::error::Error::source`].
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("no dataset name in path {0:?}")]
    EmptyDatasetName(String),

    #[error("interior NUL byte in external link field {0:?}")]
    InteriorNul(String),

    /// Retrieving the parent's property lists or creating the child failed.
    #[error("failed to create child container {child}")]
    ChildCreate {
        child: String,
        #[source]
        source: VolError,
    },

    #[error("failed to write marker attribute on {child}")]
    MarkerAttribute {
        child: String,
        #[source]
        source: VolError,
    },

    #[error("failed to create dataset {leaf} in {child}")]
    DatasetCreate {
        child: String,
        leaf: String,
        #[source]
        source: VolError,
    },

    /// The child exists and holds the dataset, but the parent has no link to it.
    #[error("failed to install external link {path} -> {child}")]
    LinkInstall {
        path: String,
        child: String,
        #[source]
        source: VolError,
    },

    #[error("failed to close child container {child_file}")]
    ChildClose {
        child_file: String,
        #[source]
        source: VolError,
    },
}

impl SplitError {
    /// The child container this error left behind, if any.
    pub fn orphan(&self) -> Option<&str> {
        match self {
            SplitError::MarkerAttribute { child, .. }
            | SplitError::DatasetCreate { child, .. }
            | SplitError::LinkInstall { child, .. } => Some(child),
            _ => None,
        }
    }
}

impl From<SplitError> for VolError {
    fn from(err: SplitError) -> Self {
        VolError::Connector {
            connector: CONNECTOR_NAME.to_string(),
            source: Box::new(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;
