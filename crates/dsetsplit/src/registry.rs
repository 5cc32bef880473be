//! Process-wide connector registration.
//!
//! At most one split connector is registered at a time. Registering again
//! while one is registered returns the existing connector and ignores the new
//! info; [`unregister`] clears the slot so the next [`register`] starts fresh.

use std::sync::{Arc, Mutex, PoisonError};

use log::info;

use crate::config::ConnectorInfo;
use crate::connector::DsetSplitVol;
use crate::{CONNECTOR_NAME, CONNECTOR_VALUE, CONNECTOR_VERSION};

/// Shared handle on the registered connector.
pub type ConnectorHandle = Arc<DsetSplitVol>;

static REGISTERED: Mutex<Option<ConnectorHandle>> = Mutex::new(None);

/// Register a connector built from `info`, or return the one already
/// registered.
pub fn register(info: ConnectorInfo) -> ConnectorHandle {
    let mut slot = REGISTERED.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = slot.as_ref() {
        return Arc::clone(existing);
    }
    info!(
        "registering {CONNECTOR_NAME} (value {CONNECTOR_VALUE}, version {CONNECTOR_VERSION}) over {}",
        info.under_vol.name()
    );
    let handle = Arc::new(DsetSplitVol::new(info));
    *slot = Some(Arc::clone(&handle));
    handle
}

/// The registered connector, if any.
pub fn registered() -> Option<ConnectorHandle> {
    REGISTERED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Clear the registration, returning the connector that was registered.
///
/// Holders of the returned handle (or earlier clones) keep it usable.
pub fn unregister() -> Option<ConnectorHandle> {
    let previous = REGISTERED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if previous.is_some() {
        info!("unregistered {CONNECTOR_NAME}");
    }
    previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsetsplit_vol::{MemVol, Vol};

    // The registry is global, so the whole lifecycle runs in one test.
    #[test]
    fn register_lifecycle() {
        unregister();
        assert!(registered().is_none());

        let first = register(ConnectorInfo::new(Arc::new(MemVol::new())));
        let again = register(ConnectorInfo::new(Arc::new(MemVol::new())));
        assert!(Arc::ptr_eq(&first, &again));
        assert!(Arc::ptr_eq(&first, &registered().unwrap()));
        assert_eq!(first.name(), CONNECTOR_NAME);

        let taken = unregister().unwrap();
        assert!(Arc::ptr_eq(&first, &taken));
        assert!(registered().is_none());
        assert!(unregister().is_none());

        let fresh = register(ConnectorInfo::new(Arc::new(MemVol::new())));
        assert!(!Arc::ptr_eq(&first, &fresh));
        unregister();
    }
}
