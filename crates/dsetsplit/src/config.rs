//! Connector configuration.

use std::fmt;
use std::sync::Arc;

use dsetsplit_vol::Vol;
use serde::{Deserialize, Serialize};

/// Knobs for naming and stamping child containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Appended to every child container name.
    pub extension: String,
    /// Name of the scalar `i32` attribute written to each child root.
    pub marker_attribute: String,
    /// Parent base name used when the parent's name is unavailable.
    pub fallback_base: String,
    /// Trailing suffix removed from the parent's name.
    pub strip_suffix: String,
    /// Append a sequence number when several names fall in the same second.
    pub unique_suffix: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            extension: ".split".into(),
            marker_attribute: "split_file".into(),
            fallback_base: "Split".into(),
            strip_suffix: ".h5".into(),
            unique_suffix: true,
        }
    }
}

impl SplitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object; missing keys keep their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    pub fn marker_attribute(mut self, name: impl Into<String>) -> Self {
        self.marker_attribute = name.into();
        self
    }

    pub fn fallback_base(mut self, base: impl Into<String>) -> Self {
        self.fallback_base = base.into();
        self
    }

    pub fn strip_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.strip_suffix = suffix.into();
        self
    }

    pub fn unique_suffix(mut self, on: bool) -> Self {
        self.unique_suffix = on;
        self
    }
}

/// The backend to stack on, together with this connector's configuration.
///
/// Cloning shares the backend.
#[derive(Clone)]
pub struct ConnectorInfo {
    pub under_vol: Arc<dyn Vol>,
    pub config: SplitConfig,
}

impl ConnectorInfo {
    pub fn new(under_vol: Arc<dyn Vol>) -> Self {
        Self {
            under_vol,
            config: SplitConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SplitConfig) -> Self {
        self.config = config;
        self
    }
}

impl fmt::Debug for ConnectorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorInfo")
            .field("under_vol", &self.under_vol.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsetsplit_vol::MemVol;

    #[test]
    fn defaults_match_on_disk_convention() {
        let c = SplitConfig::default();
        assert_eq!(c.extension, ".split");
        assert_eq!(c.marker_attribute, "split_file");
        assert_eq!(c.fallback_base, "Split");
        assert_eq!(c.strip_suffix, ".h5");
        assert!(c.unique_suffix);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = SplitConfig::from_json(r#"{ "extension": ".part", "unique_suffix": false }"#)
            .unwrap();
        assert_eq!(c, SplitConfig::new().extension(".part").unique_suffix(false));
        assert!(SplitConfig::from_json("[1, 2]").is_err());
    }

    #[test]
    fn info_clone_shares_backend() {
        let info = ConnectorInfo::new(Arc::new(MemVol::new()));
        let copy = info.clone();
        assert!(Arc::ptr_eq(&info.under_vol, &copy.under_vol));
        assert_eq!(Arc::strong_count(&info.under_vol), 2);
        assert!(format!("{copy:?}").contains("memory"));
    }
}
