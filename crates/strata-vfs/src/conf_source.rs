//! Configuration loaded from `.conf` files in the VFS.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::vfs::{VfsApi, VfsError, VfsResult};

const CONF_SUFFIX: &str = ".conf";

/// Every `.conf` file below one VFS directory, merged into a single map.
///
/// Files are merged in tree order (a directory's own files first, then its
/// subdirectories by name). Nested maps merge key by key; any other value
/// from a later file replaces the earlier one.
#[derive(Debug, Clone)]
pub struct ConfSource {
    key: String,
}

impl ConfSource {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load and merge the configuration.
    ///
    /// Fails with `NotFound` if the key does not exist and `InvalidInput` if
    /// it is not a directory or a file does not decode to a map.
    pub fn load(&self, vfs: &impl VfsApi) -> VfsResult<Map<String, Value>> {
        debug!(key = %self.key, "loading configuration");
        let Some(node) = vfs.get_node(&self.key) else {
            return Err(VfsError::not_found(format!(
                "VFS path {} does not exist",
                self.key
            )));
        };
        if !node.is_dir() {
            return Err(VfsError::invalid_input(format!(
                "VFS path {} is not a directory",
                self.key
            )));
        }

        let mut merged = Map::new();
        for file in node.get_all_files(true, Some(CONF_SUFFIX)) {
            let Some(resource) = file.latest() else {
                continue;
            };
            let Some(content) = resource.content()? else {
                warn!(file = %file.name(), "configuration file has no content, skipping");
                continue;
            };
            let Some(Value::Object(map)) = content.as_structured() else {
                return Err(VfsError::invalid_input(format!(
                    "configuration file {} is not a map",
                    file.name()
                )));
            };
            debug!(file = %file.name(), version = %resource.version(), "merging configuration");
            merge_maps(&mut merged, map);
        }
        Ok(merged)
    }
}

fn merge_maps(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_maps(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
