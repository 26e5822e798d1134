//! Versioned resources attached to file nodes.

use std::cell::OnceCell;
use std::fmt;

use serde_json::{Value, json};
use tracing::{debug, error};

use super::connector::Connector;
use super::content::Content;
use super::descriptor::Descriptor;
use super::error::{VfsError, VfsResult};
use super::version::ResourceVersion;

/// One version of a file's content.
///
/// Content is loaded through the descriptor's connector on first access and
/// memoized for the lifetime of the resource. The memo is a plain
/// [`OnceCell`], so a `Resource` is `Send` but not `Sync`: tree access is
/// single-threaded and must be serialized by the caller.
#[derive(Clone, PartialEq)]
pub struct Resource {
    version: ResourceVersion,
    descriptor: Descriptor,
    content: OnceCell<Option<Content>>,
}

impl Resource {
    pub fn new(version: ResourceVersion, descriptor: impl Into<Descriptor>) -> Self {
        Self {
            version,
            descriptor: descriptor.into(),
            content: OnceCell::new(),
        }
    }

    pub fn version(&self) -> ResourceVersion {
        self.version
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Mutable descriptor access. Drops any memoized content, since it may no
    /// longer match.
    pub(crate) fn descriptor_mut(&mut self) -> &mut Descriptor {
        self.content = OnceCell::new();
        &mut self.descriptor
    }

    pub fn is_loaded(&self) -> bool {
        self.content.get().is_some()
    }

    /// The resource content, loading it on first access.
    ///
    /// A successful load, including an absent result, is cached. Errors are
    /// not cached; the next access retries.
    pub fn content(&self) -> VfsResult<Option<&Content>> {
        if let Some(content) = self.content.get() {
            return Ok(content.as_ref());
        }

        let loaded = Connector::for_descriptor(&self.descriptor).load(&self.descriptor)?;
        debug!(
            location = %self.descriptor.location(),
            version = %self.version,
            kind = loaded.as_ref().map(Content::kind).unwrap_or("absent"),
            "resource content loaded"
        );
        Ok(self.content.get_or_init(|| loaded).as_ref())
    }

    /// Serialize as `{version, descriptor}`.
    pub fn serialize(&self) -> Value {
        json!({
            "version": self.version.to_value(),
            "descriptor": self.descriptor.to_value(),
        })
    }

    /// Parse a `{version, descriptor}` map.
    pub fn deserialize(data: &Value) -> VfsResult<Self> {
        let Some(version) = data.get("version") else {
            error!("no resource version in serialized data");
            return Err(VfsError::invalid_input(
                "no resource version specified in the serialized data",
            ));
        };
        let version = ResourceVersion::from_value(version)?;

        let Some(descriptor) = data.get("descriptor") else {
            error!("no descriptor in serialized resource");
            return Err(VfsError::invalid_input(
                "no descriptor found in the serialized resource",
            ));
        };
        if !descriptor.is_object() {
            error!("resource descriptor is not a map");
            return Err(VfsError::invalid_input(format!(
                "resource descriptor must be a map, got: {descriptor}"
            )));
        }

        Ok(Self::new(version, Descriptor::from_value(descriptor)?))
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("version", &self.version)
            .field("descriptor", &self.descriptor)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
