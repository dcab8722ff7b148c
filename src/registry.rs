//! Type registry reader.
//!
//! Raw records mirror what GObject introspection of the native library
//! reports: bit flags, GType names and loosely typed defaults. The raw call
//! into the native reflection API lives outside this crate; what reaches us
//! is a [`Registry`] implementation. [`SnapshotRegistry`] serves a JSON dump
//! of that registry, keeping document order so discovery is deterministic.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

// ---- VipsArgumentFlags ---- //
pub const ARG_REQUIRED: u32 = 1;
pub const ARG_CONSTRUCT: u32 = 2;
pub const ARG_SET_ONCE: u32 = 4;
pub const ARG_SET_ALWAYS: u32 = 8;
pub const ARG_INPUT: u32 = 16;
pub const ARG_OUTPUT: u32 = 32;
pub const ARG_DEPRECATED: u32 = 64;
pub const ARG_MODIFY: u32 = 128;

// ---- VipsOperationFlags ---- //
pub const OP_DEPRECATED: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOperation {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub arguments: Vec<RawArgument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArgument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// GType name, e.g. `gdouble`, `VipsImage`, `VipsKernel`
    pub type_name: String,
    /// fundamental GType name, e.g. `GEnum`, `GFlags`, `GObject`
    #[serde(default)]
    pub fundamental: String,
    pub flags: u32,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEnum {
    pub name: String,
    #[serde(default)]
    pub flags: bool,
    pub values: Vec<RawEnumValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEnumValue {
    pub name: String,
    pub nick: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawImageType {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
}

/// Everything the native registry reports in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: String,
    #[serde(default)]
    pub operations: Vec<RawOperation>,
    #[serde(default)]
    pub enum_types: Vec<RawEnum>,
    #[serde(default)]
    pub image_types: Vec<RawImageType>,
}

/// Read-only view of the native operation registry.
///
/// Implementations must report every registered item exactly once and in an
/// order that is stable across runs against the same native build.
pub trait Registry {
    fn version(&self) -> Result<String>;
    fn operations(&self) -> Result<Vec<RawOperation>>;
    fn enum_types(&self) -> Result<Vec<RawEnum>>;
    fn image_types(&self) -> Result<Vec<RawImageType>>;
}

#[derive(Debug, Clone)]
pub struct SnapshotRegistry {
    origin: PathBuf,
    snapshot: RegistrySnapshot,
}

impl SnapshotRegistry {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|error| {
            Error::Discovery(format!("cannot read registry snapshot {}: {error}", path.display()))
        })?;
        let snapshot: RegistrySnapshot = crate::path_de::from_slice_with_path(&bytes, path)?;
        if snapshot.version.trim().is_empty() {
            return Err(Error::Discovery(format!(
                "{}: registry reports no library version",
                path.display()
            )));
        }
        debug!(path = %path.display(), "loaded registry snapshot");
        Ok(Self { origin: path.to_path_buf(), snapshot })
    }

    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self { origin: PathBuf::from("<memory>"), snapshot }
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }
}

impl Registry for SnapshotRegistry {
    fn version(&self) -> Result<String> {
        Ok(self.snapshot.version.clone())
    }
    fn operations(&self) -> Result<Vec<RawOperation>> {
        Ok(self.snapshot.operations.clone())
    }
    fn enum_types(&self) -> Result<Vec<RawEnum>> {
        Ok(self.snapshot.enum_types.clone())
    }
    fn image_types(&self) -> Result<Vec<RawImageType>> {
        Ok(self.snapshot.image_types.clone())
    }
}

/// Raw discovery results, in registry order.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub version: String,
    pub operations: Vec<RawOperation>,
    pub enum_types: Vec<RawEnum>,
    pub image_types: Vec<RawImageType>,
}

/// Query the registry once for everything generation needs.
pub fn discover(registry: &dyn Registry) -> Result<Discovery> {
    let version = registry.version()?;
    let image_types = registry.image_types()?;
    let operations = registry.operations()?;
    let enum_types = registry.enum_types()?;
    info!(
        %version,
        operations = operations.len(),
        enum_types = enum_types.len(),
        image_types = image_types.len(),
        "discovered registry"
    );
    Ok(Discovery { version, operations, enum_types, image_types })
}
