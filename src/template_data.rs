//! The immutable snapshot every template renders from.
use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::ir::{EnumTypeInfo, ImageTypeInfo, Operation};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateData {
    version: String,
    #[serde(serialize_with = "values_in_order")]
    operations: IndexMap<String, Operation>,
    enum_types: Vec<EnumTypeInfo>,
    image_types: Vec<ImageTypeInfo>,
    include_test: bool,
}

/// Pure: identical inputs always give structurally equal snapshots.
pub fn aggregate(
    operations: IndexMap<String, Operation>,
    enum_types: Vec<EnumTypeInfo>,
    image_types: Vec<ImageTypeInfo>,
    version: impl Into<String>,
    include_test: bool,
) -> TemplateData {
    TemplateData {
        version: version.into(),
        operations,
        enum_types,
        image_types,
        include_test,
    }
}

impl TemplateData {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    pub fn enum_types(&self) -> &[EnumTypeInfo] {
        &self.enum_types
    }

    pub fn image_types(&self) -> &[ImageTypeInfo] {
        &self.image_types
    }

    pub fn include_test(&self) -> bool {
        self.include_test
    }
}

// templates iterate operations as a list
fn values_in_order<S: Serializer>(
    operations: &IndexMap<String, Operation>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(operations.values())
}
