//! Enum and object-type catalog.
//!
//! Enum members keep their registry order and exact numeric values; they are
//! passed straight through to the native call. The object-type hierarchy is
//! validated once (known parents, single root, no cycles) and is afterwards
//! only used to classify object-typed arguments.
use indexmap::IndexMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ir::{EnumMember, EnumTypeInfo, ImageTypeInfo, ObjectClass};
use crate::naming;
use crate::registry::{RawEnum, RawImageType};

/// Sentinel member libvips appends to most enums.
const SENTINEL_NICK: &str = "last";

/// Well-known roots an object type is classified by, nearest first.
const CLASS_ROOTS: &[(&str, ObjectClass)] = &[
    ("VipsImage", ObjectClass::Image),
    ("VipsSource", ObjectClass::Source),
    ("VipsTarget", ObjectClass::Target),
    ("VipsInterpolate", ObjectClass::Interpolate),
];

pub fn normalize_enum(raw: &RawEnum) -> Result<EnumTypeInfo> {
    let mut members: Vec<EnumMember> = Vec::with_capacity(raw.values.len());
    for value in &raw.values {
        if value.nick == SENTINEL_NICK {
            continue;
        }
        let name = naming::identifier(&value.nick);
        if members.iter().any(|m| m.name == name) {
            return Err(Error::Schema(format!(
                "enum {} reports member `{name}` twice",
                raw.name
            )));
        }
        members.push(EnumMember {
            name,
            native_name: value.name.clone(),
            value: value.value,
        });
    }
    Ok(EnumTypeInfo { name: raw.name.clone(), flags: raw.flags, members })
}

pub fn normalize_image_type(raw: &RawImageType) -> ImageTypeInfo {
    ImageTypeInfo {
        name: raw.name.clone(),
        parent: raw.parent.clone().filter(|p| !p.is_empty()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    enums: IndexMap<String, EnumTypeInfo>,
    image_types: IndexMap<String, ImageTypeInfo>,
}

impl Catalog {
    pub fn build(raw_enums: &[RawEnum], raw_image_types: &[RawImageType]) -> Result<Self> {
        let mut enums = IndexMap::with_capacity(raw_enums.len());
        for raw in raw_enums {
            let info = normalize_enum(raw)?;
            if enums.insert(info.name.clone(), info).is_some() {
                return Err(Error::Schema(format!("enum type {} reported twice", raw.name)));
            }
        }

        let mut image_types = IndexMap::with_capacity(raw_image_types.len());
        for raw in raw_image_types {
            let info = normalize_image_type(raw);
            if image_types.insert(info.name.clone(), info).is_some() {
                return Err(Error::Schema(format!("object type {} reported twice", raw.name)));
            }
        }
        validate_hierarchy(&image_types)?;

        debug!(enums = enums.len(), image_types = image_types.len(), "built type catalog");
        Ok(Self { enums, image_types })
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumTypeInfo> {
        self.enums.get(name)
    }

    pub fn image_type(&self, name: &str) -> Option<&ImageTypeInfo> {
        self.image_types.get(name)
    }

    /// The type itself followed by its ancestors up to the root.
    pub fn lineage<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ImageTypeInfo> + 'a {
        let start = self.image_types.get(name);
        // bounded even though the hierarchy was validated acyclic
        std::iter::successors(start, move |t| {
            t.parent.as_deref().and_then(|p| self.image_types.get(p))
        })
        .take(self.image_types.len())
    }

    /// `None` when the type is not part of the catalog at all.
    pub fn classify(&self, type_name: &str) -> Option<ObjectClass> {
        self.image_types.get(type_name)?;
        let class = self
            .lineage(type_name)
            .find_map(|t| {
                CLASS_ROOTS
                    .iter()
                    .find(|(root, _)| *root == t.name)
                    .map(|(_, class)| *class)
            })
            .unwrap_or(ObjectClass::Other);
        Some(class)
    }

    pub fn into_parts(self) -> (Vec<EnumTypeInfo>, Vec<ImageTypeInfo>) {
        (
            self.enums.into_values().collect(),
            self.image_types.into_values().collect(),
        )
    }
}

fn validate_hierarchy(types: &IndexMap<String, ImageTypeInfo>) -> Result<()> {
    let mut roots = Vec::new();
    for t in types.values() {
        match &t.parent {
            None => roots.push(t.name.as_str()),
            Some(parent) if !types.contains_key(parent) => {
                return Err(Error::Schema(format!(
                    "object type {} names unknown parent {parent}",
                    t.name
                )));
            }
            Some(_) => {}
        }
    }
    if !types.is_empty() && roots.len() != 1 {
        return Err(Error::Schema(format!(
            "object type hierarchy must have exactly one root, found {}: [{}]",
            roots.len(),
            roots.join(", ")
        )));
    }

    // any walk longer than the catalog revisits a node
    for t in types.values() {
        let mut steps = 0usize;
        let mut cursor = t.parent.as_deref();
        while let Some(parent) = cursor {
            steps += 1;
            if steps > types.len() {
                return Err(Error::Schema(format!(
                    "object type hierarchy has a cycle through {}",
                    t.name
                )));
            }
            cursor = types.get(parent).and_then(|p| p.parent.as_deref());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RawEnumValue;

    fn kernel() -> RawEnum {
        let v = |name: &str, nick: &str, value| RawEnumValue {
            name: name.into(),
            nick: nick.into(),
            value,
        };
        RawEnum {
            name: "VipsKernel".into(),
            flags: false,
            values: vec![
                v("VIPS_KERNEL_NEAREST", "nearest", 0),
                v("VIPS_KERNEL_LINEAR", "linear", 1),
                v("VIPS_KERNEL_MITCHELL", "mitchell", 4),
                v("VIPS_KERNEL_LANCZOS3", "lanczos3", 5),
                v("VIPS_KERNEL_MKS2013", "mks2013", 6),
                v("VIPS_KERNEL_LAST", "last", 8),
            ],
        }
    }

    fn types(pairs: &[(&str, Option<&str>)]) -> Vec<RawImageType> {
        pairs
            .iter()
            .map(|(name, parent)| RawImageType {
                name: name.to_string(),
                parent: parent.map(str::to_string),
            })
            .collect()
    }

    #[test]
    fn enum_keeps_order_and_values_and_skips_sentinel() {
        let info = normalize_enum(&kernel()).unwrap();
        let got: Vec<_> = info.members.iter().map(|m| (m.name.as_str(), m.value)).collect();
        assert_eq!(
            got,
            [("nearest", 0), ("linear", 1), ("mitchell", 4), ("lanczos3", 5), ("mks2013", 6)]
        );
        assert_eq!(info.member_by_value(5).unwrap().native_name, "VIPS_KERNEL_LANCZOS3");
    }

    #[test]
    fn duplicate_enum_member_is_schema_error() {
        let mut raw = kernel();
        raw.values.push(RawEnumValue { name: "X".into(), nick: "linear".into(), value: 9 });
        assert!(matches!(normalize_enum(&raw), Err(Error::Schema(_))));
    }

    #[test]
    fn classify_walks_to_nearest_known_root() {
        let catalog = Catalog::build(
            &[],
            &types(&[
                ("VipsObject", None),
                ("VipsImage", Some("VipsObject")),
                ("VipsConnection", Some("VipsObject")),
                ("VipsSource", Some("VipsConnection")),
                ("VipsSourceCustom", Some("VipsSource")),
                ("VipsInterpolate", Some("VipsObject")),
                ("VipsRegion", Some("VipsObject")),
            ]),
        )
        .unwrap();
        assert_eq!(catalog.classify("VipsImage"), Some(ObjectClass::Image));
        assert_eq!(catalog.classify("VipsSourceCustom"), Some(ObjectClass::Source));
        assert_eq!(catalog.classify("VipsInterpolate"), Some(ObjectClass::Interpolate));
        assert_eq!(catalog.classify("VipsRegion"), Some(ObjectClass::Other));
        assert_eq!(catalog.classify("GObject"), None);
        let lineage: Vec<_> = catalog.lineage("VipsSourceCustom").map(|t| t.name.as_str()).collect();
        assert_eq!(lineage, ["VipsSourceCustom", "VipsSource", "VipsConnection", "VipsObject"]);
    }

    #[test]
    fn cyclic_hierarchy_is_fatal() {
        let err = Catalog::build(
            &[],
            &types(&[
                ("VipsObject", None),
                ("A", Some("B")),
                ("B", Some("C")),
                ("C", Some("A")),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Schema(ref m) if m.contains("cycle")), "{err}");
    }

    #[test]
    fn unknown_parent_and_extra_roots_are_fatal() {
        let unknown = Catalog::build(&[], &types(&[("VipsImage", Some("VipsObject"))]));
        assert!(matches!(unknown, Err(Error::Schema(_))));
        let two_roots = Catalog::build(&[], &types(&[("VipsObject", None), ("GObject", None)]));
        assert!(matches!(two_roots, Err(Error::Schema(ref m)) if m.contains("exactly one root")));
    }

    #[test]
    fn duplicate_enum_type_is_fatal() {
        assert!(matches!(Catalog::build(&[kernel(), kernel()], &[]), Err(Error::Schema(_))));
    }
}
