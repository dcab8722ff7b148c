// src/normalize.rs
//! Operation normalization.
//!
//! Goal: turn each raw, flag-driven operation record into an [`Operation`]
//! whose arguments are typed, partitioned (required first, declaration order
//! kept inside each partition) and carry literal defaults. Arguments we
//! cannot express are dropped one at a time with an [`ArgumentMappingWarning`];
//! the operation itself always survives.

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::error::{ArgumentMappingWarning, MappingIssue};
use crate::ir::{ArgKind, Argument, Direction, Literal, Operation};
use crate::naming;
use crate::registry::{
    ARG_DEPRECATED, ARG_INPUT, ARG_MODIFY, ARG_OUTPUT, ARG_REQUIRED, OP_DEPRECATED, RawArgument,
    RawOperation,
};

/// Operations keyed by name in discovery order, plus every dropped argument.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub operations: IndexMap<String, Operation>,
    pub warnings: Vec<ArgumentMappingWarning>,
}

pub struct Normalizer<'a> {
    catalog: &'a Catalog,
    warnings: Vec<ArgumentMappingWarning>,
}

impl<'a> Normalizer<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog, warnings: Vec::new() }
    }

    pub fn normalize(&mut self, raw: &RawOperation) -> Operation {
        let name = naming::identifier(&raw.name);
        let mut required = Vec::new();
        let mut optional = Vec::new();

        for raw_arg in &raw.arguments {
            match self.argument(raw_arg) {
                Ok(arg) if arg.required => required.push(arg),
                Ok(arg) => optional.push(arg),
                Err(issue) => {
                    let warning = ArgumentMappingWarning {
                        operation: name.clone(),
                        argument: raw_arg.name.clone(),
                        type_name: raw_arg.type_name.clone(),
                        issue,
                    };
                    warn!("{warning}");
                    self.warnings.push(warning);
                }
            }
        }

        let has_output = required.iter().any(Argument::is_output);
        let mut arguments = required;
        arguments.append(&mut optional);

        Operation {
            name,
            native_name: raw.name.clone(),
            description: raw.description.clone(),
            arguments,
            has_output,
            deprecated: raw.flags & OP_DEPRECATED != 0,
        }
    }

    pub fn warnings(&self) -> &[ArgumentMappingWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<ArgumentMappingWarning> {
        self.warnings
    }

    /// Drop warnings about `operation` recorded before index `before`.
    fn discard_warnings(&mut self, operation: &str, before: usize) {
        let later = self.warnings.split_off(before);
        self.warnings.retain(|w| w.operation != operation);
        self.warnings.extend(later);
    }

    fn argument(&self, raw: &RawArgument) -> Result<Argument, MappingIssue> {
        if raw.flags & ARG_DEPRECATED != 0 {
            return Err(MappingIssue::Deprecated);
        }
        let direction = direction(raw.flags).ok_or(MappingIssue::NoDirection)?;
        let kind = self.kind_of(raw)?;
        let required = raw.flags & ARG_REQUIRED != 0;
        let default = if required {
            None
        } else {
            Some(self.default_for(&kind, direction, raw.default.as_ref())?)
        };
        Ok(Argument {
            name: naming::identifier(&raw.name),
            native_name: raw.name.clone(),
            description: raw.description.clone(),
            kind,
            direction,
            required,
            default,
        })
    }

    fn kind_of(&self, raw: &RawArgument) -> Result<ArgKind, MappingIssue> {
        let kind = match raw.type_name.as_str() {
            "gint" | "guint" | "gint64" | "guint64" | "glong" | "gulong" => ArgKind::Integer,
            "gdouble" | "gfloat" => ArgKind::Float,
            "gboolean" => ArgKind::Boolean,
            "gchararray" => ArgKind::String,
            "VipsArrayDouble" => ArgKind::Array { item: Box::new(ArgKind::Float) },
            "VipsArrayInt" => ArgKind::Array { item: Box::new(ArgKind::Integer) },
            "VipsArrayImage" => ArgKind::Array { item: Box::new(ArgKind::image()) },
            "VipsBlob" => ArgKind::Blob,
            other => match raw.fundamental.as_str() {
                "GEnum" | "GFlags" => match self.catalog.enum_type(other) {
                    Some(info) => ArgKind::Enum {
                        type_name: info.name.clone(),
                        flags: info.flags,
                    },
                    None => {
                        return Err(MappingIssue::UnsupportedType(format!(
                            "{other} (enum type not in catalog)"
                        )));
                    }
                },
                _ => match self.catalog.classify(other) {
                    Some(class) => ArgKind::Object { type_name: other.to_string(), class },
                    None => return Err(MappingIssue::UnsupportedType(other.to_string())),
                },
            },
        };
        Ok(kind)
    }

    /// Resolve an optional argument's default to a literal every layer can spell.
    fn default_for(
        &self,
        kind: &ArgKind,
        direction: Direction,
        raw: Option<&Value>,
    ) -> Result<Literal, MappingIssue> {
        if direction == Direction::Output {
            return Ok(Literal::zero(kind));
        }
        let raw = raw.filter(|v| !v.is_null());
        let unrepresentable = |v: &Value| {
            MappingIssue::UnrepresentableDefault(format!("{v} for {}", kind_label(kind)))
        };

        let literal = match kind {
            ArgKind::Integer => match raw {
                None => Literal::Int(0),
                Some(v) => Literal::Int(as_integer(v).ok_or_else(|| unrepresentable(v))?),
            },
            ArgKind::Float => match raw {
                None => Literal::Float(OrderedFloat(0.0)),
                Some(v) => {
                    let f = v.as_f64().filter(|f| f.is_finite()).ok_or_else(|| unrepresentable(v))?;
                    Literal::Float(OrderedFloat(f))
                }
            },
            ArgKind::Boolean => match raw {
                None => Literal::Bool(false),
                Some(v) => Literal::Bool(v.as_bool().ok_or_else(|| unrepresentable(v))?),
            },
            ArgKind::String => match raw {
                None => Literal::Str(String::new()),
                Some(v) => Literal::Str(v.as_str().ok_or_else(|| unrepresentable(v))?.to_string()),
            },
            ArgKind::Enum { type_name, flags } => self.enum_default(type_name, *flags, raw)?,
            ArgKind::Array { .. } | ArgKind::Object { .. } | ArgKind::Blob => Literal::Nil,
        };
        Ok(literal)
    }

    fn enum_default(
        &self,
        type_name: &str,
        flags: bool,
        raw: Option<&Value>,
    ) -> Result<Literal, MappingIssue> {
        let info = self.catalog.enum_type(type_name).ok_or_else(|| {
            MappingIssue::UnsupportedType(format!("{type_name} (enum type not in catalog)"))
        })?;
        let member = match raw {
            None => info.member_by_value(0).or_else(|| info.members.first()),
            Some(Value::String(nick)) => info.member_by_name(&naming::identifier(nick)),
            Some(v) => match as_integer(v) {
                Some(value) => match info.member_by_value(value) {
                    Some(m) => Some(m),
                    // flag words may combine several members
                    None if flags => {
                        return Ok(Literal::Enum {
                            type_name: type_name.to_string(),
                            member: None,
                            value,
                        });
                    }
                    None => None,
                },
                None => None,
            },
        };
        let member = member.ok_or_else(|| {
            MappingIssue::UnrepresentableDefault(format!(
                "{} names no member of {type_name}",
                raw.map(ToString::to_string).unwrap_or_else(|| "<none>".into())
            ))
        })?;
        Ok(Literal::Enum {
            type_name: type_name.to_string(),
            member: Some(member.name.clone()),
            value: member.value,
        })
    }
}

/// Normalize every discovered operation. Later discoveries of the same name
/// replace earlier ones in place; the collision is logged.
pub fn normalize_all(raw_ops: &[RawOperation], catalog: &Catalog) -> Normalized {
    let mut normalizer = Normalizer::new(catalog);
    let mut operations: IndexMap<String, Operation> = IndexMap::with_capacity(raw_ops.len());
    for raw in raw_ops {
        let before = normalizer.warnings.len();
        let op = normalizer.normalize(raw);
        if let Some(previous) = operations.insert(op.name.clone(), op) {
            normalizer.discard_warnings(&previous.name, before);
            warn!(
                operation = %previous.name,
                "registry reported operation twice, keeping the later discovery"
            );
        }
    }
    debug!(
        operations = operations.len(),
        dropped_arguments = normalizer.warnings().len(),
        "normalized operations"
    );
    Normalized { operations, warnings: normalizer.into_warnings() }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn direction(flags: u32) -> Option<Direction> {
    let input = flags & ARG_INPUT != 0;
    let output = flags & ARG_OUTPUT != 0;
    let modify = flags & ARG_MODIFY != 0;
    match (input, output) {
        (true, _) if modify => Some(Direction::InputOutput),
        (true, false) => Some(Direction::Input),
        (false, true) => Some(Direction::Output),
        (true, true) => Some(Direction::InputOutput),
        (false, false) => None,
    }
}

fn as_integer(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| {
        v.as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn kind_label(kind: &ArgKind) -> String {
    match kind {
        ArgKind::Integer => "integer".into(),
        ArgKind::Float => "float".into(),
        ArgKind::Boolean => "boolean".into(),
        ArgKind::String => "string".into(),
        ArgKind::Enum { type_name, .. } => type_name.clone(),
        ArgKind::Array { item } => format!("array of {}", kind_label(item)),
        ArgKind::Object { type_name, .. } => type_name.clone(),
        ArgKind::Blob => "blob".into(),
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ARG_CONSTRUCT, RawEnum, RawEnumValue, RawImageType};
    use serde_json::json;

    const REQ_IN: u32 = ARG_REQUIRED | ARG_CONSTRUCT | ARG_INPUT;
    const REQ_OUT: u32 = ARG_REQUIRED | ARG_CONSTRUCT | ARG_OUTPUT;
    const OPT_IN: u32 = ARG_CONSTRUCT | ARG_INPUT;
    const OPT_OUT: u32 = ARG_OUTPUT;

    fn catalog() -> Catalog {
        let kernel = RawEnum {
            name: "VipsKernel".into(),
            flags: false,
            values: ["nearest", "linear", "cubic", "mitchell", "lanczos2", "lanczos3"]
                .iter()
                .enumerate()
                .map(|(i, nick)| RawEnumValue {
                    name: format!("VIPS_KERNEL_{}", nick.to_uppercase()),
                    nick: nick.to_string(),
                    value: i as i64,
                })
                .collect(),
        };
        let filter = RawEnum {
            name: "VipsForeignPngFilter".into(),
            flags: true,
            values: vec![
                RawEnumValue { name: "NONE".into(), nick: "none".into(), value: 8 },
                RawEnumValue { name: "SUB".into(), nick: "sub".into(), value: 16 },
                RawEnumValue { name: "UP".into(), nick: "up".into(), value: 32 },
            ],
        };
        let types = [
            RawImageType { name: "VipsObject".into(), parent: None },
            RawImageType { name: "VipsImage".into(), parent: Some("VipsObject".into()) },
            RawImageType { name: "VipsInterpolate".into(), parent: Some("VipsObject".into()) },
        ];
        Catalog::build(&[kernel, filter], &types).unwrap()
    }

    fn raw(value: Value) -> RawOperation {
        serde_json::from_value(value).unwrap()
    }

    fn arg(name: &str, type_name: &str, flags: u32) -> Value {
        json!({ "name": name, "type_name": type_name, "flags": flags })
    }

    fn resize() -> RawOperation {
        raw(json!({
            "name": "resize",
            "description": "resize an image",
            "arguments": [
                arg("in", "VipsImage", REQ_IN),
                { "name": "kernel", "type_name": "VipsKernel", "fundamental": "GEnum",
                  "flags": OPT_IN, "default": 5 },
                arg("out", "VipsImage", REQ_OUT),
                { "name": "gap", "type_name": "gdouble", "flags": OPT_IN, "default": 2.0 },
                arg("scale", "gdouble", REQ_IN),
                { "name": "vscale", "type_name": "gdouble", "flags": OPT_IN }
            ]
        }))
    }

    #[test]
    fn required_first_declaration_order_kept() {
        let catalog = catalog();
        let op = Normalizer::new(&catalog).normalize(&resize());
        let names: Vec<_> = op.arguments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["in", "out", "scale", "kernel", "gap", "vscale"]);
        assert!(op.has_output);
        assert!(!op.deprecated);
        assert_eq!(op.required().count(), 3);
        assert_eq!(op.optional().count(), 3);
    }

    #[test]
    fn defaults_resolve_to_literals() {
        let catalog = catalog();
        let op = Normalizer::new(&catalog).normalize(&resize());
        assert_eq!(
            op.argument("kernel").unwrap().default,
            Some(Literal::Enum {
                type_name: "VipsKernel".into(),
                member: Some("lanczos3".into()),
                value: 5
            })
        );
        assert_eq!(op.argument("gap").unwrap().default, Some(Literal::Float(OrderedFloat(2.0))));
        assert_eq!(op.argument("vscale").unwrap().default, Some(Literal::Float(OrderedFloat(0.0))));
        assert_eq!(op.argument("scale").unwrap().default, None);
        assert!(op.optional().all(|a| a.default.is_some()));
    }

    #[test]
    fn unsupported_argument_dropped_not_operation() {
        let catalog = catalog();
        let mut normalizer = Normalizer::new(&catalog);
        let op = normalizer.normalize(&raw(json!({
            "name": "thumbnail_source",
            "arguments": [
                arg("source", "VipsSource", REQ_IN),
                arg("out", "VipsImage", REQ_OUT),
                arg("callback", "gpointer", OPT_IN),
                arg("interpolate", "VipsInterpolate", OPT_IN)
            ]
        })));
        // VipsSource is not in this catalog either
        let names: Vec<_> = op.arguments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["out", "interpolate"]);
        let dropped: Vec<_> = normalizer.warnings().iter().map(|w| w.argument.as_str()).collect();
        assert_eq!(dropped, ["source", "callback"]);
        assert_eq!(
            normalizer.warnings()[1].issue,
            MappingIssue::UnsupportedType("gpointer".into())
        );
        assert_eq!(op.argument("interpolate").unwrap().default, Some(Literal::Nil));
    }

    #[test]
    fn deprecated_and_directionless_arguments_dropped() {
        let catalog = catalog();
        let mut normalizer = Normalizer::new(&catalog);
        let op = normalizer.normalize(&raw(json!({
            "name": "sharpen",
            "flags": OP_DEPRECATED,
            "arguments": [
                arg("in", "VipsImage", REQ_IN),
                arg("radius", "gint", OPT_IN | ARG_DEPRECATED),
                arg("weird", "gint", ARG_CONSTRUCT)
            ]
        })));
        assert!(op.deprecated);
        assert!(!op.has_output);
        assert_eq!(op.arguments.len(), 1);
        let issues: Vec<_> = normalizer.warnings().iter().map(|w| w.issue.clone()).collect();
        assert_eq!(issues, [MappingIssue::Deprecated, MappingIssue::NoDirection]);
    }

    #[test]
    fn modify_flag_makes_input_output() {
        let catalog = catalog();
        let op = Normalizer::new(&catalog).normalize(&raw(json!({
            "name": "draw_rect",
            "arguments": [
                arg("image", "VipsImage", REQ_IN | ARG_MODIFY),
                arg("ink", "VipsArrayDouble", REQ_IN),
                arg("fill", "gboolean", OPT_IN)
            ]
        })));
        assert_eq!(op.arguments[0].direction, Direction::InputOutput);
        assert_eq!(op.arguments[1].kind, ArgKind::Array { item: Box::new(ArgKind::Float) });
        assert_eq!(op.argument("fill").unwrap().default, Some(Literal::Bool(false)));
    }

    #[test]
    fn unrepresentable_defaults_drop_argument() {
        let catalog = catalog();
        let mut normalizer = Normalizer::new(&catalog);
        let op = normalizer.normalize(&raw(json!({
            "name": "pngsave",
            "arguments": [
                arg("in", "VipsImage", REQ_IN),
                { "name": "kernel", "type_name": "VipsKernel", "fundamental": "GEnum",
                  "flags": OPT_IN, "default": 42 },
                { "name": "filter", "type_name": "VipsForeignPngFilter", "fundamental": "GFlags",
                  "flags": OPT_IN, "default": 24 },
                { "name": "q", "type_name": "gint", "flags": OPT_IN, "default": "high" }
            ]
        })));
        let names: Vec<_> = op.arguments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["in", "filter"]);
        assert_eq!(
            op.argument("filter").unwrap().default,
            Some(Literal::Enum { type_name: "VipsForeignPngFilter".into(), member: None, value: 24 })
        );
        assert_eq!(normalizer.warnings().len(), 2);
        assert!(normalizer
            .warnings()
            .iter()
            .all(|w| matches!(w.issue, MappingIssue::UnrepresentableDefault(_))));
    }

    #[test]
    fn optional_outputs_get_zero_defaults() {
        let catalog = catalog();
        let op = Normalizer::new(&catalog).normalize(&raw(json!({
            "name": "max",
            "arguments": [
                arg("in", "VipsImage", REQ_IN),
                arg("out", "gdouble", REQ_OUT),
                arg("x", "gint", OPT_OUT),
                arg("out-array", "VipsArrayDouble", OPT_OUT)
            ]
        })));
        assert_eq!(op.argument("x").unwrap().default, Some(Literal::Int(0)));
        let out_array = op.argument("out_array").unwrap();
        assert_eq!(out_array.native_name, "out-array");
        assert_eq!(out_array.default, Some(Literal::Nil));
    }

    #[test]
    fn later_duplicate_wins() {
        let catalog = catalog();
        let first = raw(json!({ "name": "invert", "description": "old", "arguments": [] }));
        let other = raw(json!({ "name": "black", "arguments": [] }));
        let second = raw(json!({ "name": "invert", "description": "new", "arguments": [] }));
        let normalized = normalize_all(&[first, other, second], &catalog);
        let names: Vec<_> = normalized.operations.keys().map(String::as_str).collect();
        assert_eq!(names, ["invert", "black"]);
        assert_eq!(normalized.operations["invert"].description, "new");
    }

    #[test]
    fn replaced_registration_takes_its_warnings_along() {
        let catalog = catalog();
        let first = raw(json!({
            "name": "invert",
            "arguments": [arg("in", "VipsImage", REQ_IN), arg("callback", "gpointer", OPT_IN)]
        }));
        let other = raw(json!({ "name": "black", "arguments": [arg("hook", "gpointer", OPT_IN)] }));
        let second = raw(json!({ "name": "invert", "arguments": [arg("in", "VipsImage", REQ_IN)] }));
        let normalized = normalize_all(&[first, other, second], &catalog);
        let dropped: Vec<_> = normalized
            .warnings
            .iter()
            .map(|w| format!("{}.{}", w.operation, w.argument))
            .collect();
        assert_eq!(dropped, ["black.hook"]);

        // a later registration that drops arguments itself keeps its warnings
        let third = raw(json!({ "name": "invert", "arguments": [arg("cb", "gpointer", OPT_IN)] }));
        let normalized = normalize_all(&[third.clone(), third], &catalog);
        let dropped: Vec<_> = normalized.warnings.iter().map(|w| w.argument.as_str()).collect();
        assert_eq!(dropped, ["cb"]);
    }
}
