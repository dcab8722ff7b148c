//! Lowering of one normalized [`Operation`] into its three call surfaces.
//!
//! - Layer A: required arguments only, in normalized order.
//! - Layer B: Layer A followed by every optional argument.
//! - Layer C: a method taking the required inputs and an optional options
//!   value whose fields are exactly the optional arguments.
//!
//! All three must reach the native library with the same set of explicitly
//! set inputs. [`verify`] checks that on a model of the native call. An
//! optional input equal to its default is left unset, since libvips reads an
//! unset argument differently from one set to its default value.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ir::{ArgKind, Argument, Direction, Literal, Operation};
use crate::naming;

/// Prefix of every low-level native symbol the generator emits.
pub const NATIVE_PREFIX: &str = "vipsgen_";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    pub operation: String,
    pub layer_a: CallSignature,
    pub layer_b: CallSignature,
    pub layer_c: MethodSignature,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSignature {
    pub symbol: String,
    pub params: Vec<Argument>,
}

impl CallSignature {
    pub fn inputs(&self) -> impl Iterator<Item = &Argument> {
        self.params.iter().filter(|a| a.is_input())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Argument> {
        self.params.iter().filter(|a| a.is_output())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSignature {
    pub name: String,
    /// first required image input, when there is one
    pub receiver: Option<Argument>,
    pub params: Vec<Argument>,
    /// every required output, in order
    pub results: Vec<Argument>,
    /// the primary image output replaces the receiver's image
    pub replaces_receiver: bool,
    /// `results` minus the one absorbed by the receiver
    pub returns: Vec<Argument>,
    pub options: Option<OptionsType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionsType {
    pub name: String,
    pub constructor: String,
    pub fields: Vec<OptionField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionField {
    pub name: String,
    pub argument: Argument,
    pub default: Literal,
}

pub fn layer_a_symbol(op: &Operation) -> String {
    format!("{NATIVE_PREFIX}{}", op.name)
}

pub fn layer_b_symbol(op: &Operation) -> String {
    format!("{NATIVE_PREFIX}{}_with_options", op.name)
}

pub fn lower_operation(op: &Operation) -> Binding {
    let required: Vec<Argument> = op.required().cloned().collect();
    let mut all = required.clone();
    all.extend(op.optional().cloned());

    let receiver = op
        .required_inputs()
        .next()
        .filter(|a| a.kind.is_image())
        .cloned();
    let params = op
        .required_inputs()
        .filter(|a| receiver.as_ref().is_none_or(|r| r.name != a.name))
        .cloned()
        .collect();
    let results: Vec<Argument> = op.required_outputs().cloned().collect();
    let replaces_receiver = receiver.as_ref().is_some_and(|r| r.direction == Direction::Input)
        && results.first().is_some_and(|o| o.kind.is_image());
    let returns = results.iter().skip(usize::from(replaces_receiver)).cloned().collect();

    let method = naming::pascal_case(&op.name);
    let fields: Vec<OptionField> = op
        .optional()
        .map(|a| OptionField {
            name: naming::pascal_case(&a.name),
            argument: a.clone(),
            default: option_default(a),
        })
        .collect();
    let options = (!fields.is_empty()).then(|| OptionsType {
        name: format!("{method}Options"),
        constructor: format!("Default{method}Options"),
        fields,
    });

    Binding {
        operation: op.name.clone(),
        layer_a: CallSignature { symbol: layer_a_symbol(op), params: required },
        layer_b: CallSignature { symbol: layer_b_symbol(op), params: all },
        layer_c: MethodSignature {
            name: method,
            receiver,
            params,
            results,
            replaces_receiver,
            returns,
            options,
        },
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CALL MODEL
// ————————————————————————————————————————————————————————————————————————————

/// Argument values keyed by normalized argument name.
pub type Values = BTreeMap<String, Literal>;

/// What the native library ends up seeing: the inputs set on the operation.
/// Anything absent stays unset and libvips resolves it itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCall {
    pub operation: String,
    pub inputs: Values,
}

impl NativeCall {
    /// The value `name` runs with: the one set explicitly, else its default.
    pub fn resolved<'a>(&'a self, op: &'a Operation, name: &str) -> Option<&'a Literal> {
        self.inputs
            .get(name)
            .or_else(|| op.argument(name).and_then(|a| a.default.as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("{operation}: required input `{argument}` not supplied")]
    MissingRequired { operation: String, argument: String },
    #[error("{operation}: layer B call lacks optional argument `{argument}`")]
    MissingOptional { operation: String, argument: String },
    #[error("{operation}: `{argument}` is not an argument of this call")]
    UnknownArgument { operation: String, argument: String },
    #[error("{operation}: optional argument `{argument}` has no default")]
    MissingDefault { operation: String, argument: String },
    #[error("{operation}: layer A parameters are not a prefix of layer B parameters")]
    NotPrefix { operation: String },
    #[error("{operation}: options fields do not match optional arguments")]
    OptionsMismatch { operation: String },
    #[error("{operation}: {left} and {right} reach the native call with different inputs")]
    Diverged { operation: String, left: &'static str, right: &'static str },
}

fn native_call(op: &Operation, set: Values) -> Result<NativeCall, ContractViolation> {
    if let Some(unknown) = set.keys().find(|k| op.argument(k).is_none_or(|a| !a.is_input())) {
        return Err(ContractViolation::UnknownArgument {
            operation: op.name.clone(),
            argument: unknown.clone(),
        });
    }
    if let Some(missing) = op.required_inputs().find(|a| !set.contains_key(&a.name)) {
        return Err(ContractViolation::MissingRequired {
            operation: op.name.clone(),
            argument: missing.name.clone(),
        });
    }
    Ok(NativeCall { operation: op.native_name.clone(), inputs: set })
}

/// Value of an optional argument when the caller does not choose one.
fn option_default(arg: &Argument) -> Literal {
    arg.default.clone().unwrap_or_else(|| Literal::zero(&arg.kind))
}

fn required_only(op: &Operation, required: &Values) -> Values {
    op.required_inputs()
        .filter_map(|a| required.get(&a.name).map(|v| (a.name.clone(), v.clone())))
        .collect()
}

pub fn call_layer_a(op: &Operation, required: &Values) -> Result<NativeCall, ContractViolation> {
    if let Some(extra) = required.keys().find(|k| op.argument(k).is_none_or(|a| !a.required)) {
        return Err(ContractViolation::UnknownArgument {
            operation: op.name.clone(),
            argument: extra.clone(),
        });
    }
    native_call(op, required_only(op, required))
}

/// Layer B receives every optional input and sets those that differ from
/// their default.
pub fn call_layer_b(
    op: &Operation,
    required: &Values,
    optional: &Values,
) -> Result<NativeCall, ContractViolation> {
    let mut set = required_only(op, required);
    for arg in op.optional_inputs() {
        let value = optional.get(&arg.name).ok_or_else(|| ContractViolation::MissingOptional {
            operation: op.name.clone(),
            argument: arg.name.clone(),
        })?;
        if *value != option_default(arg) {
            set.insert(arg.name.clone(), value.clone());
        }
    }
    native_call(op, set)
}

/// Layer C: no options → Layer A; options → defaults overridden by `options`,
/// then Layer B.
pub fn call_layer_c(
    op: &Operation,
    required: &Values,
    options: Option<&Values>,
) -> Result<NativeCall, ContractViolation> {
    match options {
        None => call_layer_a(op, required),
        Some(overrides) => {
            let mut fields = default_options(op);
            for (name, value) in overrides {
                if !fields.contains_key(name) {
                    return Err(ContractViolation::UnknownArgument {
                        operation: op.name.clone(),
                        argument: name.clone(),
                    });
                }
                fields.insert(name.clone(), value.clone());
            }
            call_layer_b(op, required, &fields)
        }
    }
}

/// Field values of a freshly constructed options value.
pub fn default_options(op: &Operation) -> Values {
    op.optional_inputs()
        .map(|a| (a.name.clone(), option_default(a)))
        .collect()
}

/// Placeholder values for every required input, one per kind.
pub fn placeholder_inputs(op: &Operation) -> Values {
    op.required_inputs()
        .map(|a| {
            let value = match &a.kind {
                ArgKind::Object { .. } | ArgKind::Array { .. } | ArgKind::Blob => {
                    Literal::Str(format!("<{}>", a.name))
                }
                kind => Literal::zero(kind),
            };
            (a.name.clone(), value)
        })
        .collect()
}

/// Check the layering contract for one operation.
pub fn verify(op: &Operation) -> Result<(), ContractViolation> {
    if let Some(missing) = op.optional().find(|a| a.default.is_none()) {
        return Err(ContractViolation::MissingDefault {
            operation: op.name.clone(),
            argument: missing.name.clone(),
        });
    }

    let binding = lower_operation(op);
    let a = &binding.layer_a.params;
    let b = &binding.layer_b.params;
    let optional_count = op.optional().count();
    if b.len() != a.len() + optional_count || !b.starts_with(a) {
        return Err(ContractViolation::NotPrefix { operation: op.name.clone() });
    }

    let field_names: Vec<&str> = binding
        .layer_c
        .options
        .iter()
        .flat_map(|o| o.fields.iter().map(|f| f.argument.name.as_str()))
        .collect();
    let optional_names: Vec<&str> = op.optional().map(|a| a.name.as_str()).collect();
    if field_names != optional_names {
        return Err(ContractViolation::OptionsMismatch { operation: op.name.clone() });
    }

    let required = placeholder_inputs(op);
    let via_a = call_layer_a(op, &required)?;
    let via_b = call_layer_b(op, &required, &default_options(op))?;
    let via_c_none = call_layer_c(op, &required, None)?;
    let via_c_default = call_layer_c(op, &required, Some(&Values::new()))?;

    let diverged = |left, right| ContractViolation::Diverged {
        operation: op.name.clone(),
        left,
        right,
    };
    if via_c_none != via_a {
        return Err(diverged("layer C without options", "layer A"));
    }
    if via_c_default != via_b {
        return Err(diverged("layer C with default options", "layer B"));
    }
    if via_b != via_a {
        return Err(diverged("layer B with defaults", "layer A"));
    }
    Ok(())
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ObjectClass;
    use ordered_float::OrderedFloat;

    fn required(name: &str, kind: ArgKind, direction: Direction) -> Argument {
        Argument {
            name: name.into(),
            native_name: name.into(),
            description: String::new(),
            kind,
            direction,
            required: true,
            default: None,
        }
    }

    fn optional(name: &str, kind: ArgKind, default: Literal) -> Argument {
        Argument {
            required: false,
            default: Some(default),
            ..required(name, kind, Direction::Input)
        }
    }

    fn kernel(value: i64, member: &str) -> Literal {
        Literal::Enum { type_name: "VipsKernel".into(), member: Some(member.into()), value }
    }

    fn resize() -> Operation {
        let kernel_kind = ArgKind::Enum { type_name: "VipsKernel".into(), flags: false };
        Operation {
            name: "resize".into(),
            native_name: "resize".into(),
            description: "resize an image".into(),
            arguments: vec![
                required("in", ArgKind::image(), Direction::Input),
                required("out", ArgKind::image(), Direction::Output),
                required("scale", ArgKind::Float, Direction::Input),
                optional("kernel", kernel_kind, kernel(5, "lanczos3")),
                optional("vscale", ArgKind::Float, Literal::Float(OrderedFloat(0.0))),
            ],
            has_output: true,
            deprecated: false,
        }
    }

    #[test]
    fn resize_layers() {
        let binding = lower_operation(&resize());
        let names = |s: &CallSignature| s.params.iter().map(|a| a.name.clone()).collect::<Vec<_>>();
        assert_eq!(binding.layer_a.symbol, "vipsgen_resize");
        assert_eq!(names(&binding.layer_a), ["in", "out", "scale"]);
        assert_eq!(binding.layer_b.symbol, "vipsgen_resize_with_options");
        assert_eq!(names(&binding.layer_b), ["in", "out", "scale", "kernel", "vscale"]);
        let inputs: Vec<_> = binding.layer_a.inputs().map(|a| a.name.as_str()).collect();
        assert_eq!(inputs, ["in", "scale"]);

        let c = &binding.layer_c;
        assert_eq!(c.name, "Resize");
        assert_eq!(c.receiver.as_ref().map(|r| r.name.as_str()), Some("in"));
        assert_eq!(c.params.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(), ["scale"]);
        assert_eq!(c.results.len(), 1);
        assert!(c.replaces_receiver);
        assert!(c.returns.is_empty());
        let options = c.options.as_ref().unwrap();
        assert_eq!(options.name, "ResizeOptions");
        assert_eq!(options.constructor, "DefaultResizeOptions");
        assert_eq!(options.fields[0].name, "Kernel");
        assert_eq!(options.fields[0].default, kernel(5, "lanczos3"));
    }

    #[test]
    fn three_way_equivalence_holds() {
        let op = resize();
        verify(&op).unwrap();
        let mut req = Values::new();
        req.insert("in".into(), Literal::Str("<image>".into()));
        req.insert("scale".into(), Literal::Float(OrderedFloat(0.5)));
        let a = call_layer_a(&op, &req).unwrap();
        let c = call_layer_c(&op, &req, None).unwrap();
        assert_eq!(a, c);
        assert!(!a.inputs.contains_key("kernel"));
        assert_eq!(a.resolved(&op, "kernel"), Some(&kernel(5, "lanczos3")));
        assert_eq!(a.inputs["scale"], Literal::Float(OrderedFloat(0.5)));
    }

    #[test]
    fn layer_b_leaves_defaulted_options_unset() {
        let op = resize();
        let req = placeholder_inputs(&op);
        let defaults = call_layer_b(&op, &req, &default_options(&op)).unwrap();
        assert_eq!(defaults.inputs.keys().collect::<Vec<_>>(), ["in", "scale"]);

        let mut options = default_options(&op);
        options.insert("vscale".into(), Literal::Float(OrderedFloat(0.5)));
        let call = call_layer_b(&op, &req, &options).unwrap();
        assert_eq!(call.inputs.keys().collect::<Vec<_>>(), ["in", "scale", "vscale"]);
        assert_eq!(call.resolved(&op, "kernel"), Some(&kernel(5, "lanczos3")));

        // an override back to the default is the same call as no override
        let mut same = Values::new();
        same.insert("kernel".into(), kernel(5, "lanczos3"));
        assert_eq!(call_layer_c(&op, &req, Some(&same)).unwrap(), call_layer_a(&op, &req).unwrap());
    }

    #[test]
    fn options_override_reaches_native_call() {
        let op = resize();
        let req = placeholder_inputs(&op);
        let mut overrides = Values::new();
        overrides.insert("kernel".into(), kernel(0, "nearest"));
        let call = call_layer_c(&op, &req, Some(&overrides)).unwrap();
        assert_eq!(call.inputs["kernel"], kernel(0, "nearest"));
        assert_ne!(call, call_layer_a(&op, &req).unwrap());
    }

    #[test]
    fn missing_required_and_unknown_fields_rejected() {
        let op = resize();
        let err = call_layer_a(&op, &Values::new()).unwrap_err();
        assert!(matches!(err, ContractViolation::MissingRequired { ref argument, .. } if argument == "in"));

        let mut bogus = Values::new();
        bogus.insert("sharpness".into(), Literal::Int(1));
        let err = call_layer_c(&op, &placeholder_inputs(&op), Some(&bogus)).unwrap_err();
        assert!(matches!(err, ContractViolation::UnknownArgument { .. }));

        let err = call_layer_b(&op, &placeholder_inputs(&op), &Values::new()).unwrap_err();
        assert!(matches!(err, ContractViolation::MissingOptional { ref argument, .. } if argument == "kernel"));
    }

    #[test]
    fn optional_without_default_fails_verification() {
        let mut op = resize();
        op.arguments[3].default = None;
        assert!(matches!(verify(&op), Err(ContractViolation::MissingDefault { .. })));
    }

    #[test]
    fn no_receiver_without_leading_image() {
        let op = Operation {
            name: "black".into(),
            native_name: "black".into(),
            description: String::new(),
            arguments: vec![
                required("out", ArgKind::image(), Direction::Output),
                required("width", ArgKind::Integer, Direction::Input),
                required("height", ArgKind::Integer, Direction::Input),
                optional("bands", ArgKind::Integer, Literal::Int(1)),
            ],
            has_output: true,
            deprecated: false,
        };
        let binding = lower_operation(&op);
        assert!(binding.layer_c.receiver.is_none());
        assert!(!binding.layer_c.replaces_receiver);
        assert_eq!(binding.layer_c.returns.len(), 1);
        assert_eq!(binding.layer_c.params.len(), 2);
        verify(&op).unwrap();
    }

    #[test]
    fn no_optionals_means_identical_layers() {
        let op = Operation {
            name: "invert".into(),
            native_name: "invert".into(),
            description: String::new(),
            arguments: vec![
                required("in", ArgKind::Object { type_name: "VipsImage".into(), class: ObjectClass::Image }, Direction::Input),
                required("out", ArgKind::image(), Direction::Output),
            ],
            has_output: true,
            deprecated: false,
        };
        let binding = lower_operation(&op);
        assert_eq!(binding.layer_a.params, binding.layer_b.params);
        assert!(binding.layer_c.options.is_none());
        verify(&op).unwrap();
    }
}
