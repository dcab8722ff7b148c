//! Helper filters available to every template.
//!
//! The templates are skeletons; naming, type mapping, default literals and
//! argument partitioning all happen here, over the normalized model. Each
//! helper is total over well-formed model values. Feeding one something
//! else (a misspelled field, the wrong kind of value) is a template error.
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use tera::{Tera, Value};

use crate::ir::{ArgKind, Argument, Direction, Literal, ObjectClass, Operation};
use crate::lower::{self, OptionField};
use crate::naming;

// ————————————————————————————————————————————————————————————————————————————
// TYPE MAPPING
// ————————————————————————————————————————————————————————————————————————————

/// Type of a value in the high-level (Layer C) binding.
pub fn go_type(kind: &ArgKind) -> String {
    match kind {
        ArgKind::Integer => "int".into(),
        ArgKind::Float => "float64".into(),
        ArgKind::Boolean => "bool".into(),
        ArgKind::String => "string".into(),
        ArgKind::Enum { type_name, .. } => naming::type_name(type_name),
        ArgKind::Array { item } => format!("[]{}", go_type(item)),
        ArgKind::Object { class, type_name } => match class {
            ObjectClass::Image => "*Image".into(),
            ObjectClass::Source => "*Source".into(),
            ObjectClass::Target => "*Target".into(),
            ObjectClass::Interpolate => "*Interpolate".into(),
            ObjectClass::Other => format!("*C.{type_name}"),
        },
        ArgKind::Blob => "[]byte".into(),
    }
}

/// Type of a value in the low-level (Layer A/B) Go wrappers: objects stay
/// native pointers, everything else is already a Go value.
pub fn cgo_type(kind: &ArgKind) -> String {
    match kind {
        ArgKind::Object { .. } => format!("*C.{}", native_object(kind)),
        ArgKind::Array { item } => format!("[]{}", cgo_type(item)),
        other => go_type(other),
    }
}

/// Type of the native variable an output is written into.
pub fn cgo_out_type(kind: &ArgKind) -> String {
    match kind {
        ArgKind::Integer => "C.int".into(),
        ArgKind::Float => "C.double".into(),
        ArgKind::Boolean => "C.gboolean".into(),
        ArgKind::String => "*C.char".into(),
        ArgKind::Enum { type_name, .. } => format!("C.{type_name}"),
        ArgKind::Array { .. } | ArgKind::Blob => format!("*C.{}", native_container(kind)),
        ArgKind::Object { .. } => format!("*C.{}", native_object(kind)),
    }
}

/// Native parameter type; outputs are passed by pointer.
pub fn c_type(arg: &Argument) -> String {
    let base = match &arg.kind {
        ArgKind::Integer => "int".to_string(),
        ArgKind::Float => "double".to_string(),
        ArgKind::Boolean => "gboolean".to_string(),
        ArgKind::String if arg.is_output() => "char*".to_string(),
        ArgKind::String => "const char*".to_string(),
        ArgKind::Enum { type_name, .. } => type_name.clone(),
        ArgKind::Array { .. } | ArgKind::Blob => format!("{}*", native_container(&arg.kind)),
        ArgKind::Object { .. } => format!("{}*", native_object(&arg.kind)),
    };
    if arg.is_output() { format!("{base}*") } else { base }
}

/// Subtypes of the well-known classes travel as their class root; the
/// registry checks the concrete type at call time.
fn native_object(kind: &ArgKind) -> &str {
    match kind {
        ArgKind::Object { class, type_name } => match class {
            ObjectClass::Image => "VipsImage",
            ObjectClass::Source => "VipsSource",
            ObjectClass::Target => "VipsTarget",
            ObjectClass::Interpolate => "VipsInterpolate",
            ObjectClass::Other => type_name,
        },
        _ => "VipsObject",
    }
}

fn native_container(kind: &ArgKind) -> &'static str {
    match kind {
        ArgKind::Array { item } => match item.as_ref() {
            ArgKind::Integer | ArgKind::Enum { .. } | ArgKind::Boolean => "VipsArrayInt",
            ArgKind::Object { .. } => "VipsArrayImage",
            _ => "VipsArrayDouble",
        },
        _ => "VipsBlob",
    }
}

/// Zero value of a Go type produced by [`go_type`] or [`cgo_type`].
pub fn go_zero(kind: &ArgKind) -> String {
    match kind {
        ArgKind::Integer | ArgKind::Float | ArgKind::Enum { .. } => "0".into(),
        ArgKind::Boolean => "false".into(),
        ArgKind::String => "\"\"".into(),
        ArgKind::Array { .. } | ArgKind::Object { .. } | ArgKind::Blob => "nil".into(),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// LITERALS
// ————————————————————————————————————————————————————————————————————————————

pub fn go_literal(literal: &Literal) -> String {
    match literal {
        Literal::Nil => "nil".into(),
        Literal::Bool(b) => b.to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => float_literal(f.0),
        Literal::Str(s) => quote(s),
        Literal::Enum { type_name, member: Some(member), .. } => naming::enum_member(type_name, member),
        Literal::Enum { type_name, member: None, value } => {
            format!("{}({value})", naming::type_name(type_name))
        }
    }
}

pub fn c_literal(literal: &Literal) -> String {
    match literal {
        Literal::Nil => "NULL".into(),
        Literal::Bool(true) => "TRUE".into(),
        Literal::Bool(false) => "FALSE".into(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => float_literal(f.0),
        Literal::Str(s) => quote(s),
        Literal::Enum { value, .. } => value.to_string(),
    }
}

// Debug keeps a decimal point or an exponent, both valid Go and C floats.
fn float_literal(f: f64) -> String {
    format!("{f:?}")
}

/// Double-quoted literal valid in both Go and C.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ————————————————————————————————————————————————————————————————————————————
// CONVERSIONS (low-level Go wrappers ↔ native, Layer C ↔ wrappers)
// ————————————————————————————————————————————————————————————————————————————

pub fn go_var(name: &str) -> String {
    naming::go_ident(&naming::camel_case(name))
}

pub fn c_var(name: &str) -> String {
    naming::c_ident(name)
}

fn c_temp(arg: &Argument) -> String {
    format!("c{}", naming::pascal_case(&arg.name))
}

/// Statements preparing a native copy of an input; empty when none is needed.
pub fn go_prelude(arg: &Argument) -> String {
    if arg.is_output() {
        return String::new();
    }
    let var = go_var(&arg.name);
    let temp = c_temp(arg);
    match &arg.kind {
        ArgKind::String => format!("{temp} := C.CString({var})\n\tdefer freeCString({temp})"),
        ArgKind::Array { .. } | ArgKind::Blob => {
            let ctor = match native_container(&arg.kind) {
                "VipsArrayInt" => "newArrayInt",
                "VipsArrayImage" => "newArrayImage",
                "VipsArrayDouble" => "newArrayDouble",
                _ => "newBlob",
            };
            format!("{temp} := {ctor}({var})\n\tdefer unrefArea(unsafe.Pointer({temp}))")
        }
        _ => String::new(),
    }
}

/// Expression handing an argument to the native shim.
pub fn go_to_c(arg: &Argument) -> String {
    let var = go_var(&arg.name);
    if arg.is_output() {
        return format!("&{var}");
    }
    match &arg.kind {
        ArgKind::Integer => format!("C.int({var})"),
        ArgKind::Float => format!("C.double({var})"),
        ArgKind::Boolean => format!("C.gboolean(boolToInt({var}))"),
        ArgKind::Enum { type_name, .. } => format!("C.{type_name}({var})"),
        ArgKind::String | ArgKind::Array { .. } | ArgKind::Blob => c_temp(arg),
        ArgKind::Object { .. } => var,
    }
}

/// Expression turning a native output variable into its wrapper value.
pub fn c_to_go(arg: &Argument) -> String {
    let var = go_var(&arg.name);
    match &arg.kind {
        ArgKind::Integer => format!("int({var})"),
        ArgKind::Float => format!("float64({var})"),
        ArgKind::Boolean => format!("{var} != 0"),
        ArgKind::String => format!("fromCString({var})"),
        ArgKind::Enum { type_name, .. } => format!("{}({var})", naming::type_name(type_name)),
        ArgKind::Array { .. } | ArgKind::Blob => match native_container(&arg.kind) {
            "VipsArrayInt" => format!("fromArrayInt({var})"),
            "VipsArrayImage" => format!("fromArrayImage({var})"),
            "VipsArrayDouble" => format!("fromArrayDouble({var})"),
            _ => format!("fromBlob({var})"),
        },
        ArgKind::Object { .. } => var,
    }
}

/// Layer C value → low-level wrapper value.
pub fn go_to_cgo(arg: &Argument, expr: &str) -> String {
    match &arg.kind {
        ArgKind::Object { class, .. } => match class {
            ObjectClass::Image => format!("cImage({expr})"),
            ObjectClass::Source => format!("cSource({expr})"),
            ObjectClass::Target => format!("cTarget({expr})"),
            ObjectClass::Interpolate => format!("cInterpolate({expr})"),
            ObjectClass::Other => expr.to_string(),
        },
        ArgKind::Array { item } if item.is_image() => format!("cImages({expr})"),
        _ => expr.to_string(),
    }
}

/// Low-level wrapper value → Layer C value.
pub fn cgo_to_go(arg: &Argument, expr: &str) -> String {
    match &arg.kind {
        ArgKind::Object { class, .. } => match class {
            ObjectClass::Image => format!("newImage({expr})"),
            ObjectClass::Source => format!("newSource({expr})"),
            ObjectClass::Target => format!("newTarget({expr})"),
            ObjectClass::Interpolate => format!("newInterpolate({expr})"),
            ObjectClass::Other => expr.to_string(),
        },
        ArgKind::Array { item } if item.is_image() => format!("newImages({expr})"),
        _ => expr.to_string(),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TERA ADAPTERS
// ————————————————————————————————————————————————————————————————————————————

type Args = HashMap<String, Value>;

pub fn register(tera: &mut Tera) {
    // casing
    tera.register_filter("pascal_case", |v: &Value, _: &Args| text(v, "pascal_case", naming::pascal_case));
    tera.register_filter("camel_case", |v: &Value, _: &Args| text(v, "camel_case", naming::camel_case));
    tera.register_filter("snake_case", |v: &Value, _: &Args| text(v, "snake_case", naming::snake_case));
    tera.register_filter("screaming_snake_case", |v: &Value, _: &Args| {
        text(v, "screaming_snake_case", naming::screaming_snake_case)
    });
    tera.register_filter("go_ident", |v: &Value, _: &Args| text(v, "go_ident", naming::go_ident));
    tera.register_filter("c_ident", |v: &Value, _: &Args| text(v, "c_ident", naming::c_ident));
    tera.register_filter("type_name", |v: &Value, _: &Args| text(v, "type_name", naming::type_name));
    tera.register_filter("enum_member", enum_member_filter);
    tera.register_filter("go_var", |v: &Value, _: &Args| name_of(v, "go_var", go_var));
    tera.register_filter("c_var", |v: &Value, _: &Args| name_of(v, "c_var", c_var));

    // types
    tera.register_filter("go_type", |v: &Value, _: &Args| with_kind(v, "go_type", go_type));
    tera.register_filter("cgo_type", |v: &Value, _: &Args| with_kind(v, "cgo_type", cgo_type));
    tera.register_filter("cgo_out_type", |v: &Value, _: &Args| {
        with_kind(v, "cgo_out_type", cgo_out_type)
    });
    tera.register_filter("go_zero", |v: &Value, _: &Args| with_kind(v, "go_zero", go_zero));
    tera.register_filter("c_type", |v: &Value, _: &Args| with_arg(v, "c_type", c_type));

    // defaults
    tera.register_filter("go_default", |v: &Value, _: &Args| {
        Ok(Value::String(go_literal(&literal_of(v, "go_default")?)))
    });
    tera.register_filter("c_default", |v: &Value, _: &Args| {
        Ok(Value::String(c_literal(&literal_of(v, "c_default")?)))
    });

    // conversions
    tera.register_filter("go_prelude", |v: &Value, _: &Args| with_arg(v, "go_prelude", go_prelude));
    tera.register_filter("go_to_c", |v: &Value, _: &Args| with_arg(v, "go_to_c", go_to_c));
    tera.register_filter("c_to_go", |v: &Value, _: &Args| with_arg(v, "c_to_go", c_to_go));
    tera.register_filter("go_to_cgo", |v: &Value, args: &Args| {
        convert_with(v, args, "go_to_cgo", go_to_cgo)
    });
    tera.register_filter("cgo_to_go", |v: &Value, args: &Args| {
        convert_with(v, args, "cgo_to_go", cgo_to_go)
    });

    // partitions
    tera.register_filter("required_args", |v: &Value, _: &Args| partition(v, "required_args", |a| a.required));
    tera.register_filter("optional_args", |v: &Value, _: &Args| partition(v, "optional_args", |a| !a.required));
    tera.register_filter("required_inputs", |v: &Value, _: &Args| {
        partition(v, "required_inputs", |a| a.required && a.is_input())
    });
    tera.register_filter("required_outputs", |v: &Value, _: &Args| {
        partition(v, "required_outputs", |a| a.required && a.is_output())
    });
    tera.register_filter("optional_inputs", |v: &Value, _: &Args| {
        partition(v, "optional_inputs", |a| !a.required && a.is_input())
    });
    tera.register_filter("optional_outputs", |v: &Value, _: &Args| {
        partition(v, "optional_outputs", |a| !a.required && a.direction == Direction::Output)
    });
    tera.register_filter("binding", |v: &Value, _: &Args| {
        let op: Operation = parse(v, "binding")?;
        to_value(&lower::lower_operation(&op), "binding")
    });
}

fn parse<T: DeserializeOwned>(value: &Value, filter: &str) -> tera::Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| tera::Error::msg(format!("filter `{filter}` got an unexpected value: {e}")))
}

fn to_value<T: serde::Serialize>(value: &T, filter: &str) -> tera::Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| tera::Error::msg(format!("filter `{filter}` could not serialize: {e}")))
}

fn text(value: &Value, filter: &str, f: impl Fn(&str) -> String) -> tera::Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("filter `{filter}` expects a string, got {value}")))?;
    Ok(Value::String(f(s)))
}

/// Accept either a bare name or anything with a `name` field.
fn name_of(value: &Value, filter: &str, f: impl Fn(&str) -> String) -> tera::Result<Value> {
    match value.get("name") {
        Some(name) => text(name, filter, f),
        None => text(value, filter, f),
    }
}

fn with_arg(value: &Value, filter: &str, f: impl Fn(&Argument) -> String) -> tera::Result<Value> {
    let arg: Argument = parse(value, filter)?;
    Ok(Value::String(f(&arg)))
}

/// Accept an argument, an option field or a bare kind.
fn with_kind(value: &Value, filter: &str, f: impl Fn(&ArgKind) -> String) -> tera::Result<Value> {
    let kind: ArgKind = if let Some(argument) = value.get("argument") {
        parse::<Argument>(argument, filter)?.kind
    } else if value.get("native_name").is_some() {
        parse::<Argument>(value, filter)?.kind
    } else {
        parse(value, filter)?
    };
    Ok(Value::String(f(&kind)))
}

fn convert_with(
    value: &Value,
    args: &Args,
    filter: &str,
    f: impl Fn(&Argument, &str) -> String,
) -> tera::Result<Value> {
    let arg: Argument = match value.get("argument") {
        Some(argument) => parse(argument, filter)?,
        None => parse(value, filter)?,
    };
    let expr = match args.get("expr") {
        Some(Value::String(expr)) => expr.clone(),
        Some(other) => {
            return Err(tera::Error::msg(format!("filter `{filter}`: `expr` must be a string, got {other}")));
        }
        None => go_var(&arg.name),
    };
    Ok(Value::String(f(&arg, &expr)))
}

/// Accept an option field, an optional argument or a bare literal.
fn literal_of(value: &Value, filter: &str) -> tera::Result<Literal> {
    if value.get("argument").is_some() {
        return Ok(parse::<OptionField>(value, filter)?.default);
    }
    if value.get("native_name").is_some() {
        let arg: Argument = parse(value, filter)?;
        return arg.default.ok_or_else(|| {
            tera::Error::msg(format!("filter `{filter}`: argument `{}` has no default", arg.name))
        });
    }
    parse(value, filter)
}

fn partition(value: &Value, filter: &str, keep: impl Fn(&Argument) -> bool) -> tera::Result<Value> {
    let op: Operation = parse(value, filter)?;
    let args: Vec<&Argument> = op.arguments.iter().filter(|a| keep(a)).collect();
    to_value(&args, filter)
}

fn enum_member_filter(value: &Value, args: &Args) -> tera::Result<Value> {
    let type_name = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("filter `enum_member` expects an enum type name"))?;
    let member = args
        .get("member")
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg("filter `enum_member` needs a `member` string argument"))?;
    Ok(Value::String(naming::enum_member(type_name, member)))
}

// ------------------------------- Tests ------------------------------------ //
