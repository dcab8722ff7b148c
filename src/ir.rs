// Strongly-typed model of the operation registry. No GObject flags or type
// tags past this point; the normalizer is the only place that inspects them.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
    InputOutput,
}

/// Nearest well-known ancestor of an object type in the image-type hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Image,
    Source,
    Target,
    Interpolate,
    Other,
}

/// Closed set of semantic argument kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArgKind {
    Integer,
    Float,
    Boolean,
    String,
    Enum { type_name: String, flags: bool },
    Array { item: Box<ArgKind> },
    Object { type_name: String, class: ObjectClass },
    Blob,
}

impl ArgKind {
    pub fn image() -> Self {
        ArgKind::Object { type_name: "VipsImage".into(), class: ObjectClass::Image }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ArgKind::Object { class: ObjectClass::Image, .. })
    }

    /// Reference kinds default to nil when optional.
    pub fn is_reference(&self) -> bool {
        matches!(self, ArgKind::Array { .. } | ArgKind::Object { .. } | ArgKind::Blob)
    }
}

/// A default value, representable as a literal in every target layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Enum {
        type_name: String,
        /// `None` for flag combinations that name no single member
        member: Option<String>,
        value: i64,
    },
}

impl Literal {
    /// Zero literal of a kind: used for optional outputs and as a fallback
    /// when the registry reports no default for an optional scalar.
    pub fn zero(kind: &ArgKind) -> Self {
        match kind {
            ArgKind::Integer => Literal::Int(0),
            ArgKind::Float => Literal::Float(OrderedFloat(0.0)),
            ArgKind::Boolean => Literal::Bool(false),
            ArgKind::String => Literal::Str(String::new()),
            ArgKind::Enum { type_name, .. } => Literal::Enum {
                type_name: type_name.clone(),
                member: None,
                value: 0,
            },
            ArgKind::Array { .. } | ArgKind::Object { .. } | ArgKind::Blob => Literal::Nil,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    /// snake_case identifier used in generated code
    pub name: String,
    /// property name passed to the native call
    pub native_name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ArgKind,
    pub direction: Direction,
    pub required: bool,
    /// present for every optional argument, absent for required ones
    pub default: Option<Literal>,
}

impl Argument {
    pub fn is_input(&self) -> bool {
        matches!(self.direction, Direction::Input | Direction::InputOutput)
    }

    pub fn is_output(&self) -> bool {
        matches!(self.direction, Direction::Output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub native_name: String,
    #[serde(default)]
    pub description: String,
    /// required arguments first, each partition in native declaration order
    pub arguments: Vec<Argument>,
    pub has_output: bool,
    pub deprecated: bool,
}

impl Operation {
    pub fn required(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.required)
    }

    pub fn optional(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| !a.required)
    }

    pub fn required_inputs(&self) -> impl Iterator<Item = &Argument> {
        self.required().filter(|a| a.is_input())
    }

    pub fn required_outputs(&self) -> impl Iterator<Item = &Argument> {
        self.required().filter(|a| a.is_output())
    }

    pub fn optional_inputs(&self) -> impl Iterator<Item = &Argument> {
        self.optional().filter(|a| a.is_input())
    }

    pub fn optional_outputs(&self) -> impl Iterator<Item = &Argument> {
        self.optional().filter(|a| a.is_output())
    }

    /// First required output, if the operation produces one.
    pub fn primary_output(&self) -> Option<&Argument> {
        self.required_outputs().next()
    }

    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMember {
    /// normalized nick, e.g. `lanczos3`
    pub name: String,
    /// native constant, e.g. `VIPS_KERNEL_LANCZOS3`
    pub native_name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumTypeInfo {
    pub name: String,
    pub flags: bool,
    /// registry insertion order, never sorted
    pub members: Vec<EnumMember>,
}

impl EnumTypeInfo {
    pub fn member_by_value(&self, value: i64) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.value == value)
    }

    pub fn member_by_name(&self, name: &str) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTypeInfo {
    pub name: String,
    pub parent: Option<String>,
}
