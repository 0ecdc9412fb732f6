//! Auxiliary values persisted next to keys.
//!
//! Model objects carry small structured values (parameters, type references,
//! expressions) that are not addressed by a key of their own. They are
//! written through the same registry as keys, each prefixed by a
//! [`ValueTag`] byte.

use crate::key::{SharedKey, Visibility};
use std::fmt;

/// Tag byte written in front of every auxiliary value.
///
/// Append-only, like the key handler table.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    /// Absent optional value.
    Null = 0,
    /// [`Param`]
    Param = 1,
    /// [`ParamList`]
    ParamList = 2,
    /// [`TypeRef`]
    TypeRef = 3,
    /// [`Expression`]
    Expression = 4,
    /// [`Visibility`]
    Visibility = 5,
    /// [`CompoundBody`]
    CompoundBody = 6,
    /// [`TemplateDescriptor`]
    TemplateDescriptor = 7,
    /// [`SpecializationDescriptor`]
    SpecializationDescriptor = 8,
}

impl ValueTag {
    /// Highest assigned tag.
    pub const LAST: ValueTag = ValueTag::SpecializationDescriptor;

    /// Looks up a raw tag. Unknown tags return `None`.
    pub fn from_u8(tag: u8) -> Option<Self> {
        let tag = match tag {
            0 => Self::Null,
            1 => Self::Param,
            2 => Self::ParamList,
            3 => Self::TypeRef,
            4 => Self::Expression,
            5 => Self::Visibility,
            6 => Self::CompoundBody,
            7 => Self::TemplateDescriptor,
            8 => Self::SpecializationDescriptor,
            _ => return None,
        };
        Some(tag)
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, *self as u8)
    }
}

/// Reference to a type as written in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Spelling of the type, e.g. `std::string`.
    pub text: String,
    /// Resolved classifier, if known.
    pub classifier: Option<SharedKey>,
    /// Number of `*`.
    pub pointer_depth: u8,
    /// `&` or `&&`.
    pub reference: bool,
    /// `const` qualified.
    pub is_const: bool,
}

impl TypeRef {
    /// Unresolved type with the given spelling.
    pub fn named(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            classifier: None,
            pointer_depth: 0,
            reference: false,
            is_const: false,
        }
    }
}

/// Source expression, kept as text plus its span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    /// Expression text.
    pub text: String,
    /// Start offset.
    pub start: i32,
    /// End offset.
    pub end: i32,
}

/// One function or template parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Declared name; unnamed parameters have none.
    pub name: Option<String>,
    /// Declared type; `...` has none.
    pub ty: Option<TypeRef>,
    /// Default argument.
    pub default: Option<Expression>,
}

/// Parameter list of a function-like entity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParamList {
    /// Parameters in declaration order.
    pub params: Vec<Param>,
    /// Ends with `...`.
    pub varargs: bool,
}

/// Lazily parsed function body, addressed by its span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundBody {
    /// Start offset of `{`.
    pub start: i32,
    /// End offset of `}`.
    pub end: i32,
    /// Declarations local to the body that have keys of their own.
    pub declarations: Vec<SharedKey>,
}

/// Template header of a templated declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateDescriptor {
    /// Keys of the template parameters.
    pub parameters: Vec<SharedKey>,
    /// Textual suffix, e.g. `<T, N>`.
    pub suffix: String,
    /// Explicit or partial specialization.
    pub specialization: bool,
}

/// Arguments of a template specialization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecializationDescriptor {
    /// Primary template, if resolved.
    pub primary: Option<SharedKey>,
    /// Specialization arguments.
    pub arguments: Vec<TypeRef>,
}

/// Any auxiliary value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuxValue {
    /// A single parameter.
    Param(Param),
    /// A parameter list.
    ParamList(ParamList),
    /// A type reference.
    TypeRef(TypeRef),
    /// An expression.
    Expression(Expression),
    /// An access specifier.
    Visibility(Visibility),
    /// A function body.
    CompoundBody(CompoundBody),
    /// A template header.
    TemplateDescriptor(TemplateDescriptor),
    /// Specialization arguments.
    SpecializationDescriptor(SpecializationDescriptor),
}

impl AuxValue {
    /// Tag this value is written with.
    pub fn tag(&self) -> ValueTag {
        match self {
            Self::Param(_) => ValueTag::Param,
            Self::ParamList(_) => ValueTag::ParamList,
            Self::TypeRef(_) => ValueTag::TypeRef,
            Self::Expression(_) => ValueTag::Expression,
            Self::Visibility(_) => ValueTag::Visibility,
            Self::CompoundBody(_) => ValueTag::CompoundBody,
            Self::TemplateDescriptor(_) => ValueTag::TemplateDescriptor,
            Self::SpecializationDescriptor(_) => ValueTag::SpecializationDescriptor,
        }
    }
}
