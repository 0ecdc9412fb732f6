//! Kind tags of the key taxonomy.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Per-unit container objects. Exactly one key of each kind exists per unit.
#[repr(u8)]
#[derive(Serialize_repr, Deserialize_repr, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContainerKind {
    /// Project-wide declaration container.
    Declarations = 1,
    /// Classifier (class, struct, union, enum) container.
    Classifiers = 2,
    /// File container.
    Files = 3,
    /// Include graph container.
    Graph = 4,
    /// Container of declarations grouped by namespace.
    NamespaceDeclarations = 5,
}

impl ContainerKind {
    /// All container kinds, in handler order.
    pub const ALL: [ContainerKind; 5] = [
        ContainerKind::Declarations,
        ContainerKind::Classifiers,
        ContainerKind::Files,
        ContainerKind::Graph,
        ContainerKind::NamespaceDeclarations,
    ];
}

/// Access specifier of a base class or member.
#[repr(u8)]
#[derive(Serialize_repr, Deserialize_repr, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Visibility {
    /// `public`
    Public = 0,
    /// `protected`
    Protected = 1,
    /// `private`
    Private = 2,
}

impl Visibility {
    /// Decodes the wire byte.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Public),
            1 => Some(Self::Protected),
            2 => Some(Self::Private),
            _ => None,
        }
    }
}

/// Declared entity kinds. Keys of these kinds are never interned.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeclarationKind {
    /// Class definition.
    Class,
    /// Struct definition.
    Struct,
    /// Union definition.
    Union,
    /// Enum definition.
    Enum,
    /// Enumerator inside an enum.
    Enumerator,
    /// Free function declaration.
    Function,
    /// Free function definition.
    FunctionDefinition,
    /// Member function.
    Method,
    /// Constructor.
    Constructor,
    /// Destructor.
    Destructor,
    /// Data member.
    Field,
    /// Variable declaration.
    Variable,
    /// Variable definition outside its class or namespace.
    VariableDefinition,
    /// `typedef`
    Typedef,
    /// `using X = ...`
    TypeAlias,
    /// `namespace a = b;`
    NamespaceAlias,
    /// `using namespace x;`
    UsingDirective,
    /// `using x::y;`
    UsingDeclaration,
    /// Forward class declaration.
    ClassForward,
    /// Template parameter.
    TemplateParameter,
    /// Friend declaration.
    Friend,
}

impl DeclarationKind {
    /// All declaration kinds, in handler order.
    pub const ALL: [DeclarationKind; 21] = [
        DeclarationKind::Class,
        DeclarationKind::Struct,
        DeclarationKind::Union,
        DeclarationKind::Enum,
        DeclarationKind::Enumerator,
        DeclarationKind::Function,
        DeclarationKind::FunctionDefinition,
        DeclarationKind::Method,
        DeclarationKind::Constructor,
        DeclarationKind::Destructor,
        DeclarationKind::Field,
        DeclarationKind::Variable,
        DeclarationKind::VariableDefinition,
        DeclarationKind::Typedef,
        DeclarationKind::TypeAlias,
        DeclarationKind::NamespaceAlias,
        DeclarationKind::UsingDirective,
        DeclarationKind::UsingDeclaration,
        DeclarationKind::ClassForward,
        DeclarationKind::TemplateParameter,
        DeclarationKind::Friend,
    ];

    /// Kind character used in key paths and debug output.
    pub fn kind_char(self) -> char {
        match self {
            Self::Class => 'C',
            Self::Struct => 'S',
            Self::Union => 'U',
            Self::Enum => 'E',
            Self::Enumerator => 'e',
            Self::Function => 'F',
            Self::FunctionDefinition => 'f',
            Self::Method => 'm',
            Self::Constructor => 'c',
            Self::Destructor => 'd',
            Self::Field => 'v',
            Self::Variable => 'V',
            Self::VariableDefinition => 'D',
            Self::Typedef => 'T',
            Self::TypeAlias => 'A',
            Self::NamespaceAlias => 'a',
            Self::UsingDirective => 'u',
            Self::UsingDeclaration => 'g',
            Self::ClassForward => 'w',
            Self::TemplateParameter => 't',
            Self::Friend => 'r',
        }
    }
}

/// Kind of an offset-anchored key.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OffsetKind {
    /// `#include` directive.
    Include,
    /// Macro definition.
    Macro,
    /// Parameter list of a function-like entity.
    ParamList,
    /// Template instantiation; the name carries the signature after `###`.
    Instantiation,
    /// Base-class specifier with its access.
    Inheritance(Visibility),
    /// Declared entity.
    Declaration(DeclarationKind),
}

impl OffsetKind {
    /// Kind character used in key paths and debug output.
    ///
    /// Characters are unique across all offset kinds.
    pub fn kind_char(self) -> char {
        match self {
            Self::Include => '#',
            Self::Macro => 'M',
            Self::ParamList => 'P',
            Self::Instantiation => 'I',
            Self::Inheritance(Visibility::Public) => '+',
            Self::Inheritance(Visibility::Protected) => '~',
            Self::Inheritance(Visibility::Private) => '-',
            Self::Declaration(kind) => kind.kind_char(),
        }
    }

    /// Inverse of [`OffsetKind::kind_char`].
    pub fn from_kind_char(c: char) -> Option<Self> {
        let simple = match c {
            '#' => Some(Self::Include),
            'M' => Some(Self::Macro),
            'P' => Some(Self::ParamList),
            'I' => Some(Self::Instantiation),
            '+' => Some(Self::Inheritance(Visibility::Public)),
            '~' => Some(Self::Inheritance(Visibility::Protected)),
            '-' => Some(Self::Inheritance(Visibility::Private)),
            _ => None,
        };
        simple.or_else(|| {
            DeclarationKind::ALL
                .iter()
                .copied()
                .find(|k| k.kind_char() == c)
                .map(Self::Declaration)
        })
    }

    /// True for declaration keys.
    pub fn is_declaration(self) -> bool {
        matches!(self, Self::Declaration(_))
    }

    /// Human-readable kind label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Include => "Include",
            Self::Macro => "Macro",
            Self::ParamList => "ParamList",
            Self::Instantiation => "Instantiation",
            Self::Inheritance(_) => "Inheritance",
            Self::Declaration(DeclarationKind::Class) => "Class",
            Self::Declaration(DeclarationKind::Struct) => "Struct",
            Self::Declaration(DeclarationKind::Union) => "Union",
            Self::Declaration(DeclarationKind::Enum) => "Enum",
            Self::Declaration(DeclarationKind::Enumerator) => "Enumerator",
            Self::Declaration(DeclarationKind::Function) => "Function",
            Self::Declaration(DeclarationKind::FunctionDefinition) => "FunctionDefinition",
            Self::Declaration(DeclarationKind::Method) => "Method",
            Self::Declaration(DeclarationKind::Constructor) => "Constructor",
            Self::Declaration(DeclarationKind::Destructor) => "Destructor",
            Self::Declaration(DeclarationKind::Field) => "Field",
            Self::Declaration(DeclarationKind::Variable) => "Variable",
            Self::Declaration(DeclarationKind::VariableDefinition) => "VariableDefinition",
            Self::Declaration(DeclarationKind::Typedef) => "Typedef",
            Self::Declaration(DeclarationKind::TypeAlias) => "TypeAlias",
            Self::Declaration(DeclarationKind::NamespaceAlias) => "NamespaceAlias",
            Self::Declaration(DeclarationKind::UsingDirective) => "UsingDirective",
            Self::Declaration(DeclarationKind::UsingDeclaration) => "UsingDeclaration",
            Self::Declaration(DeclarationKind::ClassForward) => "ClassForward",
            Self::Declaration(DeclarationKind::TemplateParameter) => "TemplateParameter",
            Self::Declaration(DeclarationKind::Friend) => "Friend",
        }
    }
}
