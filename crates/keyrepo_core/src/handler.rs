//! Handler codes of the persistent key format.
//!
//! The table is append-only: a new key variant takes the next unused code and
//! bumps [`PERSISTENCE_VERSION`]. Readers and writers of different versions
//! are not compatible; a mismatch is detected when a repository is opened and
//! forces a full rebuild.

use crate::key::{ContainerKind, DeclarationKind, KeyData, OffsetKind, Visibility};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;

/// Persistence format version of this build.
pub const PERSISTENCE_VERSION: i32 = 236;

/// Added to [`PERSISTENCE_VERSION`] when experimental mode is on, so that
/// experimental and regular repositories never read each other.
pub const EXPERIMENTAL_VERSION_OFFSET: i32 = 10_000;

/// Version number written to and checked against the repository.
pub fn persistence_version(experimental: bool) -> i32 {
    if experimental {
        PERSISTENCE_VERSION + EXPERIMENTAL_VERSION_OFFSET
    } else {
        PERSISTENCE_VERSION
    }
}

/// Discriminator written in front of every serialized key.
#[repr(i16)]
#[derive(Serialize_repr, Deserialize_repr, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandlerCode {
    /// Absent optional key.
    Null = 0,
    /// Project identity.
    Project = 1,
    /// Namespace identity.
    Namespace = 2,
    /// File identity.
    File = 3,
    /// Project declaration container.
    DeclarationContainer = 4,
    /// Classifier container.
    ClassifierContainer = 5,
    /// File container.
    FileContainer = 6,
    /// Include graph container.
    GraphContainer = 7,
    /// Namespace declaration container.
    NamespaceDeclarationContainer = 8,
    /// `#include` directive.
    Include = 9,
    /// Macro definition.
    Macro = 10,
    /// Parameter list.
    ParamList = 11,
    /// Template instantiation.
    Instantiation = 12,
    /// Public base class.
    InheritancePublic = 13,
    /// Protected base class.
    InheritanceProtected = 14,
    /// Private base class.
    InheritancePrivate = 15,
    /// Class declaration.
    Class = 16,
    /// Struct declaration.
    Struct = 17,
    /// Union declaration.
    Union = 18,
    /// Enum declaration.
    Enum = 19,
    /// Enumerator.
    Enumerator = 20,
    /// Function declaration.
    Function = 21,
    /// Function definition.
    FunctionDefinition = 22,
    /// Member function.
    Method = 23,
    /// Constructor.
    Constructor = 24,
    /// Destructor.
    Destructor = 25,
    /// Data member.
    Field = 26,
    /// Variable.
    Variable = 27,
    /// Variable definition.
    VariableDefinition = 28,
    /// Typedef.
    Typedef = 29,
    /// Type alias.
    TypeAlias = 30,
    /// Namespace alias.
    NamespaceAlias = 31,
    /// Using directive.
    UsingDirective = 32,
    /// Using declaration.
    UsingDeclaration = 33,
    /// Forward class declaration.
    ClassForward = 34,
    /// Template parameter.
    TemplateParameter = 35,
    /// Friend declaration.
    Friend = 36,
}

/// Structural family a handler code decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// Project identity (unit only).
    Project,
    /// Namespace (unit, qualified name).
    Namespace,
    /// File (unit, path).
    File,
    /// Per-unit container.
    Container(ContainerKind),
    /// Offset-anchored key.
    Offset(OffsetKind),
}

impl HandlerCode {
    /// Highest assigned code.
    pub const LAST: HandlerCode = HandlerCode::Friend;

    /// Looks up a raw code. Unknown codes return `None`.
    pub fn from_code(code: i16) -> Option<Self> {
        use HandlerCode::*;
        let handler = match code {
            0 => Null,
            1 => Project,
            2 => Namespace,
            3 => File,
            4 => DeclarationContainer,
            5 => ClassifierContainer,
            6 => FileContainer,
            7 => GraphContainer,
            8 => NamespaceDeclarationContainer,
            9 => Include,
            10 => Macro,
            11 => ParamList,
            12 => Instantiation,
            13 => InheritancePublic,
            14 => InheritanceProtected,
            15 => InheritancePrivate,
            16 => Class,
            17 => Struct,
            18 => Union,
            19 => Enum,
            20 => Enumerator,
            21 => Function,
            22 => FunctionDefinition,
            23 => Method,
            24 => Constructor,
            25 => Destructor,
            26 => Field,
            27 => Variable,
            28 => VariableDefinition,
            29 => Typedef,
            30 => TypeAlias,
            31 => NamespaceAlias,
            32 => UsingDirective,
            33 => UsingDeclaration,
            34 => ClassForward,
            35 => TemplateParameter,
            36 => Friend,
            _ => return None,
        };
        Some(handler)
    }

    /// Raw wire value.
    #[inline]
    pub fn code(self) -> i16 {
        self as i16
    }

    /// Handler of a key payload.
    pub fn of(data: &KeyData) -> Self {
        match data {
            KeyData::Project => Self::Project,
            KeyData::Namespace { .. } => Self::Namespace,
            KeyData::File { .. } => Self::File,
            KeyData::Container(kind) => Self::for_container(*kind),
            KeyData::Offset(offset) => Self::for_offset(offset.kind()),
        }
    }

    /// Handler of a container kind.
    pub fn for_container(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Declarations => Self::DeclarationContainer,
            ContainerKind::Classifiers => Self::ClassifierContainer,
            ContainerKind::Files => Self::FileContainer,
            ContainerKind::Graph => Self::GraphContainer,
            ContainerKind::NamespaceDeclarations => Self::NamespaceDeclarationContainer,
        }
    }

    /// Handler of an offset kind.
    pub fn for_offset(kind: OffsetKind) -> Self {
        match kind {
            OffsetKind::Include => Self::Include,
            OffsetKind::Macro => Self::Macro,
            OffsetKind::ParamList => Self::ParamList,
            OffsetKind::Instantiation => Self::Instantiation,
            OffsetKind::Inheritance(Visibility::Public) => Self::InheritancePublic,
            OffsetKind::Inheritance(Visibility::Protected) => Self::InheritanceProtected,
            OffsetKind::Inheritance(Visibility::Private) => Self::InheritancePrivate,
            OffsetKind::Declaration(kind) => match kind {
                DeclarationKind::Class => Self::Class,
                DeclarationKind::Struct => Self::Struct,
                DeclarationKind::Union => Self::Union,
                DeclarationKind::Enum => Self::Enum,
                DeclarationKind::Enumerator => Self::Enumerator,
                DeclarationKind::Function => Self::Function,
                DeclarationKind::FunctionDefinition => Self::FunctionDefinition,
                DeclarationKind::Method => Self::Method,
                DeclarationKind::Constructor => Self::Constructor,
                DeclarationKind::Destructor => Self::Destructor,
                DeclarationKind::Field => Self::Field,
                DeclarationKind::Variable => Self::Variable,
                DeclarationKind::VariableDefinition => Self::VariableDefinition,
                DeclarationKind::Typedef => Self::Typedef,
                DeclarationKind::TypeAlias => Self::TypeAlias,
                DeclarationKind::NamespaceAlias => Self::NamespaceAlias,
                DeclarationKind::UsingDirective => Self::UsingDirective,
                DeclarationKind::UsingDeclaration => Self::UsingDeclaration,
                DeclarationKind::ClassForward => Self::ClassForward,
                DeclarationKind::TemplateParameter => Self::TemplateParameter,
                DeclarationKind::Friend => Self::Friend,
            },
        }
    }

    /// Structural family of this code; `None` for [`HandlerCode::Null`].
    pub fn shape(self) -> Option<KeyShape> {
        use HandlerCode::*;
        let shape = match self {
            Null => return None,
            Project => KeyShape::Project,
            Namespace => KeyShape::Namespace,
            File => KeyShape::File,
            DeclarationContainer => KeyShape::Container(ContainerKind::Declarations),
            ClassifierContainer => KeyShape::Container(ContainerKind::Classifiers),
            FileContainer => KeyShape::Container(ContainerKind::Files),
            GraphContainer => KeyShape::Container(ContainerKind::Graph),
            NamespaceDeclarationContainer => {
                KeyShape::Container(ContainerKind::NamespaceDeclarations)
            }
            Include => KeyShape::Offset(OffsetKind::Include),
            Macro => KeyShape::Offset(OffsetKind::Macro),
            ParamList => KeyShape::Offset(OffsetKind::ParamList),
            Instantiation => KeyShape::Offset(OffsetKind::Instantiation),
            InheritancePublic => KeyShape::Offset(OffsetKind::Inheritance(Visibility::Public)),
            InheritanceProtected => {
                KeyShape::Offset(OffsetKind::Inheritance(Visibility::Protected))
            }
            InheritancePrivate => KeyShape::Offset(OffsetKind::Inheritance(Visibility::Private)),
            Class => decl(DeclarationKind::Class),
            Struct => decl(DeclarationKind::Struct),
            Union => decl(DeclarationKind::Union),
            Enum => decl(DeclarationKind::Enum),
            Enumerator => decl(DeclarationKind::Enumerator),
            Function => decl(DeclarationKind::Function),
            FunctionDefinition => decl(DeclarationKind::FunctionDefinition),
            Method => decl(DeclarationKind::Method),
            Constructor => decl(DeclarationKind::Constructor),
            Destructor => decl(DeclarationKind::Destructor),
            Field => decl(DeclarationKind::Field),
            Variable => decl(DeclarationKind::Variable),
            VariableDefinition => decl(DeclarationKind::VariableDefinition),
            Typedef => decl(DeclarationKind::Typedef),
            TypeAlias => decl(DeclarationKind::TypeAlias),
            NamespaceAlias => decl(DeclarationKind::NamespaceAlias),
            UsingDirective => decl(DeclarationKind::UsingDirective),
            UsingDeclaration => decl(DeclarationKind::UsingDeclaration),
            ClassForward => decl(DeclarationKind::ClassForward),
            TemplateParameter => decl(DeclarationKind::TemplateParameter),
            Friend => decl(DeclarationKind::Friend),
        };
        Some(shape)
    }

    /// Whether keys read with this code go through the interning pool.
    ///
    /// Declaration keys are semantically unique and cheap to rebuild, so
    /// they are never interned.
    pub fn is_interned(self) -> bool {
        match self.shape() {
            Some(KeyShape::Offset(kind)) => !kind.is_declaration(),
            Some(_) => true,
            None => false,
        }
    }
}

fn decl(kind: DeclarationKind) -> KeyShape {
    KeyShape::Offset(OffsetKind::Declaration(kind))
}

impl fmt::Display for HandlerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}
