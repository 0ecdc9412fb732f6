//! Read-only views a key can be rebuilt from without touching the model.

use super::{Key, KeyData, NON_INITIALIZED};
use crate::handler::{HandlerCode, KeyShape};
use crate::unit::UnitId;
use serde::{Deserialize, Serialize};

/// Narrow projection of a key, used e.g. by cross-reference resolution to
/// rebuild identities without loading model objects.
///
/// Offsets are [`NON_INITIALIZED`] for keys that are not offset-anchored.
pub trait KeyPresentation {
    /// Owning unit.
    fn unit_presentation(&self) -> UnitId;
    /// Handler of the key kind.
    fn handler_presentation(&self) -> HandlerCode;
    /// Identity name (namespace or offset keys).
    fn name_presentation(&self) -> Option<&str>;
    /// File path (file and offset keys).
    fn file_presentation(&self) -> Option<&str>;
    /// Start offset.
    fn start_presentation(&self) -> i32;
    /// End offset.
    fn end_presentation(&self) -> i32;
}

/// Fields of a live model object that identify it.
pub trait SourceEntity {
    /// Unit the entity belongs to.
    fn unit_id(&self) -> UnitId;
    /// Containing file.
    fn file_path(&self) -> &str;
    /// Name used for identity.
    fn entity_name(&self) -> &str;
    /// Start offset in the file.
    fn start_offset(&self) -> i32;
    /// End offset, if already known.
    fn end_offset(&self) -> i32 {
        NON_INITIALIZED
    }
}

/// Owned [`KeyPresentation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationSnapshot {
    /// Owning unit.
    pub unit: UnitId,
    /// Handler of the key kind.
    pub handler: HandlerCode,
    /// Identity name.
    pub name: Option<String>,
    /// File path.
    pub file: Option<String>,
    /// Start offset.
    pub start: i32,
    /// End offset.
    pub end: i32,
}

impl KeyPresentation for PresentationSnapshot {
    fn unit_presentation(&self) -> UnitId {
        self.unit
    }

    fn handler_presentation(&self) -> HandlerCode {
        self.handler
    }

    fn name_presentation(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn file_presentation(&self) -> Option<&str> {
        self.file.as_deref()
    }

    fn start_presentation(&self) -> i32 {
        self.start
    }

    fn end_presentation(&self) -> i32 {
        self.end
    }
}

impl KeyPresentation for Key {
    fn unit_presentation(&self) -> UnitId {
        self.unit()
    }

    fn handler_presentation(&self) -> HandlerCode {
        self.handler()
    }

    fn name_presentation(&self) -> Option<&str> {
        self.name()
    }

    fn file_presentation(&self) -> Option<&str> {
        self.file_path()
    }

    fn start_presentation(&self) -> i32 {
        self.start_offset().unwrap_or(NON_INITIALIZED)
    }

    fn end_presentation(&self) -> i32 {
        self.end_offset().unwrap_or(NON_INITIALIZED)
    }
}

impl Key {
    /// Owned snapshot of this key's presentation.
    pub fn presentation(&self) -> PresentationSnapshot {
        PresentationSnapshot {
            unit: self.unit(),
            handler: self.handler(),
            name: self.name().map(str::to_owned),
            file: self.file_path().map(str::to_owned),
            start: self.start_presentation(),
            end: self.end_presentation(),
        }
    }

    /// Rebuilds a key from a presentation.
    ///
    /// # Panics
    ///
    /// Panics if the presentation names the null handler or lacks a field
    /// its kind requires.
    pub fn from_presentation<P: KeyPresentation + ?Sized>(p: &P) -> Key {
        let handler = p.handler_presentation();
        let unit = p.unit_presentation();
        let shape = handler
            .shape()
            .unwrap_or_else(|| panic!("cannot build a key from the null handler"));
        let required = |field: Option<&str>, what: &str| -> String {
            field
                .unwrap_or_else(|| panic!("presentation of {handler} has no {what}"))
                .to_owned()
        };
        match shape {
            KeyShape::Project => Key::project(unit),
            KeyShape::Namespace => Key::namespace(unit, required(p.name_presentation(), "name")),
            KeyShape::File => Key::file(unit, required(p.file_presentation(), "file")),
            KeyShape::Container(kind) => Key::container(unit, kind),
            KeyShape::Offset(kind) => Key::offset(
                unit,
                kind,
                required(p.file_presentation(), "file"),
                required(p.name_presentation(), "name"),
                p.start_presentation(),
                p.end_presentation(),
            ),
        }
    }

    pub(crate) fn is_offset(&self) -> bool {
        matches!(self.data(), KeyData::Offset(_))
    }
}
