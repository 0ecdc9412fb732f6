//! Structured identities of persisted model entities.
//!
//! A [`Key`] is an immutable, structurally compared identity. The kind tag in
//! [`KeyData`] is authoritative: two keys are equal iff they have the same
//! kind, the same unit and equal kind-specific fields. The hash is computed
//! once at construction from exactly those fields, so the set-once end
//! offset of offset-anchored keys never influences equality or hashing.

mod kind;
mod name;
mod offset;
mod presentation;

pub use kind::{ContainerKind, DeclarationKind, OffsetKind, Visibility};
pub use name::{disambiguated, display_name, DISAMBIGUATION_DELIMITER};
pub use offset::{CachedOffset, NON_INITIALIZED};
pub use presentation::{KeyPresentation, PresentationSnapshot, SourceEntity};

use crate::handler::HandlerCode;
use crate::unit::UnitId;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A key shared through the interning pool.
pub type SharedKey = Arc<Key>;

/// Kind-specific payload of a key.
#[derive(Clone, Debug)]
pub enum KeyData {
    /// The project of the unit itself.
    Project,
    /// A namespace, by qualified name.
    Namespace {
        /// Qualified name, e.g. `std::chrono`.
        name: Arc<str>,
    },
    /// A source file of the unit.
    File {
        /// Path as known to the project.
        path: Arc<str>,
    },
    /// One of the per-unit containers.
    Container(ContainerKind),
    /// An entity anchored at a source offset.
    Offset(OffsetData),
}

/// Fields of an offset-anchored key.
#[derive(Clone, Debug)]
pub struct OffsetData {
    kind: OffsetKind,
    file: Arc<str>,
    name: Arc<str>,
    start: i32,
    end: CachedOffset,
}

impl OffsetData {
    /// Kind of the anchored entity.
    pub fn kind(&self) -> OffsetKind {
        self.kind
    }

    /// Containing file.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Full name, including any `###` suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start offset.
    pub fn start(&self) -> i32 {
        self.start
    }

    /// End offset, [`NON_INITIALIZED`] until cached.
    pub fn end(&self) -> i32 {
        self.end.get()
    }

    pub(crate) fn file_arc(&self) -> &Arc<str> {
        &self.file
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }
}

impl KeyData {
    fn same_identity(&self, other: &KeyData) -> bool {
        match (self, other) {
            (KeyData::Project, KeyData::Project) => true,
            (KeyData::Namespace { name: a }, KeyData::Namespace { name: b }) => a == b,
            (KeyData::File { path: a }, KeyData::File { path: b }) => a == b,
            (KeyData::Container(a), KeyData::Container(b)) => a == b,
            (KeyData::Offset(a), KeyData::Offset(b)) => {
                a.kind == b.kind && a.start == b.start && a.name == b.name && a.file == b.file
            }
            _ => false,
        }
    }
}

/// Identity of a persisted entity.
///
/// # Examples
///
/// ```
/// use keyrepo_core::{Key, OffsetKind, UnitId, NON_INITIALIZED};
///
/// let unit = UnitId::new(20001);
/// let a = Key::offset(unit, OffsetKind::Macro, "a.cpp", "FOO", 10, NON_INITIALIZED);
/// let b = Key::offset(unit, OffsetKind::Macro, "a.cpp", "FOO", 10, 25);
/// // the end offset is a cache, not part of the identity
/// assert_eq!(a, b);
/// ```
pub struct Key {
    unit: UnitId,
    data: KeyData,
    hash: u64,
}

impl Key {
    fn build(unit: UnitId, data: KeyData) -> Self {
        let hash = identity_hash(unit, &data);
        Self { unit, data, hash }
    }

    /// Project key of a unit.
    pub fn project(unit: UnitId) -> Self {
        Self::build(unit, KeyData::Project)
    }

    /// Namespace key.
    pub fn namespace(unit: UnitId, qualified_name: impl Into<Arc<str>>) -> Self {
        Self::build(
            unit,
            KeyData::Namespace {
                name: qualified_name.into(),
            },
        )
    }

    /// File key.
    pub fn file(unit: UnitId, path: impl Into<Arc<str>>) -> Self {
        Self::build(unit, KeyData::File { path: path.into() })
    }

    /// Container key. There is one logical instance per unit and kind.
    pub fn container(unit: UnitId, kind: ContainerKind) -> Self {
        Self::build(unit, KeyData::Container(kind))
    }

    /// Offset-anchored key. `end` may be [`NON_INITIALIZED`].
    pub fn offset(
        unit: UnitId,
        kind: OffsetKind,
        file: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        start: i32,
        end: i32,
    ) -> Self {
        Self::build(
            unit,
            KeyData::Offset(OffsetData {
                kind,
                file: file.into(),
                name: name.into(),
                start,
                end: CachedOffset::new(end),
            }),
        )
    }

    /// Declaration key.
    pub fn declaration(
        unit: UnitId,
        kind: DeclarationKind,
        file: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        start: i32,
        end: i32,
    ) -> Self {
        Self::offset(unit, OffsetKind::Declaration(kind), file, name, start, end)
    }

    /// Offset-anchored key selected by its kind character.
    ///
    /// Returns `None` for characters no offset kind uses.
    pub fn from_kind_char(
        unit: UnitId,
        kind_char: char,
        file: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        start: i32,
        end: i32,
    ) -> Option<Self> {
        OffsetKind::from_kind_char(kind_char)
            .map(|kind| Self::offset(unit, kind, file, name, start, end))
    }

    /// Key of a live model entity.
    pub fn for_entity<E: SourceEntity + ?Sized>(kind: OffsetKind, entity: &E) -> Self {
        Self::offset(
            entity.unit_id(),
            kind,
            entity.file_path(),
            entity.entity_name(),
            entity.start_offset(),
            entity.end_offset(),
        )
    }

    /// Owning unit.
    #[inline]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Kind-specific payload.
    #[inline]
    pub fn data(&self) -> &KeyData {
        &self.data
    }

    /// Persistence handler of this key's kind.
    #[inline]
    pub fn handler(&self) -> HandlerCode {
        HandlerCode::of(&self.data)
    }

    /// Structural hash, a pure function of the identity fields.
    #[inline]
    pub fn hash_code(&self) -> u64 {
        self.hash
    }

    /// Whether this key kind is shared through the interning pool.
    pub fn is_interned(&self) -> bool {
        self.handler().is_interned()
    }

    /// Whether the object behind this key stays cached for the unit's
    /// lifetime (containers and the project object).
    pub fn has_cache(&self) -> bool {
        matches!(self.data, KeyData::Project | KeyData::Container(_))
    }

    /// Offset kind, for offset-anchored keys.
    pub fn offset_kind(&self) -> Option<OffsetKind> {
        match &self.data {
            KeyData::Offset(o) => Some(o.kind),
            _ => None,
        }
    }

    /// Full name used for identity (namespace or offset keys).
    pub fn name(&self) -> Option<&str> {
        match &self.data {
            KeyData::Namespace { name } => Some(name),
            KeyData::Offset(o) => Some(&o.name),
            _ => None,
        }
    }

    /// Name with the `###` disambiguation suffix removed.
    pub fn display_name(&self) -> Option<&str> {
        self.name().map(display_name)
    }

    /// File path (file keys and offset keys).
    pub fn file_path(&self) -> Option<&str> {
        match &self.data {
            KeyData::File { path } => Some(path),
            KeyData::Offset(o) => Some(&o.file),
            _ => None,
        }
    }

    /// Start offset of offset-anchored keys.
    pub fn start_offset(&self) -> Option<i32> {
        match &self.data {
            KeyData::Offset(o) => Some(o.start),
            _ => None,
        }
    }

    /// End offset of offset-anchored keys, possibly [`NON_INITIALIZED`].
    pub fn end_offset(&self) -> Option<i32> {
        match &self.data {
            KeyData::Offset(o) => Some(o.end.get()),
            _ => None,
        }
    }

    /// Caches the end offset.
    ///
    /// # Panics
    ///
    /// Panics if a different end offset was already cached, or if this key
    /// is not offset-anchored.
    pub fn cache_end_offset(&self, end: i32) {
        match &self.data {
            KeyData::Offset(o) => o.end.cache(end),
            _ => panic!("{self} has no end offset to cache"),
        }
    }

    /// Number of primary (string) path segments.
    pub fn depth(&self) -> usize {
        match &self.data {
            KeyData::Project | KeyData::Container(_) => 0,
            KeyData::Namespace { .. } | KeyData::File { .. } => 1,
            KeyData::Offset(_) => 2,
        }
    }

    /// Primary path segment at `level`.
    pub fn get_at(&self, level: usize) -> Option<&str> {
        match (&self.data, level) {
            (KeyData::Namespace { name }, 0) => Some(name),
            (KeyData::File { path }, 0) => Some(path),
            (KeyData::Offset(o), 0) => Some(&o.file),
            (KeyData::Offset(o), 1) => Some(&o.name),
            _ => None,
        }
    }

    /// Number of secondary (integer) path segments.
    pub fn secondary_depth(&self) -> usize {
        match &self.data {
            KeyData::Offset(_) => 3,
            _ => 1,
        }
    }

    /// Secondary path segment at `level`: handler code, then kind character
    /// and start offset for offset-anchored keys.
    pub fn get_secondary_at(&self, level: usize) -> Option<i32> {
        match (&self.data, level) {
            (_, 0) => Some(i32::from(self.handler().code())),
            (KeyData::Offset(o), 1) => Some(o.kind.kind_char() as i32),
            (KeyData::Offset(o), 2) => Some(o.start),
            _ => None,
        }
    }

    /// Orders offset keys of the same kind, unit and file by start offset
    /// (then name). Returns `None` for keys that are not comparable.
    pub fn offset_order(&self, other: &Key) -> Option<Ordering> {
        match (&self.data, &other.data) {
            (KeyData::Offset(a), KeyData::Offset(b))
                if self.unit == other.unit && a.kind == b.kind && a.file == b.file =>
            {
                Some(a.start.cmp(&b.start).then_with(|| a.name.cmp(&b.name)))
            }
            _ => None,
        }
    }
}

impl Clone for Key {
    fn clone(&self) -> Self {
        Self {
            unit: self.unit,
            data: self.data.clone(),
            hash: self.hash,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.unit == other.unit && self.data.same_identity(&other.data)
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            KeyData::Project => write!(f, "Project[{}]", self.unit),
            KeyData::Namespace { name } => write!(f, "Namespace[{}] {}", self.unit, name),
            KeyData::File { path } => write!(f, "File[{}] {}", self.unit, path),
            KeyData::Container(_) => write!(f, "{:?}[{}]", self.handler(), self.unit),
            KeyData::Offset(o) => write!(
                f,
                "{}[{}] '{}' {} {} [{}-{:?}]",
                o.kind.label(),
                self.unit,
                o.kind.kind_char(),
                o.file,
                o.name,
                o.start,
                o.end
            ),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

/// FNV-1a over the identity fields.
struct IdentityHasher(u64);

impl IdentityHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self(Self::OFFSET_BASIS)
    }

    fn bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u64::from(b);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn int(&mut self, v: i32) {
        self.bytes(&v.to_le_bytes());
    }

    fn text(&mut self, s: &str) {
        self.int(s.len() as i32);
        self.bytes(s.as_bytes());
    }

    fn finish(self) -> u64 {
        // fold the high bits down so shard masks see them
        self.0 ^ (self.0 >> 32)
    }
}

fn identity_hash(unit: UnitId, data: &KeyData) -> u64 {
    let mut h = IdentityHasher::new();
    h.int(i32::from(HandlerCode::of(data).code()));
    h.int(unit.get());
    match data {
        KeyData::Project | KeyData::Container(_) => {}
        KeyData::Namespace { name } => h.text(name),
        KeyData::File { path } => h.text(path),
        KeyData::Offset(o) => {
            h.text(&o.file);
            h.text(&o.name);
            h.int(o.start);
        }
    }
    h.finish()
}
