//! Compilation-unit identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a compilation unit (a project or library scope).
///
/// Every key belongs to exactly one unit. Small ids are reserved as
/// placeholders for unresolved units; one of those leaking into a key means
/// the identity of a persisted entity is already wrong, so construction
/// panics instead of returning an error.
///
/// # Examples
///
/// ```
/// use keyrepo_core::UnitId;
///
/// let unit = UnitId::new(10001);
/// assert_eq!(unit.get(), 10001);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct UnitId(i32);

impl UnitId {
    /// Highest id of the reserved sentinel range.
    pub const MAX_RESERVED: i32 = 1000;

    /// First id handed out by the unit table.
    pub const FIRST_ALLOCATED: i32 = 10001;

    /// Creates a unit id.
    ///
    /// # Panics
    ///
    /// Panics if `raw` lies in the reserved range.
    #[inline]
    pub fn new(raw: i32) -> Self {
        assert!(
            raw > Self::MAX_RESERVED,
            "impossible unit id {raw}: ids <= {} are reserved",
            Self::MAX_RESERVED
        );
        Self(raw)
    }

    /// Returns `None` instead of panicking for reserved ids.
    #[inline]
    pub fn checked(raw: i32) -> Option<Self> {
        (raw > Self::MAX_RESERVED).then_some(Self(raw))
    }

    /// Returns the raw id.
    #[inline]
    pub fn get(self) -> i32 {
        self.0
    }

    /// Big-endian bytes, used as the storage prefix of every entry of the unit.
    #[inline]
    pub fn to_prefix(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl TryFrom<i32> for UnitId {
    type Error = String;

    fn try_from(raw: i32) -> std::result::Result<Self, Self::Error> {
        Self::checked(raw).ok_or_else(|| format!("reserved unit id {raw}"))
    }
}

impl From<UnitId> for i32 {
    fn from(unit: UnitId) -> Self {
        unit.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitId({})", self.0)
    }
}
