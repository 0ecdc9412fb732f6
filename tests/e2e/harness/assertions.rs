use anyhow::Result;
use keyrepo_core::{KeyRepo, UnitId};

/// Declarative assertions on repository state
pub enum Assertion {
    // Values
    Value {
        unit: UnitId,
        name: String,
        expected: Option<Vec<u8>>,
    },
    StoredEntries {
        unit: UnitId,
        count: usize,
    },

    // Units
    UnitOpen(UnitId),
    UnitClosed(UnitId),
    ExplicitlyOpen(UnitId),
    PendingClose(UnitId),
    NoPendingClose(UnitId),

    // Lifecycle bookkeeping
    ErrorCount {
        unit: UnitId,
        count: u32,
    },
    Closes {
        unit: UnitId,
        wipes: Vec<bool>,
    },

    // Custom
    Custom(Box<dyn Fn(&KeyRepo) -> Result<()> + Send + Sync>),
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value {
                unit,
                name,
                expected,
            } => write!(
                f,
                "Value {{ unit: {}, name: {:?}, expected: {:?} }}",
                unit, name, expected
            ),
            Self::StoredEntries { unit, count } => {
                write!(f, "StoredEntries {{ unit: {}, count: {} }}", unit, count)
            }
            Self::UnitOpen(unit) => write!(f, "UnitOpen({})", unit),
            Self::UnitClosed(unit) => write!(f, "UnitClosed({})", unit),
            Self::ExplicitlyOpen(unit) => write!(f, "ExplicitlyOpen({})", unit),
            Self::PendingClose(unit) => write!(f, "PendingClose({})", unit),
            Self::NoPendingClose(unit) => write!(f, "NoPendingClose({})", unit),
            Self::ErrorCount { unit, count } => {
                write!(f, "ErrorCount {{ unit: {}, count: {} }}", unit, count)
            }
            Self::Closes { unit, wipes } => {
                write!(f, "Closes {{ unit: {}, wipes: {:?} }}", unit, wipes)
            }
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}
