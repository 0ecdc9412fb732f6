use std::time::Duration;

use keyrepo_core::UnitId;

use super::assertions::Assertion;

/// All possible actions in a test scenario
#[derive(Debug)]
pub enum ScenarioStep {
    // Key traffic; keys are macro keys of main.cpp named `name`
    Put {
        unit: UnitId,
        name: String,
        value: Vec<u8>,
    },
    // Put under a key whose end offset is not known yet
    PutUnresolved {
        unit: UnitId,
        name: String,
        value: Vec<u8>,
    },
    // Intern the key with its end offset known
    ResolveEnd {
        unit: UnitId,
        name: String,
    },
    Hang {
        unit: UnitId,
        name: String,
        value: Vec<u8>,
    },
    Remove {
        unit: UnitId,
        name: String,
    },
    Read {
        unit: UnitId,
        name: String,
    },

    // Unit control
    OpenUnit(UnitId),
    ReleaseUnit {
        unit: UnitId,
        wipe: bool,
    },
    CloseUnit {
        unit: UnitId,
        wipe: bool,
    },
    ReopenUnit(UnitId),
    RemoveUnit(UnitId),

    // Failure injection
    FailNext {
        unit: UnitId,
        intentional: bool,
    },

    // Time control
    Idle {
        duration: Duration,
    },

    // Process control
    Restart,

    // Verification
    Assert {
        assertion: Assertion,
    },
}
