use super::assertions::Assertion;
use super::runner::{unresolved_key, ScenarioRunner};
use super::steps::ScenarioStep;
use anyhow::{ensure, Result};
use keyrepo_core::{Config, KeyRepo, UnitId};
use std::time::Duration;

/// Repository backend a scenario runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Redb,
}

/// Fluent DSL for building test scenarios
pub struct Scenario {
    name: String,
    backend: Backend,
    config: Config,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Create a new scenario with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            backend: Backend::Redb,
            config: Config::default(),
            steps: Vec::new(),
        }
    }

    // ===== Initial setup =====

    /// Run against `backend` (redb by default)
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Idle interval before implicit close
    pub fn implicit_close_after(mut self, secs: u64) -> Self {
        self.config.lifecycle.implicit_close_secs = secs;
        self
    }

    /// Turn implicit close off
    pub fn without_implicit_close(mut self) -> Self {
        self.config.lifecycle.implicit_close_enabled = false;
        self
    }

    // ===== Key traffic =====

    /// Persist a value
    pub fn put(mut self, unit: i32, name: &str, value: &[u8]) -> Self {
        self.steps.push(ScenarioStep::Put {
            unit: UnitId::new(unit),
            name: name.to_string(),
            value: value.to_vec(),
        });
        self
    }

    /// Persist a value under a key whose end offset is still unset
    pub fn put_unresolved(mut self, unit: i32, name: &str, value: &[u8]) -> Self {
        self.steps.push(ScenarioStep::PutUnresolved {
            unit: UnitId::new(unit),
            name: name.to_string(),
            value: value.to_vec(),
        });
        self
    }

    /// Intern the key again with its end offset known
    pub fn resolve_end(mut self, unit: i32, name: &str) -> Self {
        self.steps.push(ScenarioStep::ResolveEnd {
            unit: UnitId::new(unit),
            name: name.to_string(),
        });
        self
    }

    /// Hang a value until the unit closes
    pub fn hang(mut self, unit: i32, name: &str, value: &[u8]) -> Self {
        self.steps.push(ScenarioStep::Hang {
            unit: UnitId::new(unit),
            name: name.to_string(),
            value: value.to_vec(),
        });
        self
    }

    /// Remove a value
    pub fn remove(mut self, unit: i32, name: &str) -> Self {
        self.steps.push(ScenarioStep::Remove {
            unit: UnitId::new(unit),
            name: name.to_string(),
        });
        self
    }

    /// Read a value, discarding the result
    pub fn read(mut self, unit: i32, name: &str) -> Self {
        self.steps.push(ScenarioStep::Read {
            unit: UnitId::new(unit),
            name: name.to_string(),
        });
        self
    }

    // ===== Unit control =====

    /// Open a unit explicitly
    pub fn open_unit(mut self, unit: i32) -> Self {
        self.steps.push(ScenarioStep::OpenUnit(UnitId::new(unit)));
        self
    }

    /// End an explicit open
    pub fn release_unit(mut self, unit: i32, wipe: bool) -> Self {
        self.steps.push(ScenarioStep::ReleaseUnit {
            unit: UnitId::new(unit),
            wipe,
        });
        self
    }

    /// Close a unit through the lifecycle manager
    pub fn close_unit(mut self, unit: i32, wipe: bool) -> Self {
        self.steps.push(ScenarioStep::CloseUnit {
            unit: UnitId::new(unit),
            wipe,
        });
        self
    }

    /// Wipe and reopen a unit
    pub fn reopen_unit(mut self, unit: i32) -> Self {
        self.steps.push(ScenarioStep::ReopenUnit(UnitId::new(unit)));
        self
    }

    /// Remove a unit entirely
    pub fn remove_unit(mut self, unit: i32) -> Self {
        self.steps.push(ScenarioStep::RemoveUnit(UnitId::new(unit)));
        self
    }

    // ===== Failures =====

    /// Next key operation on the unit fails with a storage error
    pub fn fail_next(mut self, unit: i32) -> Self {
        self.steps.push(ScenarioStep::FailNext {
            unit: UnitId::new(unit),
            intentional: false,
        });
        self
    }

    /// Next key operation on the unit fails with an intentional marker
    pub fn fail_next_intentionally(mut self, unit: i32) -> Self {
        self.steps.push(ScenarioStep::FailNext {
            unit: UnitId::new(unit),
            intentional: true,
        });
        self
    }

    // ===== Time control =====

    /// Let time pass, then wait for queued close jobs
    pub fn idle(mut self, duration: Duration) -> Self {
        self.steps.push(ScenarioStep::Idle { duration });
        self
    }

    /// Let whole seconds pass
    pub fn idle_secs(self, secs: u64) -> Self {
        self.idle(Duration::from_secs(secs))
    }

    // ===== Process control =====

    /// Dispose the repository and open it again from disk
    pub fn restart(mut self) -> Self {
        self.steps.push(ScenarioStep::Restart);
        self
    }

    // ===== Assertions =====

    /// Add a custom assertion
    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.steps.push(ScenarioStep::Assert { assertion });
        self
    }

    /// Assert a value is readable
    pub fn assert_value(self, unit: i32, name: &str, value: &[u8]) -> Self {
        self.assert(Assertion::Value {
            unit: UnitId::new(unit),
            name: name.to_string(),
            expected: Some(value.to_vec()),
        })
    }

    /// Assert a value is readable through a key with an unset end offset
    pub fn assert_unresolved_value(self, unit: i32, name: &str, value: &[u8]) -> Self {
        let unit = UnitId::new(unit);
        let name = name.to_string();
        let expected = value.to_vec();
        self.assert_with(move |repo| {
            let actual = repo.get(&unresolved_key(unit, &name));
            ensure!(
                actual.as_deref() == Some(expected.as_slice()),
                "Unresolved value of {} in unit {}: expected {:?}, got {:?}",
                name,
                unit,
                expected,
                actual
            );
            Ok(())
        })
    }

    /// Assert nothing is stored
    pub fn assert_absent(self, unit: i32, name: &str) -> Self {
        self.assert(Assertion::Value {
            unit: UnitId::new(unit),
            name: name.to_string(),
            expected: None,
        })
    }

    /// Assert persisted entry count (redb only)
    pub fn assert_stored_entries(self, unit: i32, count: usize) -> Self {
        self.assert(Assertion::StoredEntries {
            unit: UnitId::new(unit),
            count,
        })
    }

    pub fn assert_unit_open(self, unit: i32) -> Self {
        self.assert(Assertion::UnitOpen(UnitId::new(unit)))
    }

    pub fn assert_unit_closed(self, unit: i32) -> Self {
        self.assert(Assertion::UnitClosed(UnitId::new(unit)))
    }

    pub fn assert_explicitly_open(self, unit: i32) -> Self {
        self.assert(Assertion::ExplicitlyOpen(UnitId::new(unit)))
    }

    pub fn assert_pending_close(self, unit: i32) -> Self {
        self.assert(Assertion::PendingClose(UnitId::new(unit)))
    }

    pub fn assert_no_pending_close(self, unit: i32) -> Self {
        self.assert(Assertion::NoPendingClose(UnitId::new(unit)))
    }

    /// Assert the unit's tallied repository errors
    pub fn assert_error_count(self, unit: i32, count: u32) -> Self {
        self.assert(Assertion::ErrorCount {
            unit: UnitId::new(unit),
            count,
        })
    }

    /// Assert the wipe flag of every close that reached the repository
    pub fn assert_closes(self, unit: i32, wipes: &[bool]) -> Self {
        self.assert(Assertion::Closes {
            unit: UnitId::new(unit),
            wipes: wipes.to_vec(),
        })
    }

    /// Assert with a closure over the repository
    pub fn assert_with(
        self,
        check: impl Fn(&KeyRepo) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.assert(Assertion::Custom(Box::new(check)))
    }

    // ===== Execution =====

    /// Execute the scenario on a paused-clock runtime and return results
    pub fn run(self) -> ScenarioResult {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
        {
            Ok(r) => r,
            Err(e) => return self.failed(0, format!("Failed to start runtime: {}", e)),
        };

        let outcome = runtime.block_on(async {
            let mut runner = match ScenarioRunner::new(self.backend, self.config.clone()) {
                Ok(r) => r,
                Err(e) => return Err((0, format!("Failed to create runner: {:?}", e))),
            };
            let result = runner.execute(&self.steps).await;
            let failure_step = runner.current_step();
            runner.shutdown();
            result.map_err(|e| (failure_step, format!("{:?}", e)))
        });

        match outcome {
            Ok(()) => ScenarioResult {
                name: self.name,
                success: true,
                steps_executed: self.steps.len(),
                failure_step: None,
                error: None,
            },
            Err((step, error)) => self.failed(step, error),
        }
    }

    fn failed(self, step: usize, error: String) -> ScenarioResult {
        ScenarioResult {
            name: self.name,
            success: false,
            steps_executed: step,
            failure_step: Some(step),
            error: Some(error),
        }
    }
}

/// Result of running a scenario
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub steps_executed: usize,
    pub failure_step: Option<usize>,
    pub error: Option<String>,
}

impl ScenarioResult {
    /// Unwrap the result, panicking if it failed
    pub fn unwrap(self) {
        if !self.success {
            panic!(
                "Scenario '{}' failed at step {}: {}",
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }

    /// Expect the result to be successful
    pub fn expect(self, msg: &str) {
        if !self.success {
            panic!(
                "{}: Scenario '{}' failed at step {}: {}",
                msg,
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }
}
