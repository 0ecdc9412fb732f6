use crate::harness::runner::scenario_key;
use crate::harness::Scenario;
use anyhow::ensure;
use keyrepo_core::UnitId;

#[test]
fn test_error_forces_wipe_on_close() {
    Scenario::new("error_forces_wipe_on_close")
        .put(10002, "FOO", b"1")
        .fail_next(10002)
        .read(10002, "FOO")
        .assert_error_count(10002, 1)
        .close_unit(10002, false)
        .assert_closes(10002, &[true])
        .assert_error_count(10002, 0)
        .assert_stored_entries(10002, 0)
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_tally_resets_after_wipe() {
    Scenario::new("tally_resets_after_wipe")
        .put(10002, "FOO", b"1")
        .fail_next(10002)
        .read(10002, "FOO")
        .close_unit(10002, false)
        .put(10002, "FOO", b"2")
        .close_unit(10002, false)
        .assert_closes(10002, &[true, false])
        .assert_stored_entries(10002, 1)
        .run()
        .unwrap();
}

#[test]
fn test_implicit_close_after_error_wipes() {
    Scenario::new("implicit_close_after_error_wipes")
        .implicit_close_after(1)
        .put(10001, "FOO", b"1")
        .fail_next(10001)
        .read(10001, "FOO")
        .idle_secs(2)
        .assert_closes(10001, &[true])
        .assert_stored_entries(10001, 0)
        .run()
        .unwrap();
}

#[test]
fn test_intentional_errors_are_not_tallied() {
    Scenario::new("intentional_errors_are_not_tallied")
        .put(10001, "FOO", b"1")
        .fail_next_intentionally(10001)
        .read(10001, "FOO")
        .assert_error_count(10001, 0)
        .close_unit(10001, false)
        .assert_closes(10001, &[false])
        .assert_stored_entries(10001, 1)
        .run()
        .unwrap();
}

#[test]
fn test_errors_are_per_unit() {
    Scenario::new("errors_are_per_unit")
        .put(10001, "A", b"a")
        .put(10002, "B", b"b")
        .fail_next(10001)
        .read(10001, "A")
        .close_unit(10002, false)
        .close_unit(10001, false)
        .assert_closes(10001, &[true])
        .assert_closes(10002, &[false])
        .run()
        .unwrap();
}

#[test]
fn test_failed_write_reaches_caller() {
    Scenario::new("failed_write_reaches_caller")
        .put(10001, "FOO", b"1")
        .fail_next(10001)
        .assert_with(|repo| {
            let key = scenario_key(UnitId::new(10001), "FOO");
            ensure!(repo.put(&key, b"2").is_err(), "put should fail");
            Ok(())
        })
        .assert_error_count(10001, 1)
        .assert_value(10001, "FOO", b"1")
        .run()
        .unwrap();
}
