use crate::harness::Scenario;
use anyhow::ensure;
use keyrepo_core::UnitId;

#[test]
fn test_explicit_open_cancels_pending_close() {
    Scenario::new("explicit_open_cancels_pending_close")
        .implicit_close_after(1)
        .put(10001, "FOO", b"1")
        .assert_pending_close(10001)
        .open_unit(10001)
        .assert_no_pending_close(10001)
        .assert_explicitly_open(10001)
        .idle_secs(60)
        .assert_unit_open(10001)
        .assert_closes(10001, &[])
        .release_unit(10001, false)
        .assert_unit_closed(10001)
        .assert_closes(10001, &[false])
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_explicit_open_wins_over_queued_close() {
    Scenario::new("explicit_open_wins_over_queued_close")
        .implicit_close_after(1)
        .put(10001, "FOO", b"1")
        .assert_with(|repo| {
            let unit = UnitId::new(10001);
            // the close job is queued but cannot run before this closure returns
            repo.lifecycle().timeout_elapsed(unit);
            repo.open_unit(unit)?;
            Ok(())
        })
        .idle_secs(0)
        .assert_unit_open(10001)
        .assert_explicitly_open(10001)
        .assert_closes(10001, &[])
        .run()
        .unwrap();
}

#[test]
fn test_explicitly_opened_unit_has_no_timer() {
    Scenario::new("explicitly_opened_unit_has_no_timer")
        .implicit_close_after(1)
        .open_unit(10001)
        .put(10001, "FOO", b"1")
        .assert_no_pending_close(10001)
        .idle_secs(10)
        .assert_unit_open(10001)
        .run()
        .unwrap();
}

#[test]
fn test_release_with_wipe() {
    Scenario::new("release_with_wipe")
        .open_unit(10001)
        .put(10001, "FOO", b"1")
        .put(10001, "BAR", b"2")
        .assert_stored_entries(10001, 2)
        .release_unit(10001, true)
        .assert_closes(10001, &[true])
        .assert_stored_entries(10001, 0)
        .assert_absent(10001, "FOO")
        .run()
        .unwrap();
}

#[test]
fn test_reopen_keeps_explicit_status() {
    Scenario::new("reopen_keeps_explicit_status")
        .open_unit(10001)
        .put(10001, "FOO", b"1")
        .reopen_unit(10001)
        .assert_closes(10001, &[true])
        .assert_unit_open(10001)
        .assert_explicitly_open(10001)
        .assert_absent(10001, "FOO")
        .run()
        .unwrap();
}

#[test]
fn test_remove_unit_forgets_everything() {
    Scenario::new("remove_unit_forgets_everything")
        .open_unit(10001)
        .put(10001, "FOO", b"1")
        .put(10002, "BAR", b"2")
        .remove_unit(10001)
        .assert_unit_closed(10001)
        .assert_with(|repo| {
            ensure!(!repo.lifecycle().is_explicitly_open(UnitId::new(10001)));
            Ok(())
        })
        .assert_stored_entries(10001, 0)
        .assert_stored_entries(10002, 1)
        .run()
        .unwrap();
}
