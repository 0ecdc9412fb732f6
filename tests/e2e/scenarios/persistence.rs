use crate::harness::{Backend, Scenario, TestWorkspace};
use keyrepo_core::{Config, Key, OffsetKind, UnitId, DB_FILE};
use tokio::runtime::Handle;

fn macro_key() -> Key {
    Key::offset(UnitId::new(10001), OffsetKind::Macro, "a.h", "FOO", 8, 31)
}

#[test]
fn test_values_survive_restart() {
    Scenario::new("values_survive_restart")
        .put(10001, "FOO", b"#define FOO 1")
        .put(10002, "BAR", b"#define BAR 2")
        .restart()
        .assert_value(10001, "FOO", b"#define FOO 1")
        .assert_value(10002, "BAR", b"#define BAR 2")
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_value_stored_before_end_offset_is_known() {
    for backend in [Backend::Redb, Backend::Memory] {
        Scenario::new("value_stored_before_end_offset_is_known")
            .backend(backend)
            .put_unresolved(10001, "FOO", b"#define FOO")
            .resolve_end(10001, "FOO")
            .assert_value(10001, "FOO", b"#define FOO")
            .assert_unresolved_value(10001, "FOO", b"#define FOO")
            .put(10001, "FOO", b"#define FOO 2")
            .assert_unresolved_value(10001, "FOO", b"#define FOO 2")
            .run()
            .unwrap();
    }
}

#[test]
fn test_unresolved_entry_survives_restart() {
    Scenario::new("unresolved_entry_survives_restart")
        .put_unresolved(10001, "FOO", b"1")
        .resolve_end(10001, "FOO")
        .assert_stored_entries(10001, 1)
        .restart()
        .assert_value(10001, "FOO", b"1")
        .assert_unresolved_value(10001, "FOO", b"1")
        .run()
        .unwrap();
}

#[test]
fn test_wipe_survives_restart() {
    Scenario::new("wipe_survives_restart")
        .put(10001, "FOO", b"1")
        .put(10002, "BAR", b"2")
        .close_unit(10001, true)
        .restart()
        .assert_absent(10001, "FOO")
        .assert_value(10002, "BAR", b"2")
        .run()
        .unwrap();
}

#[test]
fn test_hung_values_do_not_survive_restart() {
    Scenario::new("hung_values_do_not_survive_restart")
        .hang(10001, "TMP", b"transient")
        .assert_value(10001, "TMP", b"transient")
        .restart()
        .assert_absent(10001, "TMP")
        .run()
        .unwrap();
}

#[tokio::test]
async fn test_version_change_rebuilds() {
    let workspace = TestWorkspace::empty().unwrap();
    {
        let repo = workspace.init_repo(Handle::current()).unwrap();
        repo.put(&macro_key(), b"old").unwrap();
        repo.dispose();
    }

    let mut config = Config::load(workspace.path()).unwrap();
    config.storage.experimental = true;
    config.save(workspace.path()).unwrap();

    let repo = workspace.open_repo(Handle::current()).unwrap();
    assert_eq!(repo.get(&macro_key()), None);
    let storage = repo.storage().unwrap();
    assert_eq!(
        storage.stored_version().unwrap(),
        Some(config.persistence_version())
    );
}

#[tokio::test]
async fn test_second_handle_is_locked_out() {
    let workspace = TestWorkspace::empty().unwrap();
    let _repo = workspace.init_repo(Handle::current()).unwrap();
    let err = match workspace.open_repo(Handle::current()) {
        Ok(_) => panic!("second open should fail"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("locked"), "{err}");
}

#[tokio::test]
async fn test_non_persistent_config_keeps_nothing() {
    let mut config = Config::default();
    config.storage.persistent = false;
    let workspace = TestWorkspace::with_config(&config).unwrap();
    {
        let repo = workspace.open_repo(Handle::current()).unwrap();
        repo.put(&macro_key(), b"value").unwrap();
        assert_eq!(repo.get(&macro_key()).as_deref(), Some(&b"value"[..]));
    }
    assert!(!workspace.file_exists(DB_FILE));
    let repo = workspace.open_repo(Handle::current()).unwrap();
    assert_eq!(repo.get(&macro_key()), None);
}
