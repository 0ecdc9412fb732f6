use keyrepo_core::{
    Config, DeclarationKind, Key, KeyOutput, KeyRepo, OffsetKind, UnitId, NON_INITIALIZED,
};
use std::sync::{Arc, Barrier};
use tokio::runtime::Handle;

fn repo() -> KeyRepo {
    KeyRepo::in_memory(Config::default(), Handle::current())
}

#[tokio::test]
async fn test_function_key_round_trip_keeps_unset_end() {
    let repo = repo();
    let key = Key::from_kind_char(UnitId::new(20001), 'F', "a.cpp", "foo", 10, NON_INITIALIZED)
        .expect("'F' is the function kind");
    assert_eq!(
        key.offset_kind(),
        Some(OffsetKind::Declaration(DeclarationKind::Function))
    );

    let bytes = repo.encode_key(&key).unwrap();
    let decoded = repo.decode_key(&bytes).unwrap();
    let shared = repo.intern((*decoded).clone());

    assert_eq!(*shared, key);
    assert_eq!(shared.start_offset(), Some(10));
    assert_eq!(shared.end_offset(), Some(NON_INITIALIZED));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_interning_has_one_winner() {
    let repo = Arc::new(repo());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let repo = repo.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                (0..100)
                    .map(|i| {
                        let name = format!("MACRO_{i}");
                        repo.intern(Key::offset(
                            UnitId::new(10001),
                            OffsetKind::Macro,
                            "config.h",
                            name.as_str(),
                            i * 10,
                            i * 10 + 5,
                        ))
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<Vec<_>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for per_thread in &results[1..] {
        for (a, b) in results[0].iter().zip(per_thread) {
            assert!(Arc::ptr_eq(a, b));
        }
    }
    assert_eq!(repo.pool_stats().live(), 100);
}

#[tokio::test]
async fn test_interning_fills_in_end_offset() {
    let repo = repo();
    let unit = UnitId::new(10001);
    let partial = repo.intern(Key::offset(unit, OffsetKind::Include, "main.cpp", "vector", 0, NON_INITIALIZED));
    let complete = repo.intern(Key::offset(unit, OffsetKind::Include, "main.cpp", "vector", 0, 17));
    assert!(Arc::ptr_eq(&partial, &complete));
    assert_eq!(partial.end_offset(), Some(17));
}

#[tokio::test]
async fn test_decoded_keys_share_interned_names() {
    let repo = repo();
    let unit = UnitId::new(10001);
    let keys = [
        Key::offset(unit, OffsetKind::Macro, "util.h", "MIN", 0, 20),
        Key::offset(unit, OffsetKind::Macro, "util.h", "MAX", 21, 40),
    ];
    let mut out = KeyOutput::new();
    repo.registry().write_keys(keys.iter(), &mut out).unwrap();

    let mut input = keyrepo_core::KeyInput::new(out.as_bytes());
    let decoded = repo.registry().read_keys(&mut input).unwrap();
    assert_eq!(decoded.len(), 2);
    let files: Vec<_> = decoded.iter().map(|k| k.file_path().unwrap().as_ptr()).collect();
    assert_eq!(files[0], files[1]);
}

#[tokio::test]
async fn test_dropped_keys_leave_the_pool() {
    let repo = repo();
    let unit = UnitId::new(10001);
    let held = repo.intern(Key::namespace(unit, "std"));
    {
        let _temporary = repo.intern(Key::namespace(unit, "boost"));
        assert_eq!(repo.pool_stats().live(), 2);
    }
    assert_eq!(repo.pool_stats().live(), 1);
    assert!(Arc::ptr_eq(&held, &repo.intern(Key::namespace(unit, "std"))));
}
