use std::sync::Arc;

use squall_fs::{CacheOnReadFs, Fs, FsError, InMemoryFs};

fn mem_fs(files: &[(&str, &str)]) -> InMemoryFs {
    let fs = InMemoryFs::new();
    for (path, data) in files {
        fs.write(path, data.as_bytes(), 0o644).unwrap();
    }
    fs
}

#[test]
fn capture_then_seal_then_replay_cycle() {
    // Init phase: the script reads two of the three files on the host.
    let base = mem_fs(&[
        ("/home/myname/script.js", "// main"),
        ("/home/myname/users.csv", "a,b,c"),
        ("/home/myname/unused.txt", "never read"),
    ]);
    let fs: Arc<dyn Fs> = Arc::new(CacheOnReadFs::new(Arc::new(base), InMemoryFs::new()));

    assert_eq!(fs.read("/home/myname/script.js").unwrap(), b"// main");
    assert_eq!(fs.read("/home/myname/users.csv").unwrap(), b"a,b,c");

    // Paths were anonymized on the way into the cache.
    let snapshot = fs.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.contains_key("/home/nobody/script.js"));
    assert!(snapshot.contains_key("/home/nobody/users.csv"));

    // Replay phase: sealing closes the namespace over what was read.
    fs.seal();
    assert_eq!(fs.read("/home/nobody/users.csv").unwrap(), b"a,b,c");

    let err = fs.read("/home/myname/unused.txt").unwrap_err();
    assert!(matches!(err, FsError::PathNeverRequestedBefore { .. }));
    assert_eq!(err.path(), "/home/nobody/unused.txt");
}

#[test]
fn sealed_misses_share_one_error_shape() {
    let fs = CacheOnReadFs::sealed(mem_fs(&[("/data/present.txt", "x")]));

    let errors = [
        fs.read("/data/absent.txt").unwrap_err(),
        fs.stat("/data/absent.txt").unwrap_err(),
        fs.is_dir("/data/absent.txt").unwrap_err(),
        fs.read_dir("/data/absent").unwrap_err(),
    ];
    for err in errors {
        assert!(
            matches!(err, FsError::PathNeverRequestedBefore { .. }),
            "got: {err}"
        );
    }
}

#[test]
fn in_memory_listing_walks_implicit_directories() {
    let fs = mem_fs(&[
        ("/srv/app/a.js", "// a"),
        ("/srv/app/lib/util.js", "// util"),
        ("/srv/data.bin", "bin"),
    ]);

    let root: Vec<_> = fs
        .read_dir("/")
        .unwrap()
        .into_iter()
        .map(|i| (i.name, i.is_dir))
        .collect();
    assert_eq!(root, vec![("srv".to_string(), true)]);

    let srv: Vec<_> = fs
        .read_dir("/srv")
        .unwrap()
        .into_iter()
        .map(|i| (i.name, i.is_dir))
        .collect();
    assert_eq!(
        srv,
        vec![("app".to_string(), true), ("data.bin".to_string(), false)]
    );

    assert!(fs.is_dir("/srv/app/lib").unwrap());
    let info = fs.stat("/srv/app/lib/util.js").unwrap();
    assert_eq!(info.size, 7);
    assert!(!info.is_dir);

    let err = fs.read("/srv/nope").unwrap_err();
    assert!(matches!(err, FsError::NotFound { .. }));
    assert_eq!(err.path(), "/srv/nope");
}

#[test]
fn observed_paths_match_any_native_spelling() {
    let base = mem_fs(&[(r"C:\Users\myname\conf.json", "{}")]);
    let fs = CacheOnReadFs::new(Arc::new(base), InMemoryFs::new());

    assert_eq!(fs.read(r"C:\Users\myname\conf.json").unwrap(), b"{}");
    assert!(fs.observed().contains("/C/Users/nobody/conf.json"));
    assert!(fs.observed().contains(r"C:\Users\myname\conf.json"));
    assert_eq!(fs.observed().len(), 1);
}

#[test]
fn writes_land_in_the_captured_layer() {
    let fs = CacheOnReadFs::new(Arc::new(InMemoryFs::new()), InMemoryFs::new());
    fs.write("/generated/report.json", b"{}", 0o600).unwrap();

    let snapshot = fs.snapshot();
    assert_eq!(snapshot["/generated/report.json"].data, b"{}");
    assert_eq!(snapshot["/generated/report.json"].mode, 0o600);
}
