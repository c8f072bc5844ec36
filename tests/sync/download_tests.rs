// Tests for the restore (download) direction

use tempfile::TempDir;

use dircache::sync::{SessionStatus, SyncPhase};

use crate::common::*;

#[tokio::test]
async fn test_round_trip_reproduces_tree() {
    let source = TempDir::new().unwrap();
    write_tree(
        source.path(),
        &[
            ("top.txt", "top"),
            ("a/b/c/deep.dat", "deep contents"),
            ("a/empty", ""),
            ("with space/name.txt", "spaced"),
        ],
    );
    let store = FlakyStore::with_bucket();
    session(&store, false).upload(source.path()).await.unwrap();

    let target = TempDir::new().unwrap();
    let root = target.path().join("restored");
    let report = session(&store, false).download(&root).await.unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.downloaded, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(read_tree(&root), read_tree(source.path()));
}

#[cfg(unix)]
#[tokio::test]
async fn test_backslash_names_are_not_cached() {
    let source = TempDir::new().unwrap();
    write_tree(source.path(), &[("a\\b.txt", "odd"), ("ok.txt", "fine")]);
    let store = FlakyStore::with_bucket();

    let up = session(&store, false).upload(source.path()).await.unwrap();
    assert_eq!(up.uploaded, 1);
    assert_eq!(up.failed, 1);
    assert_eq!(store.inner.keys(BUCKET), vec!["linux/deps/ok.txt"]);

    let target = TempDir::new().unwrap();
    let down = session(&store, false).download(target.path()).await.unwrap();
    assert_eq!(down.downloaded, 1);
    assert_eq!(down.failed, 0);
    assert_eq!(read_tree(target.path()), read_tree(source.path()));
}

#[tokio::test]
async fn test_download_phases() {
    let store = FlakyStore::with_bucket();
    store.inner.insert(BUCKET, "linux/deps/file", "remote");
    let target = TempDir::new().unwrap();

    let report = session(&store, false).download(target.path()).await.unwrap();

    assert_eq!(
        report.phases,
        vec![
            SyncPhase::Enumerating,
            SyncPhase::Deciding,
            SyncPhase::Transferring,
            SyncPhase::Reporting,
        ]
    );
}

#[tokio::test]
async fn test_download_overwrites_without_comparing() {
    let store = FlakyStore::with_bucket();
    store.inner.insert(BUCKET, "linux/deps/file", "remote");

    let target = TempDir::new().unwrap();
    write_tree(target.path(), &[("file", "remote")]);

    let report = session(&store, false).download(target.path()).await.unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(store.count("stat"), 0);
    assert_eq!(store.count_for("get", "linux/deps/file"), 1);
}

#[tokio::test]
async fn test_download_only_reads_own_prefix() {
    let store = FlakyStore::with_bucket();
    store.inner.insert(BUCKET, "linux/deps/mine", "1");
    store.inner.insert(BUCKET, "linux/deps-other/theirs", "2");

    let target = TempDir::new().unwrap();
    let report = session(&store, false).download(target.path()).await.unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(read_tree(target.path()), vec![("mine".to_string(), b"1".to_vec())]);
}

#[tokio::test]
async fn test_failed_get_does_not_affect_other_files() {
    let store = FlakyStore::with_bucket();
    store.inner.insert(BUCKET, "linux/deps/good", "ok");
    store.inner.insert(BUCKET, "linux/deps/flaky", "eventually");
    store.inner.insert(BUCKET, "linux/deps/bad", "never");
    store.fail_times("get", "linux/deps/flaky", 2);
    store.fail_times("get", "linux/deps/bad", 3);

    let target = TempDir::new().unwrap();
    let report = session(&store, false).download(target.path()).await.unwrap();

    assert_eq!(report.downloaded, 2);
    assert_eq!(report.failed, 1);
    assert!(target.path().join("flaky").exists());
    assert!(!target.path().join("bad").exists());
}

#[tokio::test]
async fn test_keys_escaping_root_are_rejected() {
    let store = FlakyStore::with_bucket();
    store.inner.insert(BUCKET, "linux/deps/../escape", "nope");
    store.inner.insert(BUCKET, "linux/deps/ok", "fine");
    store.inner.insert(BUCKET, "linux/deps/", "");

    let outer = TempDir::new().unwrap();
    let root = outer.path().join("root");
    let report = session(&store, false).download(&root).await.unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(store.count("get"), 1);
    assert!(!outer.path().join("escape").exists());
}

#[tokio::test]
async fn test_missing_bucket_is_a_no_op() {
    let store = FlakyStore::without_bucket();
    let target = TempDir::new().unwrap();
    let root = target.path().join("fresh");

    let report = session(&store, false).download(&root).await.unwrap();

    assert_eq!(report.status, SessionStatus::BucketMissing);
    assert_eq!(report.processed(), 0);
    assert_eq!(store.count("list"), 0);
    assert_eq!(store.count("get"), 0);
    // The root is created before the bucket check.
    assert!(root.is_dir());
}

#[tokio::test]
async fn test_empty_prefix_downloads_nothing() {
    let store = FlakyStore::with_bucket();
    let target = TempDir::new().unwrap();

    let report = session(&store, false).download(target.path()).await.unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.downloaded, 0);
}

#[tokio::test]
async fn test_listing_failure_is_an_error() {
    let store = FlakyStore::with_bucket();
    store.fail_times("list", PREFIX, 1);
    let target = TempDir::new().unwrap();

    assert!(session(&store, false).download(target.path()).await.is_err());
}
