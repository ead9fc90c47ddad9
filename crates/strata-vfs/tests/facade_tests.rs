//! End-to-end facade behavior over the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use strata_vfs::{FileSystem, MemoryBackend, ScanFlags, INVALID_EXEC_ID};

fn memory_fs() -> (FileSystem, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let fs = FileSystem::new(backend.clone());
    (fs, backend)
}

#[tokio::test]
async fn test_identity_then_write_round_trip() {
    let (fs, _) = memory_fs();

    assert!(fs.load_identity("acme", "editor").await);
    assert!(!fs.write_directory().is_empty());

    assert!(fs.create_dir("settings/").await);
    assert!(fs.dir_exists("settings").await);

    assert!(fs.write_file("settings/video.ini", b"vsync=1\n").await);
    assert!(fs.file_exists("settings/video.ini").await);
    assert!(fs.last_modified("settings/video.ini").await > 0);
    assert_eq!(
        fs.read_file("settings/video.ini").await.unwrap(),
        b"vsync=1\n"
    );
}

#[tokio::test]
async fn test_later_prepend_mount_shadows_earlier() {
    let (fs, backend) = memory_fs();
    backend.preload("/packs/A.zip", "data/hello.txt", b"A");
    backend.preload("/packs/B.zip", "data/hello.txt", b"B");

    // priority=false prepends, so the later mount wins.
    assert!(fs.mount_archive("/packs/A.zip", "", false).await);
    assert!(fs.mount_archive("/packs/B.zip", "", false).await);
    assert_eq!(fs.read_file("data/hello.txt").await.unwrap(), b"B");

    // Unmounting the shadowing archive exposes the older content again.
    assert!(fs.unmount_archive("/packs/B.zip").await);
    assert_eq!(fs.read_file("data/hello.txt").await.unwrap(), b"A");
}

#[tokio::test]
async fn test_scan_dir_extension_filter() {
    let (fs, backend) = memory_fs();
    backend.preload("/packs/art.zip", "art/a.png", b"a");
    backend.preload("/packs/art.zip", "art/b.PNG", b"b");
    backend.preload("/packs/art.zip", "art/c.jpg", b"c");
    backend.preload("/packs/art.zip", "art/.hidden.png", b"h");
    backend.preload("/packs/art.zip", "art/sub/d.png", b"d");
    assert!(fs.mount_archive("/packs/art.zip", "", false).await);

    // Extension match is case-sensitive and ignores hidden entries.
    let found = fs.scan_dir("art", "*.png", ScanFlags::FILES, true).await;
    assert_eq!(found, vec!["a.png".to_string(), "sub/d.png".to_string()]);

    let with_hidden = fs
        .scan_dir("art", "*.png", ScanFlags::FILES | ScanFlags::HIDDEN, true)
        .await;
    assert_eq!(
        with_hidden,
        vec![
            ".hidden.png".to_string(),
            "a.png".to_string(),
            "sub/d.png".to_string()
        ]
    );

    let shallow = fs.scan_dir("art", "*.png", ScanFlags::FILES, false).await;
    assert_eq!(shallow, vec!["a.png".to_string()]);

    // A filter containing '*' past its dot, or without a dot, matches all.
    let everything = fs.scan_dir("art", "*.*", ScanFlags::FILES, false).await;
    assert_eq!(everything.len(), 3);

    let dirs = fs.scan_dir("art", "", ScanFlags::DIRS, false).await;
    assert_eq!(dirs, vec!["sub".to_string()]);
}

#[tokio::test]
async fn test_whitelist_refuses_paths_outside_it() {
    let (fs, _) = memory_fs();
    assert!(fs.load_identity("acme", "editor").await);
    fs.register_path("/safe/");

    assert!(fs.check_access("/safe/anything.txt"));
    assert!(!fs.check_access("/other/file.txt"));
    // Parent traversal is always refused once the whitelist is active.
    assert!(!fs.check_access("/safe/../etc"));

    assert!(fs.create_dir("/safe/sub").await);
    assert!(!fs.create_dir("/other/dir").await);
    assert!(!fs.create_dir("/safe/../etc").await);
    assert!(!fs.write_file("/other/f.txt", b"x").await);
}

#[tokio::test]
async fn test_async_exec_completion_on_frame_tick() {
    let (fs, _) = memory_fs();

    let id = fs.system_command_async("true");
    assert_ne!(id, INVALID_EXEC_ID);

    let mut finished = Vec::new();
    for _ in 0..500 {
        finished = fs.begin_frame();
        if !finished.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].request_id, id);
    assert_eq!(finished[0].exit_code, 0);
    // The request is gone after its completion was reported.
    assert!(fs.begin_frame().is_empty());
}

#[tokio::test]
async fn test_async_exec_refused_under_whitelist() {
    let (fs, _) = memory_fs();
    fs.register_path("/safe/");

    assert_eq!(fs.system_command_async("true"), INVALID_EXEC_ID);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fs.begin_frame().is_empty());
}

#[tokio::test]
async fn test_exec_event_subscription() {
    let (fs, _) = memory_fs();
    let mut events = fs.subscribe_exec_events();

    let id = fs.system_command_async("true");
    assert_ne!(id, INVALID_EXEC_ID);

    for _ in 0..500 {
        if !fs.begin_frame().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let event = events.try_recv().unwrap();
    assert_eq!(event.request_id, id);
    assert_eq!(event.exit_code, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_temporary_dir_honors_tmpdir() {
    let (fs, _) = memory_fs();
    let original = std::env::var("TMPDIR").ok();

    // Single test touches TMPDIR, so no interleaving within this binary.
    unsafe { std::env::set_var("TMPDIR", "/var/tmp") };
    assert_eq!(fs.temporary_dir(), "/var/tmp/");

    unsafe { std::env::remove_var("TMPDIR") };
    assert_eq!(fs.temporary_dir(), "/tmp/");

    if let Some(value) = original {
        unsafe { std::env::set_var("TMPDIR", value) };
    }
}
