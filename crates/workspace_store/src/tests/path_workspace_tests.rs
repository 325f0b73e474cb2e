use super::*;
use shared::protocol::Status;
use std::sync::Barrier;
use std::thread;
use tempfile::TempDir;

fn workspace() -> (TempDir, PathWorkspace) {
    let root = tempfile::tempdir().expect("tempdir");
    let manager = populate(&root);
    (root, manager)
}

fn populate(root: &TempDir) -> PathWorkspace {
    fs::write(root.path().join("a.txt"), "alpha\n").expect("a.txt");
    fs::create_dir_all(root.path().join("b")).expect("b");
    fs::write(root.path().join("b").join("c.txt"), "gamma\n").expect("c.txt");
    PathWorkspace::new(&WorkspaceConfig::new(root.path()))
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn each_indexes_files_by_name() {
    let (root, manager) = workspace();
    let result = manager.each();
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.opcode, "path_each");

    let payload = result.payload.expect("payload");
    assert_eq!(payload.len(), 2);
    assert_eq!(
        payload.get("a.txt"),
        Some(path_string(&root.path().join("a.txt")).as_str())
    );
    assert_eq!(
        payload.get("c.txt"),
        Some(path_string(&root.path().join("b").join("c.txt")).as_str())
    );
    assert!(!payload.contains_key("b"));
}

#[test]
fn each_includes_directories_when_configured() {
    let (root, _) = workspace();
    let mut config = WorkspaceConfig::new(root.path());
    config.include_directories = true;
    let manager = PathWorkspace::new(&config);

    let payload = manager.each().payload.expect("payload");
    assert_eq!(
        payload.get("b"),
        Some(path_string(&root.path().join("b")).as_str())
    );
}

#[test]
fn each_on_missing_root_is_an_error_without_payload() {
    let root = tempfile::tempdir().expect("tempdir");
    let manager = PathWorkspace::new(&WorkspaceConfig::new(root.path().join("missing")));
    let result = manager.each();
    assert_eq!(result.status, Status::Error);
    assert!(result.payload.is_none());
}

#[test]
fn search_matches_against_the_whole_path() {
    let (_root, manager) = workspace();
    let sep = regex::escape(std::path::MAIN_SEPARATOR_STR);
    let result = manager.search(&format!(".*{sep}b{sep}.*"), "");
    let payload = result.payload.expect("payload");
    assert_eq!(payload.keys().collect::<Vec<_>>(), vec!["c.txt"]);

    // Anchored: a bare fragment does not match a longer path.
    let payload = manager.search("c\\.txt", "").payload.expect("payload");
    assert!(payload.is_empty());
}

#[test]
fn search_for_paths_containing_b() {
    // The temp root itself must not contain a `b` or every entry matches.
    let Some(root) = (0..64)
        .map(|_| tempfile::Builder::new().prefix("ws").tempdir().expect("tempdir"))
        .find(|dir| !path_string(dir.path()).contains('b'))
    else {
        return;
    };
    let manager = populate(&root);

    let result = manager.search("^.*b.*$", "");
    assert_eq!(result.status, Status::Success);
    let payload = result.payload.expect("payload");
    assert_eq!(payload.len(), 1);
    assert_eq!(
        payload.get("c.txt"),
        Some(path_string(&root.path().join("b").join("c.txt")).as_str())
    );
}

#[test]
fn search_with_base_only_walks_that_directory() {
    let (root, manager) = workspace();
    let base = path_string(&root.path().join("b"));
    let payload = manager.search(".*", &base).payload.expect("payload");
    assert_eq!(payload.keys().collect::<Vec<_>>(), vec!["c.txt"]);
}

#[test]
fn search_with_invalid_pattern_fails() {
    let (_root, manager) = workspace();
    let result = manager.search("(unclosed", "");
    assert_eq!(result.status, Status::Error);
    assert_eq!(result.opcode, "path_search");
}

#[test]
fn create_makes_files_and_directory_chains() {
    let (root, manager) = workspace();
    let file = root.path().join("notes.md");
    let result = manager.create(&path_string(&file));
    assert_eq!(result.status, Status::Success);
    assert!(file.is_file());
    assert_eq!(
        result.payload.expect("payload").get("notes.md"),
        Some(path_string(&file).as_str())
    );

    let dir = root.path().join("deep").join("nested");
    let result = manager.create(&path_string(&dir));
    assert_eq!(result.status, Status::Success);
    assert!(dir.is_dir());
    let payload = result.payload.expect("payload");
    assert!(payload.contains_key("nested"));
    assert!(payload.contains_key("notes.md"));
}

#[test]
fn create_twice_fails_with_no_payload() {
    let (root, manager) = workspace();
    let target = path_string(&root.path().join("fresh.txt"));
    assert!(manager.create(&target).is_success());

    let second = manager.create(&target);
    assert_eq!(second.status, Status::Error);
    assert!(second.payload.is_none());
}

#[test]
fn file_create_failure_returns_null_payload() {
    let (root, manager) = workspace();
    let orphan = root.path().join("no_such_dir").join("x.txt");
    let result = manager.create(&path_string(&orphan));
    assert_eq!(result.status, Status::Error);
    assert!(result.payload.is_none());
}

#[cfg(unix)]
#[test]
fn directory_create_failure_returns_previous_index() {
    let (root, manager) = workspace();
    manager.each();
    // A regular file in the middle of the chain makes create_dir_all fail.
    let blocked = root.path().join("a.txt").join("child");
    let result = manager.create(&path_string(&blocked));
    assert_eq!(result.status, Status::Error);
    let payload = result.payload.expect("stale index");
    assert!(payload.contains_key("a.txt"));
    assert!(!payload.contains_key("child"));
}

#[test]
fn delete_renames_to_backup_and_guards_existing_backup() {
    let (root, manager) = workspace();
    manager.each();
    let target = root.path().join("a.txt");
    let backup = root.path().join("a.txt.bk");

    let result = manager.delete(&path_string(&target));
    assert_eq!(result.status, Status::Success);
    assert!(!target.exists());
    assert_eq!(fs::read_to_string(&backup).expect("backup"), "alpha\n");
    assert!(!result.payload.expect("payload").contains_key("a.txt"));

    fs::write(&target, "recreated\n").expect("recreate");
    let again = manager.delete(&path_string(&target));
    assert_eq!(again.status, Status::Error);
    assert!(target.exists());
    assert_eq!(fs::read_to_string(&backup).expect("backup"), "alpha\n");
}

#[test]
fn concurrent_deletes_of_one_path_have_a_single_winner() {
    let (root, manager) = workspace();
    let target = path_string(&root.path().join("a.txt"));
    let barrier = Barrier::new(8);

    let winners = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    manager.delete(&target).is_success()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("delete thread"))
            .filter(|won| *won)
            .count()
    });

    assert_eq!(winners, 1);
    assert!(!root.path().join("a.txt").exists());
    assert_eq!(
        fs::read_to_string(root.path().join("a.txt.bk")).expect("backup"),
        "alpha\n"
    );
    assert!(!root.path().join("a.txt.bk.bk").exists());
}

#[test]
fn each_alongside_create_sees_whole_snapshots() {
    let (root, manager) = workspace();
    let created: Vec<String> = (0..40).map(|i| format!("f{i:02}.txt")).collect();

    let snapshots = thread::scope(|scope| {
        scope.spawn(|| {
            for name in &created {
                let result = manager.create(&path_string(&root.path().join(name)));
                assert!(result.is_success(), "create {name}");
            }
        });
        let lister = scope.spawn(|| {
            (0..40)
                .map(|_| manager.each().payload.expect("each payload"))
                .collect::<Vec<_>>()
        });
        lister.join().expect("each thread")
    });

    for payload in snapshots {
        assert!(payload.contains_key("a.txt"));
        assert!(payload.contains_key("c.txt"));
        // Creates run in order, so any complete walk sees a prefix of them.
        let seen = created
            .iter()
            .take_while(|name| payload.contains_key(name))
            .count();
        assert_eq!(payload.len(), 2 + seen);
        for name in &created[..seen] {
            assert_eq!(
                payload.get(name),
                Some(path_string(&root.path().join(name)).as_str())
            );
        }
    }
    assert_eq!(manager.each().payload.expect("payload").len(), 42);
}

#[test]
fn delete_missing_path_fails() {
    let (root, manager) = workspace();
    let result = manager.delete(&path_string(&root.path().join("ghost.txt")));
    assert_eq!(result.status, Status::Error);
    assert_eq!(result.opcode, "path_delete");
}

#[test]
fn end_clears_the_index() {
    let (_root, manager) = workspace();
    manager.each();
    assert!(!manager.index().is_empty());
    let result = manager.end();
    assert!(result.is_success());
    assert!(result.payload.is_none());
    assert!(manager.index().is_empty());
}

#[test]
fn confined_workspace_rejects_paths_outside_root() {
    let (root, _) = workspace();
    let mut config = WorkspaceConfig::new(root.path());
    config.confine_paths = true;
    let manager = PathWorkspace::new(&config);

    let outside = tempfile::tempdir().expect("outside");
    let target = outside.path().join("escape.txt");
    assert_eq!(manager.create(&path_string(&target)).status, Status::Error);
    assert!(!target.exists());

    assert!(manager.create("inside.txt").is_success());
    assert!(root.path().join("inside.txt").is_file());
}

#[test]
fn extension_heuristic() {
    assert!(has_file_extension("a.txt"));
    assert!(has_file_extension("archive.tar.gz"));
    assert!(has_file_extension(".gitignore"));
    assert!(has_file_extension("notes.d"));
    assert!(!has_file_extension("src"));
    assert!(!has_file_extension("trailing."));
}
