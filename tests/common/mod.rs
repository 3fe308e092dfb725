// tests/common/mod.rs

//! Shared fixtures for integration tests
//!
//! Builds real object repositories served over `file://` so tests can
//! exercise pull, deploy and prefetch against the same wire format a
//! production remote would present.

use capsule::store::wire::DirTree;
use capsule::store::{ObjectStore, StoreMode};
use capsule::Installation;
use std::path::Path;
use tempfile::TempDir;

/// Default metadata contents used by fixture commits
pub const METADATA: &str = "[Application]\nname=org.x.App\nruntime=org.x.Platform/x86_64/1.0\n";

/// A repository on disk acting as the remote end of a pull
pub struct TestRemote {
    pub dir: TempDir,
    pub store: ObjectStore,
}

/// One file to place under a commit's `export/share/applications/`
pub struct ExportedFile<'a> {
    pub name: &'a str,
    pub contents: &'a str,
}

impl TestRemote {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::create(&dir.path().join("repo"), StoreMode::Bare).unwrap();
        Self { dir, store }
    }

    /// The `file://` base URL remotes are configured with
    pub fn url(&self) -> String {
        format!("file://{}", self.dir.path().join("repo").display())
    }

    /// Commit an application tree for `ref_name` and point the remote ref
    /// at it. The tree holds `metadata`, a `files/` subtree with one
    /// binary, and optionally `export/share/applications/` entries.
    pub fn commit_app(
        &self,
        ref_name: &str,
        metadata: &str,
        exported: &[ExportedFile<'_>],
        timestamp: u64,
    ) -> String {
        let store = &self.store;

        let metadata_obj = store
            .write_file_object(metadata.as_bytes(), 0o100644, None)
            .unwrap();

        let binary = store
            .write_file_object(b"#!/bin/sh\nexec real-app \"$@\"\n", 0o100755, None)
            .unwrap();
        let files_tree = store
            .write_dirtree(&DirTree {
                files: vec![("app-binary".to_string(), binary)],
                dirs: Vec::new(),
            })
            .unwrap();

        let empty_meta = "0".repeat(64);
        let mut root_dirs = Vec::new();

        if !exported.is_empty() {
            let mut entries: Vec<(String, String)> = exported
                .iter()
                .map(|file| {
                    let checksum = store
                        .write_file_object(file.contents.as_bytes(), 0o100644, None)
                        .unwrap();
                    (file.name.to_string(), checksum)
                })
                .collect();
            entries.sort();

            let applications = store
                .write_dirtree(&DirTree {
                    files: entries,
                    dirs: Vec::new(),
                })
                .unwrap();
            let share = store
                .write_dirtree(&DirTree {
                    files: Vec::new(),
                    dirs: vec![("applications".to_string(), applications, empty_meta.clone())],
                })
                .unwrap();
            let export = store
                .write_dirtree(&DirTree {
                    files: Vec::new(),
                    dirs: vec![("share".to_string(), share, empty_meta.clone())],
                })
                .unwrap();
            root_dirs.push(("export".to_string(), export, empty_meta.clone()));
        }

        root_dirs.push(("files".to_string(), files_tree, empty_meta.clone()));
        root_dirs.sort();

        let root = store
            .write_dirtree(&DirTree {
                files: vec![("metadata".to_string(), metadata_obj)],
                dirs: root_dirs,
            })
            .unwrap();
        let commit = store.write_commit(None, "fixture commit", timestamp, &root).unwrap();
        store.write_ref(None, ref_name, &commit).unwrap();
        commit
    }
}

/// A user installation wired to a `TestRemote` as remote "origin"
pub fn installation_with_remote(base: &Path, remote: &TestRemote) -> Installation {
    let installation = Installation::new(base, true);
    installation
        .ensure_repo()
        .unwrap()
        .remote_add("origin", &remote.url())
        .unwrap();
    installation
}
