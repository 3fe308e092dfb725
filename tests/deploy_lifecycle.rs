// tests/deploy_lifecycle.rs

//! End-to-end deployment lifecycle
//!
//! Drives install, redeploy, undeploy, quarantine and prune against a
//! `file://` remote built from real objects.

mod common;

use capsule::{CancelToken, Error, Installation, RefName, SilentProgress};
use common::{installation_with_remote, ExportedFile, TestRemote, METADATA};
use std::fs;
use tempfile::TempDir;

const REF: &str = "app/org.x.App/x86_64/stable";

fn desktop_entry() -> ExportedFile<'static> {
    ExportedFile {
        name: "org.x.App.desktop",
        contents: "[Desktop Entry]\nName=App\nExec=gedit %U\nTryExec=gedit\n",
    }
}

#[test]
fn test_fresh_install() {
    let remote = TestRemote::new();
    let commit = remote.commit_app(REF, METADATA, &[desktop_entry()], 100);

    let tmp = TempDir::new().unwrap();
    let installation = installation_with_remote(&tmp.path().join("inst"), &remote);
    let ref_name = RefName::parse(REF).unwrap();

    let deployed = installation
        .install("origin", &ref_name, Some(&commit), Some(&SilentProgress), &CancelToken::new())
        .unwrap();
    assert_eq!(deployed, commit);

    // Deployment layout: checkout, lock anchor, active link, origin
    let checkout = installation.deploy_base(&ref_name).join(&commit);
    assert!(checkout.join("files").join(".ref").is_file());
    assert_eq!(
        fs::metadata(checkout.join("files").join(".ref")).unwrap().len(),
        0
    );
    assert_eq!(installation.read_active(&ref_name).as_deref(), Some(commit.as_str()));
    assert_eq!(installation.get_origin(&ref_name).unwrap(), "origin");
    assert_eq!(
        installation.current_ref("org.x.App").as_deref(),
        Some(REF)
    );

    // list_deployed round-trips through get_if_deployed
    let deployed_list = installation.list_deployed(&ref_name).unwrap();
    assert_eq!(deployed_list, vec![commit.clone()]);
    for checksum in &deployed_list {
        assert!(installation.get_if_deployed(&ref_name, Some(checksum)).is_some());
    }

    // The inspector opens the active deployment
    let deploy = installation.load_deployed(&ref_name, None).unwrap();
    assert_eq!(
        deploy.metadata().get_string("Application", "name"),
        Some("org.x.App")
    );
    assert!(deploy.files().ends_with("files"));
}

#[test]
fn test_second_install_and_undeploy() {
    let remote = TestRemote::new();
    let first = remote.commit_app(REF, METADATA, &[], 100);

    let tmp = TempDir::new().unwrap();
    let installation = installation_with_remote(&tmp.path().join("inst"), &remote);
    let ref_name = RefName::parse(REF).unwrap();

    installation
        .install("origin", &ref_name, Some(&first), Some(&SilentProgress), &CancelToken::new())
        .unwrap();

    // A newer commit on the same ref
    let second = remote.commit_app(REF, METADATA, &[], 200);
    assert_ne!(first, second);
    installation
        .install("origin", &ref_name, Some(&second), Some(&SilentProgress), &CancelToken::new())
        .unwrap();

    assert_eq!(installation.read_active(&ref_name).as_deref(), Some(second.as_str()));
    let mut expected = vec![first.clone(), second.clone()];
    expected.sort();
    assert_eq!(installation.list_deployed(&ref_name).unwrap(), expected);

    // Undeploying the inactive checkout leaves active untouched
    installation.undeploy(&ref_name, &first, false).unwrap();
    assert_eq!(installation.read_active(&ref_name).as_deref(), Some(second.as_str()));
    assert_eq!(installation.list_deployed(&ref_name).unwrap(), vec![second.clone()]);

    // Not locked, so nothing lingers in quarantine
    let removed: Vec<_> = match fs::read_dir(tmp.path().join("inst").join(".removed")) {
        Ok(entries) => entries.collect(),
        Err(_) => Vec::new(),
    };
    assert!(removed.is_empty());
}

#[test]
fn test_undeploy_active_repoints() {
    let remote = TestRemote::new();
    let first = remote.commit_app(REF, METADATA, &[], 100);

    let tmp = TempDir::new().unwrap();
    let installation = installation_with_remote(&tmp.path().join("inst"), &remote);
    let ref_name = RefName::parse(REF).unwrap();

    installation
        .install("origin", &ref_name, Some(&first), Some(&SilentProgress), &CancelToken::new())
        .unwrap();
    let second = remote.commit_app(REF, METADATA, &[], 200);
    installation
        .install("origin", &ref_name, Some(&second), Some(&SilentProgress), &CancelToken::new())
        .unwrap();

    // Removing the active deployment repoints active at the survivor
    installation.undeploy(&ref_name, &second, false).unwrap();
    assert_eq!(installation.read_active(&ref_name).as_deref(), Some(first.as_str()));

    // Removing the last one clears active entirely
    installation.undeploy(&ref_name, &first, false).unwrap();
    assert_eq!(installation.read_active(&ref_name), None);
    assert!(installation.list_deployed(&ref_name).unwrap().is_empty());
}

#[test]
fn test_redeploy_same_checksum_fails() {
    let remote = TestRemote::new();
    let commit = remote.commit_app(REF, METADATA, &[], 100);

    let tmp = TempDir::new().unwrap();
    let installation = installation_with_remote(&tmp.path().join("inst"), &remote);
    let ref_name = RefName::parse(REF).unwrap();

    installation
        .install("origin", &ref_name, Some(&commit), Some(&SilentProgress), &CancelToken::new())
        .unwrap();
    let err = installation
        .deploy(&ref_name, Some(&commit), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyDeployed { .. }));
}

#[test]
fn test_deploy_without_checksum_uses_origin_tip() {
    let remote = TestRemote::new();
    let commit = remote.commit_app(REF, METADATA, &[], 100);

    let tmp = TempDir::new().unwrap();
    let installation = installation_with_remote(&tmp.path().join("inst"), &remote);
    let ref_name = RefName::parse(REF).unwrap();

    installation
        .pull("origin", REF, Some(&SilentProgress), &CancelToken::new())
        .unwrap();
    installation.set_origin(&ref_name, "origin").unwrap();

    let deployed = installation.deploy(&ref_name, None, &CancelToken::new()).unwrap();
    assert_eq!(deployed, commit);
    assert_eq!(installation.read_active(&ref_name).as_deref(), Some(commit.as_str()));
}

#[test]
fn test_load_deployed_missing_ref() {
    let tmp = TempDir::new().unwrap();
    let installation = Installation::new(&tmp.path().join("inst"), true);
    let ref_name = RefName::parse(REF).unwrap();

    let err = installation.load_deployed(&ref_name, None).unwrap_err();
    assert!(matches!(err, Error::NotDeployed(_)));
}

#[test]
fn test_prune_drops_undeployed_objects() {
    let remote = TestRemote::new();
    let commit = remote.commit_app(REF, METADATA, &[], 100);

    let tmp = TempDir::new().unwrap();
    let installation = installation_with_remote(&tmp.path().join("inst"), &remote);
    let ref_name = RefName::parse(REF).unwrap();

    installation
        .install("origin", &ref_name, Some(&commit), Some(&SilentProgress), &CancelToken::new())
        .unwrap();

    // Everything is referenced: prune removes nothing
    let stats = installation.prune(&CancelToken::new()).unwrap();
    assert_eq!(stats.objects_pruned, 0);
    assert!(stats.objects_total > 0);

    // Dropping the remote ref mirror orphans the commit chain
    fs::remove_dir_all(
        tmp.path()
            .join("inst")
            .join("repo")
            .join("refs")
            .join("remotes"),
    )
    .unwrap();
    let stats = installation.prune(&CancelToken::new()).unwrap();
    assert_eq!(stats.objects_pruned, stats.objects_total);
    assert!(stats.freed_bytes > 0);
}

#[test]
fn test_fetch_metadata_matches_deployed_metadata() {
    let remote = TestRemote::new();
    let commit = remote.commit_app(REF, METADATA, &[], 100);

    let tmp = TempDir::new().unwrap();
    let installation = installation_with_remote(&tmp.path().join("inst"), &remote);
    let ref_name = RefName::parse(REF).unwrap();

    // Prefetch without pulling anything
    let prefetched = installation
        .fetch_metadata("origin", &commit, &CancelToken::new())
        .unwrap();
    assert_eq!(prefetched, METADATA.as_bytes());

    // Byte-identical to what a full pull and checkout yields
    installation
        .install("origin", &ref_name, Some(&commit), Some(&SilentProgress), &CancelToken::new())
        .unwrap();
    let checkout = installation.deploy_base(&ref_name).join(&commit);
    let deployed_metadata = fs::read(checkout.join("metadata")).unwrap();
    assert_eq!(prefetched, deployed_metadata);
}

#[test]
fn test_undeploy_locked_deployment_is_quarantined() {
    let remote = TestRemote::new();
    let commit = remote.commit_app(REF, METADATA, &[], 100);

    let tmp = TempDir::new().unwrap();
    let installation = installation_with_remote(&tmp.path().join("inst"), &remote);
    let ref_name = RefName::parse(REF).unwrap();

    installation
        .install("origin", &ref_name, Some(&commit), Some(&SilentProgress), &CancelToken::new())
        .unwrap();
    let checkout = installation.deploy_base(&ref_name).join(&commit);

    // A child process plays the running application: shared lock on .ref
    let ref_file = checkout.join("files").join(".ref");
    let script = format!(
        r#"
import fcntl, sys, time
fd = open({:?}, "r+b")
fcntl.lockf(fd, fcntl.LOCK_SH)
print("locked", flush=True)
time.sleep(30)
"#,
        ref_file.display()
    );
    let child = std::process::Command::new("python3")
        .arg("-c")
        .arg(&script)
        .stdout(std::process::Stdio::piped())
        .spawn();
    let Ok(mut child) = child else {
        return; // no python3 on this machine, nothing to exercise
    };
    {
        use std::io::{BufRead, BufReader};
        let stdout = child.stdout.take().unwrap();
        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line).unwrap();
        assert_eq!(line.trim(), "locked");
    }

    installation.undeploy(&ref_name, &commit, false).unwrap();

    // Still locked: quarantined under .removed, not deleted
    let removed_dir = tmp.path().join("inst").join(".removed");
    let quarantined: Vec<_> = fs::read_dir(&removed_dir).unwrap().collect();
    assert_eq!(quarantined.len(), 1);
    assert!(!checkout.exists());

    // Lock still held: the cleanup sweep leaves it alone
    installation.cleanup_removed().unwrap();
    assert_eq!(fs::read_dir(&removed_dir).unwrap().count(), 1);

    // App exits; the next sweep deletes the residue
    child.kill().unwrap();
    child.wait().unwrap();
    installation.cleanup_removed().unwrap();
    assert_eq!(fs::read_dir(&removed_dir).unwrap().count(), 0);
}
