// src/installation.rs

//! Deployment engine
//!
//! `Installation` owns one installation base directory (system-wide or
//! per-user) and orchestrates the deployment lifecycle: pulling refs into
//! the local object store, checking commits out into checksum-named
//! deployment directories, rewriting and publishing exports, flipping the
//! `active` and `current` symlinks, and removing deployments without
//! pulling them out from under running applications.

use crate::cancel::CancelToken;
use crate::deploy::Deploy;
use crate::error::{Error, Result};
use crate::exports;
use crate::fetch::Fetcher;
use crate::keyfile::KeyFile;
use crate::layout;
use crate::lock;
use crate::overrides::{self, Scope};
use crate::prefetch;
use crate::progress::{ConsoleProgress, PullProgress};
use crate::reference::{is_valid_checksum, RefKind, RefName};
use crate::store::{self, CheckoutMode, ObjectStore, PruneStats, StoreMode};
use crate::trigger;
use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One installation root and its lazily-opened object store
pub struct Installation {
    basedir: PathBuf,
    user: bool,
    repo: OnceCell<ObjectStore>,
    fetcher: Fetcher,
}

impl Installation {
    /// An installation rooted at an explicit path
    pub fn new(path: &Path, user: bool) -> Self {
        Self {
            basedir: path.to_path_buf(),
            user,
            repo: OnceCell::new(),
            fetcher: Fetcher::new(),
        }
    }

    /// The system-wide installation
    pub fn system() -> Self {
        Self::new(&layout::system_base_dir(), false)
    }

    /// The calling user's installation
    pub fn user() -> Self {
        Self::new(&layout::user_base_dir(), true)
    }

    /// System or user installation by flag
    pub fn get(user: bool) -> Self {
        if user {
            Self::user()
        } else {
            Self::system()
        }
    }

    pub fn is_user(&self) -> bool {
        self.user
    }

    pub fn path(&self) -> &Path {
        &self.basedir
    }

    // --- repository ---

    /// Open the object store, creating base directory and repository on
    /// first use. User installations get a bare-user store, system
    /// installations a bare one. A half-created repository is removed
    /// before the error is returned.
    pub fn ensure_repo(&self) -> Result<&ObjectStore> {
        if let Some(repo) = self.repo.get() {
            return Ok(repo);
        }

        fs::create_dir_all(&self.basedir)?;
        let repo_path = layout::repo_dir(&self.basedir);

        let repo = if repo_path.join("config").exists() {
            ObjectStore::open(&repo_path)?
        } else {
            let mode = if self.user {
                StoreMode::BareUser
            } else {
                StoreMode::Bare
            };
            match ObjectStore::create(&repo_path, mode) {
                Ok(repo) => repo,
                Err(e) => {
                    let _ = fs::remove_dir_all(&repo_path);
                    return Err(e);
                }
            }
        };

        let _ = self.repo.set(repo);
        Ok(self.repo.get().expect("repository just initialized"))
    }

    // --- paths and links ---

    /// `{base}/{kind}/{name}/{arch}/{branch}` for a ref
    pub fn deploy_base(&self, ref_name: &RefName) -> PathBuf {
        layout::deploy_base(&self.basedir, ref_name)
    }

    /// The deployment directory for a ref, via `active` when no checksum
    /// is given. `None` when nothing is deployed there.
    pub fn get_if_deployed(&self, ref_name: &RefName, checksum: Option<&str>) -> Option<PathBuf> {
        let dir = self
            .deploy_base(ref_name)
            .join(checksum.unwrap_or("active"));
        if dir.is_dir() {
            Some(dir)
        } else {
            None
        }
    }

    /// The checksum `active` points at, if any
    pub fn read_active(&self, ref_name: &RefName) -> Option<String> {
        let link = self.deploy_base(ref_name).join("active");
        fs::read_link(link)
            .ok()
            .map(|target| target.to_string_lossy().to_string())
    }

    /// Atomically repoint `active` at a checksum, or clear it
    pub fn set_active(&self, ref_name: &RefName, checksum: Option<&str>) -> Result<()> {
        let deploy_base = self.deploy_base(ref_name);
        let active = deploy_base.join("active");

        match checksum {
            Some(checksum) => {
                let tmp = deploy_base.join(format!(".active-{:08x}", rand::random::<u32>()));
                std::os::unix::fs::symlink(checksum, &tmp)?;
                fs::rename(&tmp, &active)?;
            }
            None => match fs::remove_file(&active) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    /// The full ref an app's `current` link selects, if present
    pub fn current_ref(&self, name: &str) -> Option<String> {
        let link = layout::current_link(&self.basedir, name);
        let target = fs::read_link(link).ok()?;
        Some(format!("app/{name}/{}", target.to_string_lossy()))
    }

    /// Point `current` of the ref's app at its (arch, branch)
    pub fn make_current_ref(&self, ref_name: &RefName) -> Result<()> {
        assert!(ref_name.is_app(), "current links exist only for apps");

        let link = layout::current_link(&self.basedir, &ref_name.name);
        match fs::remove_file(&link) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if !ref_name.branch.is_empty() {
            let target = format!("{}/{}", ref_name.arch, ref_name.branch);
            std::os::unix::fs::symlink(target, &link)?;
        }
        Ok(())
    }

    /// Drop an app's `current` link (absent is fine)
    pub fn drop_current_ref(&self, name: &str) -> Result<()> {
        let link = layout::current_link(&self.basedir, name);
        match fs::remove_file(&link) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The remote a ref was installed from
    pub fn get_origin(&self, ref_name: &RefName) -> Result<String> {
        let deploy_base = self.deploy_base(ref_name);
        if !deploy_base.exists() {
            return Err(Error::NotDeployed(ref_name.to_string()));
        }
        let origin = fs::read_to_string(deploy_base.join("origin"))?;
        Ok(origin.trim().to_string())
    }

    /// Record the remote a ref is installed from
    pub fn set_origin(&self, ref_name: &RefName, remote: &str) -> Result<()> {
        let deploy_base = self.deploy_base(ref_name);
        fs::create_dir_all(&deploy_base)?;
        fs::write(deploy_base.join("origin"), remote)?;
        Ok(())
    }

    // --- enumeration ---

    /// Deployed checksums of a ref, sorted. A missing deploy base is an
    /// empty list, not an error.
    pub fn list_deployed(&self, ref_name: &RefName) -> Result<Vec<String>> {
        let deploy_base = self.deploy_base(ref_name);
        let entries = match fs::read_dir(&deploy_base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut checksums = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir() && !name.starts_with('.') && is_valid_checksum(&name) {
                checksums.push(name);
            }
        }
        checksums.sort();
        Ok(checksums)
    }

    /// All refs of one kind and name, sorted
    pub fn list_refs_for_name(&self, kind: RefKind, name: &str) -> Result<Vec<String>> {
        let dir = self.basedir.join(kind.as_str()).join(name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut refs = Vec::new();
        for arch_entry in entries {
            let arch_entry = arch_entry?;
            let arch = arch_entry.file_name().to_string_lossy().to_string();
            // "data" is a legacy directory that was never an arch
            if !arch_entry.file_type()?.is_dir() || arch == "data" {
                continue;
            }
            for branch_entry in fs::read_dir(arch_entry.path())? {
                let branch_entry = branch_entry?;
                if branch_entry.file_type()?.is_dir() {
                    let branch = branch_entry.file_name().to_string_lossy().to_string();
                    refs.push(format!("{kind}/{name}/{arch}/{branch}"));
                }
            }
        }
        refs.sort();
        Ok(refs)
    }

    /// All refs of one kind, sorted
    pub fn list_refs(&self, kind: RefKind) -> Result<Vec<String>> {
        let base = self.basedir.join(kind.as_str());
        let entries = match fs::read_dir(&base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut refs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            refs.extend(self.list_refs_for_name(kind, &name)?);
        }
        refs.sort();
        Ok(refs)
    }

    /// Names (optionally filtered by prefix) that have an active
    /// deployment for the given branch and arch
    pub fn collect_deployed_refs(
        &self,
        kind: RefKind,
        name_prefix: Option<&str>,
        arch: &str,
        branch: &str,
    ) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let dir = self.basedir.join(kind.as_str());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !entry.file_type()?.is_dir() || name.starts_with('.') {
                continue;
            }
            if let Some(prefix) = name_prefix {
                if !name.starts_with(prefix) {
                    continue;
                }
            }
            let active = entry.path().join(arch).join(branch).join("active");
            if active.exists() {
                names.insert(name);
            }
        }
        Ok(names)
    }

    // --- pull / deploy / undeploy ---

    /// Pull a ref (or bare commit checksum) from a configured remote
    pub fn pull(
        &self,
        remote: &str,
        ref_name: &str,
        progress: Option<&dyn PullProgress>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let repo = self.ensure_repo()?;
        match progress {
            Some(progress) => store::pull::pull(repo, &self.fetcher, remote, ref_name, progress, cancel),
            None => {
                let progress = ConsoleProgress::for_stdout();
                store::pull::pull(repo, &self.fetcher, remote, ref_name, progress.as_ref(), cancel)
            }
        }
    }

    /// Check a commit of `ref_name` out as a new deployment and make it
    /// active. Without a checksum the tip of the recorded origin is used;
    /// with one, the commit is pulled from the origin if not yet local.
    /// Returns the deployed checksum.
    pub fn deploy(
        &self,
        ref_name: &RefName,
        checksum: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<String> {
        let repo = self.ensure_repo()?;
        let deploy_base = self.deploy_base(ref_name);

        let checksum = match checksum {
            None => {
                // Several remotes can carry the same branch; the recorded
                // origin picks the right one
                let refspec = match self.get_origin(ref_name) {
                    Ok(origin) => format!("{origin}:{ref_name}"),
                    Err(_) => ref_name.to_string(),
                };
                debug!("No checksum specified, getting tip of {refspec}");
                repo.resolve_rev(&refspec)
                    .map_err(|e| e.with_context(&format!("While trying to resolve ref {ref_name}")))?
            }
            Some(checksum) => {
                debug!("Looking for checksum {checksum} in local repo");
                if !repo.has_object(checksum, store::wire::ObjectType::Commit) {
                    let origin = fs::read_to_string(deploy_base.join("origin"))?;
                    let origin = origin.trim();
                    debug!("Pulling checksum {checksum} from remote {origin}");
                    self.pull(origin, checksum, None, cancel)?;
                }
                checksum.to_string()
            }
        };

        let checkoutdir = deploy_base.join(&checksum);
        if checkoutdir.exists() {
            return Err(Error::AlreadyDeployed {
                ref_name: ref_name.to_string(),
                checksum,
            });
        }

        let mode = if self.user {
            CheckoutMode::User
        } else {
            CheckoutMode::None
        };
        repo.checkout_tree(&checksum, &checkoutdir, mode, cancel)?;

        // The lock anchor a running app holds while using this deployment
        fs::write(checkoutdir.join("files").join(".ref"), b"")?;

        let export = checkoutdir.join("export");
        if export.exists() {
            exports::rewrite_export_dir(&ref_name.name, &ref_name.branch, &ref_name.arch, &export)?;
        }

        self.set_active(ref_name, Some(&checksum))?;
        Ok(checksum)
    }

    /// Pull, record the origin, deploy, and (for apps) publish exports.
    /// The one-call install path over the building blocks above.
    pub fn install(
        &self,
        remote: &str,
        ref_name: &RefName,
        checksum: Option<&str>,
        progress: Option<&dyn PullProgress>,
        cancel: &CancelToken,
    ) -> Result<String> {
        self.pull(remote, &ref_name.to_string(), progress, cancel)?;
        self.set_origin(ref_name, remote)?;
        let deployed = self.deploy(ref_name, checksum, cancel)?;

        if ref_name.is_app() {
            if self.current_ref(&ref_name.name).is_none() {
                self.make_current_ref(ref_name)?;
            }
            self.update_exports(Some(&ref_name.name))?;
        }
        Ok(deployed)
    }

    /// Remove one deployment. The active link is repointed first; the
    /// checkout is quarantined under `.removed/` and deleted right away
    /// unless a running application still holds its lock.
    pub fn undeploy(
        &self,
        ref_name: &RefName,
        checksum: &str,
        force_remove: bool,
    ) -> Result<()> {
        let deploy_base = self.deploy_base(ref_name);
        let checkoutdir = deploy_base.join(checksum);
        if !checkoutdir.exists() {
            return Err(Error::AlreadyUndeployed {
                ref_name: ref_name.to_string(),
                checksum: checksum.to_string(),
            });
        }

        if self.read_active(ref_name).as_deref() == Some(checksum) {
            // Removing the active deployment: repoint at any other one
            let replacement = self
                .list_deployed(ref_name)?
                .into_iter()
                .find(|deployed| deployed != checksum);
            self.set_active(ref_name, replacement.as_deref())?;
        }

        let removed_dir = layout::removed_dir(&self.basedir);
        fs::create_dir_all(&removed_dir)?;
        let tmp = removed_dir.join(format!("{:08x}-{checksum}", rand::random::<u32>()));
        fs::rename(&checkoutdir, &tmp)?;

        if force_remove || !lock::is_locked(&tmp) {
            if let Err(e) = fs::remove_dir_all(&tmp) {
                warn!("Unable to remove old checkout: {e}");
            }
        }
        Ok(())
    }

    /// Delete quarantined checkouts whose locks have gone away
    pub fn cleanup_removed(&self) -> Result<()> {
        let removed_dir = layout::removed_dir(&self.basedir);
        let entries = match fs::read_dir(&removed_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() && !lock::is_locked(&entry.path()) {
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    warn!("Unable to remove old checkout: {e}");
                }
            }
        }
        Ok(())
    }

    /// Drop store objects no ref reaches anymore
    pub fn prune(&self, cancel: &CancelToken) -> Result<PruneStats> {
        let repo = self.ensure_repo()?;
        let stats = repo.prune(cancel)?;
        debug!(
            "Pruned {}/{} objects, freed {} bytes",
            stats.objects_pruned, stats.objects_total, stats.freed_bytes
        );
        Ok(stats)
    }

    // --- exports ---

    /// Re-publish the installation-wide `exports/` tree, then sweep stale
    /// links and fire triggers
    pub fn update_exports(&self, changed_app: Option<&str>) -> Result<()> {
        let exports_dir = layout::exports_dir(&self.basedir);
        fs::create_dir_all(&exports_dir)?;

        if let Some(app) = changed_app {
            if let Some(current) = self.current_ref(app) {
                let current = RefName::parse(&current)?;
                if let Some(active) = self.read_active(&current) {
                    let export = self.deploy_base(&current).join(active).join("export");
                    if export.exists() {
                        let prefix = Path::new("..")
                            .join("app")
                            .join(app)
                            .join("current")
                            .join("active")
                            .join("export");
                        exports::export_dir(&export, &exports_dir, &prefix)?;
                    }
                }
            }
        }

        exports::remove_dangling_symlinks(&exports_dir)?;
        trigger::run_triggers(&self.basedir)?;
        Ok(())
    }

    // --- inspection ---

    /// Open a deployed ref for consumers: its paths, metadata, and merged
    /// override context
    pub fn load_deployed(&self, ref_name: &RefName, checksum: Option<&str>) -> Result<Deploy> {
        let deploy_dir = self
            .get_if_deployed(ref_name, checksum)
            .ok_or_else(|| Error::NotDeployed(ref_name.to_string()))?;

        let metadata_path = deploy_dir.join("metadata");
        let metadata = match fs::read(&metadata_path) {
            Ok(data) => KeyFile::parse_bytes(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => KeyFile::new(),
            Err(e) => return Err(e.into()),
        };

        let mut deploy = Deploy::new(deploy_dir, metadata);
        if ref_name.is_app() {
            // System overrides only make sense for system installations;
            // user overrides always apply
            if !self.user {
                deploy.set_system_overrides(overrides::load_override(&ref_name.name, Scope::System)?);
            }
            deploy.set_user_overrides(overrides::load_override(&ref_name.name, Scope::User)?);
        }
        Ok(deploy)
    }

    /// Prefetch only the `metadata` file of a remote commit
    pub fn fetch_metadata(&self, remote: &str, commit: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
        let repo = self.ensure_repo()?;
        prefetch::fetch_metadata(repo, &self.fetcher, remote, commit, cancel)
    }

    // --- remote queries ---

    pub fn list_remotes(&self) -> Result<Vec<String>> {
        self.ensure_repo()?.remote_list()
    }

    pub fn list_remote_refs(&self, remote: &str) -> Result<std::collections::BTreeMap<String, String>> {
        self.ensure_repo()?.list_remote_refs(remote)
    }

    /// The display title a remote was configured with
    pub fn remote_title(&self, remote: &str) -> Option<String> {
        self.ensure_repo()
            .ok()
            .and_then(|repo| repo.remote_config_get(remote, "xa.title").ok())
            .flatten()
    }

    /// Whether a remote asked not to be enumerated. Unreadable config
    /// means yes.
    pub fn remote_noenumerate(&self, remote: &str) -> bool {
        match self
            .ensure_repo()
            .and_then(|repo| repo.remote_config_get(remote, "xa.noenumerate"))
        {
            Ok(value) => value.as_deref() == Some("true"),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn installation() -> (TempDir, Installation) {
        let tmp = TempDir::new().unwrap();
        let installation = Installation::new(&tmp.path().join("inst"), true);
        (tmp, installation)
    }

    fn app_ref() -> RefName {
        RefName::parse("app/org.x.App/x86_64/stable").unwrap()
    }

    #[test]
    fn test_ensure_repo_creates_and_reopens() {
        let (tmp, installation) = installation();
        let repo = installation.ensure_repo().unwrap();
        assert_eq!(repo.mode(), StoreMode::BareUser);
        assert!(tmp.path().join("inst").join("repo").join("config").exists());

        // A second instance opens the same store
        let again = Installation::new(&tmp.path().join("inst"), true);
        assert_eq!(again.ensure_repo().unwrap().mode(), StoreMode::BareUser);
    }

    #[test]
    fn test_system_installation_uses_bare_mode() {
        let tmp = TempDir::new().unwrap();
        let installation = Installation::new(&tmp.path().join("system"), false);
        assert_eq!(installation.ensure_repo().unwrap().mode(), StoreMode::Bare);
    }

    #[test]
    fn test_active_link_lifecycle() {
        let (_tmp, installation) = installation();
        let r = app_ref();
        fs::create_dir_all(installation.deploy_base(&r)).unwrap();

        assert_eq!(installation.read_active(&r), None);
        installation.set_active(&r, Some(&"aa".repeat(32))).unwrap();
        assert_eq!(installation.read_active(&r), Some("aa".repeat(32)));

        // Repointing is an atomic replace
        installation.set_active(&r, Some(&"bb".repeat(32))).unwrap();
        assert_eq!(installation.read_active(&r), Some("bb".repeat(32)));

        installation.set_active(&r, None).unwrap();
        assert_eq!(installation.read_active(&r), None);
        // Clearing twice is fine
        installation.set_active(&r, None).unwrap();
    }

    #[test]
    fn test_current_link_lifecycle() {
        let (_tmp, installation) = installation();
        let r = app_ref();
        fs::create_dir_all(installation.basedir.join("app").join("org.x.App")).unwrap();

        assert_eq!(installation.current_ref("org.x.App"), None);
        installation.make_current_ref(&r).unwrap();
        assert_eq!(
            installation.current_ref("org.x.App").as_deref(),
            Some("app/org.x.App/x86_64/stable")
        );

        installation.drop_current_ref("org.x.App").unwrap();
        assert_eq!(installation.current_ref("org.x.App"), None);
        installation.drop_current_ref("org.x.App").unwrap();
    }

    #[test]
    #[should_panic(expected = "current links exist only for apps")]
    fn test_make_current_rejects_runtimes() {
        let (_tmp, installation) = installation();
        let r = RefName::parse("runtime/org.x.Platform/x86_64/1.0").unwrap();
        let _ = installation.make_current_ref(&r);
    }

    #[test]
    fn test_list_deployed_filters_non_checksums() {
        let (_tmp, installation) = installation();
        let r = app_ref();
        let base = installation.deploy_base(&r);
        fs::create_dir_all(base.join("aa".repeat(32))).unwrap();
        fs::create_dir_all(base.join("bb".repeat(32))).unwrap();
        fs::create_dir_all(base.join(".removed-stash")).unwrap();
        fs::create_dir_all(base.join("not-a-checksum")).unwrap();
        fs::write(base.join("origin"), "origin").unwrap();
        std::os::unix::fs::symlink("aa".repeat(32), base.join("active")).unwrap();

        assert_eq!(
            installation.list_deployed(&r).unwrap(),
            vec!["aa".repeat(32), "bb".repeat(32)]
        );
    }

    #[test]
    fn test_list_deployed_missing_base_is_empty() {
        let (_tmp, installation) = installation();
        assert!(installation.list_deployed(&app_ref()).unwrap().is_empty());
    }

    #[test]
    fn test_list_refs_skips_data_and_files() {
        let (_tmp, installation) = installation();
        let base = installation.path().to_path_buf();
        fs::create_dir_all(base.join("app/org.x.App/x86_64/stable")).unwrap();
        fs::create_dir_all(base.join("app/org.x.App/x86_64/devel")).unwrap();
        fs::create_dir_all(base.join("app/org.x.App/data")).unwrap();
        fs::create_dir_all(base.join("app/org.x.Zed/aarch64/stable")).unwrap();
        fs::write(base.join("app/stray-file"), "x").unwrap();

        assert_eq!(
            installation.list_refs(RefKind::App).unwrap(),
            vec![
                "app/org.x.App/x86_64/devel",
                "app/org.x.App/x86_64/stable",
                "app/org.x.Zed/aarch64/stable",
            ]
        );
        assert!(installation.list_refs(RefKind::Runtime).unwrap().is_empty());
    }

    #[test]
    fn test_collect_deployed_refs() {
        let (_tmp, installation) = installation();
        let base = installation.path().to_path_buf();
        fs::create_dir_all(base.join("app/org.x.App/x86_64/stable").join("aa".repeat(32)))
            .unwrap();
        std::os::unix::fs::symlink(
            "aa".repeat(32),
            base.join("app/org.x.App/x86_64/stable/active"),
        )
        .unwrap();
        fs::create_dir_all(base.join("app/org.x.NoActive/x86_64/stable")).unwrap();

        let names = installation
            .collect_deployed_refs(RefKind::App, None, "x86_64", "stable")
            .unwrap();
        assert!(names.contains("org.x.App"));
        assert!(!names.contains("org.x.NoActive"));

        let filtered = installation
            .collect_deployed_refs(RefKind::App, Some("org.y."), "x86_64", "stable")
            .unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_get_origin() {
        let (_tmp, installation) = installation();
        let r = app_ref();
        assert!(matches!(
            installation.get_origin(&r),
            Err(Error::NotDeployed(_))
        ));

        installation.set_origin(&r, "flathub").unwrap();
        assert_eq!(installation.get_origin(&r).unwrap(), "flathub");
    }

    #[test]
    fn test_undeploy_missing_checkout() {
        let (_tmp, installation) = installation();
        let err = installation
            .undeploy(&app_ref(), &"aa".repeat(32), false)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyUndeployed { .. }));
    }

    #[test]
    fn test_remote_noenumerate_defaults() {
        let (_tmp, installation) = installation();
        installation.ensure_repo().unwrap();
        // Configured remote without the key: enumerable
        installation
            .ensure_repo()
            .unwrap()
            .remote_add("origin", "file:///srv/repo")
            .unwrap();
        assert!(!installation.remote_noenumerate("origin"));
        assert_eq!(installation.remote_title("origin"), None);
    }
}
