// src/store/mod.rs

//! Content-addressed object store
//!
//! The local repository backing every installation: commit, dirtree and
//! filez objects under `objects/{xx}/{yyyy…}.{type}`, ref files under
//! `refs/heads/` and `refs/remotes/{remote}/`, and a key-value `config`
//! naming the store mode and the configured remotes.
//!
//! Commit and dirtree objects are addressed by the SHA-256 of their
//! serialized bytes; file objects by the SHA-256 of `header ‖ uncompressed
//! content`, so the (non-canonical) DEFLATE stream never influences
//! identity and a fetched object is verified end-to-end by inflating it.

pub mod pull;
pub mod wire;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::keyfile::KeyFile;
use crate::reference::is_valid_checksum;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use wire::{Commit, DirTree, ObjectType};

/// How objects are kept on disk, recorded in the repo config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// System installations: ownership and modes applied verbatim
    Bare,
    /// User installations: everything owned by the calling user
    BareUser,
}

impl StoreMode {
    fn as_str(&self) -> &'static str {
        match self {
            StoreMode::Bare => "bare",
            StoreMode::BareUser => "bare-user",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "bare" => Ok(StoreMode::Bare),
            "bare-user" => Ok(StoreMode::BareUser),
            other => Err(Error::ParseError(format!("Unknown repository mode {other:?}"))),
        }
    }
}

/// Permission handling during checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    /// Apply stored mode bits as-is
    None,
    /// Checkout owned by the calling user, setuid bits dropped
    User,
}

/// Counts reported by a prune pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub objects_total: usize,
    pub objects_pruned: usize,
    pub freed_bytes: u64,
}

/// An open repository
pub struct ObjectStore {
    path: PathBuf,
    mode: StoreMode,
}

impl ObjectStore {
    /// Create a fresh repository at `path` in the given mode
    pub fn create(path: &Path, mode: StoreMode) -> Result<Self> {
        fs::create_dir_all(path.join("objects"))?;
        fs::create_dir_all(path.join("refs").join("heads"))?;
        fs::create_dir_all(path.join("refs").join("remotes"))?;
        fs::create_dir_all(path.join("tmp"))?;

        let mut config = KeyFile::new();
        config.set_string("core", "repo_version", "1");
        config.set_string("core", "mode", mode.as_str());
        fs::write(path.join("config"), config.to_data())?;

        debug!("Created {} repository at {}", mode.as_str(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            mode,
        })
    }

    /// Open an existing repository, reading its mode from `config`
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join("config");
        let data = fs::read(&config_path).map_err(|e| {
            Error::IoError(format!(
                "While opening repository {}: {e}",
                path.display()
            ))
        })?;
        let config = KeyFile::parse_bytes(&data)
            .map_err(|e| e.with_context(&format!("While opening repository {}", path.display())))?;
        let mode = StoreMode::parse(config.get_string("core", "mode").unwrap_or("bare"))?;

        Ok(Self {
            path: path.to_path_buf(),
            mode,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Read the repo config key file
    pub fn config(&self) -> Result<KeyFile> {
        let data = fs::read(self.path.join("config"))?;
        KeyFile::parse_bytes(&data)
    }

    fn write_config(&self, config: &KeyFile) -> Result<()> {
        fs::write(self.path.join("config"), config.to_data())?;
        Ok(())
    }

    // --- objects ---

    /// `objects/{xx}/{yyyy…}.{type}` under the repository
    pub fn object_path(&self, checksum: &str, object_type: ObjectType) -> PathBuf {
        let (prefix, rest) = checksum.split_at(2);
        self.path
            .join("objects")
            .join(prefix)
            .join(format!("{rest}.{}", object_type.suffix()))
    }

    pub fn has_object(&self, checksum: &str, object_type: ObjectType) -> bool {
        is_valid_checksum(checksum) && self.object_path(checksum, object_type).exists()
    }

    pub fn load_object(&self, checksum: &str, object_type: ObjectType) -> Result<Vec<u8>> {
        if !is_valid_checksum(checksum) {
            return Err(Error::ParseError(format!("Invalid object checksum {checksum:?}")));
        }
        let path = self.object_path(checksum, object_type);
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!(
                "No {} object {checksum}",
                object_type.suffix()
            )),
            _ => Error::IoError(format!("Failed to read {}: {e}", path.display())),
        })
    }

    /// Store raw object bytes under a known checksum. Already-present
    /// objects are left alone.
    pub fn write_object(&self, checksum: &str, object_type: ObjectType, data: &[u8]) -> Result<()> {
        let path = self.object_path(checksum, object_type);
        if path.exists() {
            debug!("Object {checksum}.{} already present", object_type.suffix());
            return Ok(());
        }

        let parent = path.parent().expect("object path has a parent");
        fs::create_dir_all(parent)?;

        let tmp = self
            .path
            .join("tmp")
            .join(format!("{checksum}.{}", object_type.suffix()));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn sha256_hex(parts: &[&[u8]]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        wire::to_hex(&hasher.finalize())
    }

    /// Serialize and store a commit object; returns its checksum
    pub fn write_commit(
        &self,
        parent: Option<&str>,
        subject: &str,
        timestamp: u64,
        root_tree: &str,
    ) -> Result<String> {
        let root_metadata = wire::to_hex(&[0u8; 32]);
        let data = wire::serialize_commit(parent, subject, timestamp, root_tree, &root_metadata)?;
        let checksum = Self::sha256_hex(&[&data]);
        self.write_object(&checksum, ObjectType::Commit, &data)?;
        Ok(checksum)
    }

    /// Serialize and store a dirtree object; returns its checksum
    pub fn write_dirtree(&self, tree: &DirTree) -> Result<String> {
        let data = wire::serialize_dirtree(tree)?;
        let checksum = Self::sha256_hex(&[&data]);
        self.write_object(&checksum, ObjectType::DirTree, &data)?;
        Ok(checksum)
    }

    /// Serialize and store file contents (or a symlink); returns the
    /// content checksum
    pub fn write_file_object(
        &self,
        content: &[u8],
        mode: u32,
        symlink_target: Option<&str>,
    ) -> Result<String> {
        let data = wire::serialize_filez(content, mode, symlink_target);
        let (_, header_bytes, _) = wire::split_filez(&data)?;
        let checksum = Self::sha256_hex(&[header_bytes, content]);
        self.write_object(&checksum, ObjectType::File, &data)?;
        Ok(checksum)
    }

    /// Verify fetched file object bytes against their claimed checksum
    pub fn verify_file_object(checksum: &str, data: &[u8]) -> Result<Vec<u8>> {
        let (_, header_bytes, payload) = wire::split_filez(data)?;
        let content = wire::inflate(payload)?;
        let actual = Self::sha256_hex(&[header_bytes, &content]);
        if actual != checksum {
            return Err(Error::ParseError(format!(
                "File object checksum mismatch: expected {checksum}, got {actual}"
            )));
        }
        Ok(content)
    }

    /// Load and parse a commit
    pub fn read_commit(&self, checksum: &str) -> Result<Commit> {
        let data = self.load_object(checksum, ObjectType::Commit)?;
        wire::parse_commit(&data)
            .map_err(|e| e.with_context(&format!("While reading commit {checksum}")))
    }

    /// Load and parse a dirtree
    pub fn read_dirtree(&self, checksum: &str) -> Result<DirTree> {
        let data = self.load_object(checksum, ObjectType::DirTree)?;
        wire::parse_dirtree(&data)
            .map_err(|e| e.with_context(&format!("While reading tree {checksum}")))
    }

    // --- refs ---

    fn ref_path(&self, remote: Option<&str>, ref_name: &str) -> PathBuf {
        match remote {
            Some(remote) => self.path.join("refs").join("remotes").join(remote).join(ref_name),
            None => self.path.join("refs").join("heads").join(ref_name),
        }
    }

    /// Record a ref as pointing at a commit
    pub fn write_ref(&self, remote: Option<&str>, ref_name: &str, checksum: &str) -> Result<()> {
        let path = self.ref_path(remote, ref_name);
        let parent = path.parent().expect("ref path has a parent");
        fs::create_dir_all(parent)?;
        fs::write(&path, format!("{checksum}\n"))?;
        Ok(())
    }

    fn read_ref_file(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(data) => {
                let checksum = data.trim().to_string();
                if !is_valid_checksum(&checksum) {
                    return Err(Error::ParseError(format!(
                        "Ref file {} does not contain a checksum",
                        path.display()
                    )));
                }
                Ok(Some(checksum))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve `remote:ref` or a plain ref to a commit checksum
    pub fn resolve_rev(&self, refspec: &str) -> Result<String> {
        if let Some((remote, ref_name)) = refspec.split_once(':') {
            return self
                .read_ref_file(&self.ref_path(Some(remote), ref_name))?
                .ok_or_else(|| Error::NotFound(format!("Refspec {refspec} not found")));
        }

        if let Some(checksum) = self.read_ref_file(&self.ref_path(None, refspec))? {
            return Ok(checksum);
        }
        for remote in self.remote_list()? {
            if let Some(checksum) = self.read_ref_file(&self.ref_path(Some(&remote), refspec))? {
                return Ok(checksum);
            }
        }
        Err(Error::NotFound(format!("Refspec {refspec} not found")))
    }

    fn collect_refs(dir: &Path, prefix: &str, out: &mut BTreeMap<String, String>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let child = format!("{prefix}{name}");
            if entry.file_type()?.is_dir() {
                Self::collect_refs(&entry.path(), &format!("{child}/"), out)?;
            } else if let Ok(data) = fs::read_to_string(entry.path()) {
                let checksum = data.trim().to_string();
                if is_valid_checksum(&checksum) {
                    out.insert(child, checksum);
                }
            }
        }
        Ok(())
    }

    /// Refs locally mirrored for one remote, sorted by ref name
    pub fn list_remote_refs(&self, remote: &str) -> Result<BTreeMap<String, String>> {
        let mut refs = BTreeMap::new();
        Self::collect_refs(
            &self.path.join("refs").join("remotes").join(remote),
            "",
            &mut refs,
        )?;
        Ok(refs)
    }

    /// Every known ref (local heads plus all remote mirrors)
    fn all_refs(&self) -> Result<BTreeMap<String, String>> {
        let mut refs = BTreeMap::new();
        Self::collect_refs(&self.path.join("refs").join("heads"), "", &mut refs)?;
        let remotes_dir = self.path.join("refs").join("remotes");
        if let Ok(entries) = fs::read_dir(&remotes_dir) {
            for entry in entries.flatten() {
                let remote = entry.file_name().to_string_lossy().to_string();
                let mut remote_refs = BTreeMap::new();
                Self::collect_refs(&entry.path(), "", &mut remote_refs)?;
                for (name, checksum) in remote_refs {
                    refs.insert(format!("{remote}:{name}"), checksum);
                }
            }
        }
        Ok(refs)
    }

    // --- remotes ---

    fn remote_group(remote: &str) -> String {
        format!("remote \"{remote}\"")
    }

    /// Configure (or update) a remote's URL
    pub fn remote_add(&self, remote: &str, url: &str) -> Result<()> {
        let mut config = self.config()?;
        config.set_string(&Self::remote_group(remote), "url", url);
        self.write_config(&config)
    }

    /// Names of all configured remotes, sorted
    pub fn remote_list(&self) -> Result<Vec<String>> {
        let config = self.config()?;
        let mut remotes: Vec<String> = config
            .groups()
            .into_iter()
            .filter_map(|group| {
                group
                    .strip_prefix("remote \"")
                    .and_then(|rest| rest.strip_suffix('"'))
                    .map(|name| name.to_string())
            })
            .collect();
        remotes.sort();
        Ok(remotes)
    }

    pub fn remote_get_url(&self, remote: &str) -> Result<String> {
        self.remote_config_get(remote, "url")?
            .ok_or_else(|| Error::NotFound(format!("Remote {remote:?} has no url configured")))
    }

    /// Read one key of a remote's config section
    pub fn remote_config_get(&self, remote: &str, key: &str) -> Result<Option<String>> {
        let config = self.config()?;
        Ok(config
            .get_string(&Self::remote_group(remote), key)
            .map(|s| s.to_string()))
    }

    // --- checkout ---

    /// Materialize the tree of `checksum` into `dest`. Overwrite policy is
    /// none: fails if `dest` already exists.
    pub fn checkout_tree(
        &self,
        checksum: &str,
        dest: &Path,
        mode: CheckoutMode,
        cancel: &CancelToken,
    ) -> Result<()> {
        let commit = self.read_commit(checksum)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(dest).map_err(|e| {
            Error::IoError(format!("Failed to create checkout {}: {e}", dest.display()))
        })?;

        self.checkout_dirtree(&commit.root_tree, dest, mode, cancel)
            .map_err(|e| {
                e.with_context(&format!(
                    "While trying to checkout {checksum} into {}",
                    dest.display()
                ))
            })
    }

    fn checkout_dirtree(
        &self,
        tree_checksum: &str,
        dest: &Path,
        mode: CheckoutMode,
        cancel: &CancelToken,
    ) -> Result<()> {
        let tree = self.read_dirtree(tree_checksum)?;

        for (name, file_checksum) in &tree.files {
            cancel.check()?;
            let data = self.load_object(file_checksum, ObjectType::File)?;
            let (header, _, payload) = wire::split_filez(&data)?;
            let path = dest.join(name);

            if let Some(target) = &header.symlink_target {
                std::os::unix::fs::symlink(target, &path)?;
                continue;
            }

            let content = wire::inflate(payload)?;
            fs::write(&path, &content)?;

            use std::os::unix::fs::PermissionsExt;
            let permissions = match mode {
                CheckoutMode::None => header.mode & 0o7777,
                CheckoutMode::User => header.mode & 0o777,
            };
            fs::set_permissions(&path, fs::Permissions::from_mode(permissions))?;
        }

        for (name, subtree_checksum, _) in &tree.dirs {
            cancel.check()?;
            let path = dest.join(name);
            fs::create_dir(&path)?;
            self.checkout_dirtree(subtree_checksum, &path, mode, cancel)?;
        }

        Ok(())
    }

    // --- prune ---

    /// Remove objects unreachable from any ref
    pub fn prune(&self, cancel: &CancelToken) -> Result<PruneStats> {
        let mut reachable: HashSet<(String, ObjectType)> = HashSet::new();

        for (_, commit_checksum) in self.all_refs()? {
            cancel.check()?;
            self.mark_commit(&commit_checksum, &mut reachable)?;
        }

        let mut stats = PruneStats::default();
        let objects_dir = self.path.join("objects");
        let prefixes = match fs::read_dir(&objects_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };

        for prefix in prefixes {
            let prefix = prefix?;
            if !prefix.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(prefix.path())? {
                cancel.check()?;
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().to_string();
                let Some((rest, suffix)) = name.split_once('.') else {
                    continue;
                };
                let object_type = match suffix {
                    "commit" => ObjectType::Commit,
                    "dirtree" => ObjectType::DirTree,
                    "filez" => ObjectType::File,
                    _ => continue,
                };
                let checksum = format!("{}{rest}", prefix.file_name().to_string_lossy());
                if !is_valid_checksum(&checksum) {
                    continue;
                }

                stats.objects_total += 1;
                if !reachable.contains(&(checksum.clone(), object_type)) {
                    let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    match fs::remove_file(entry.path()) {
                        Ok(()) => {
                            stats.objects_pruned += 1;
                            stats.freed_bytes += size;
                        }
                        Err(e) => warn!("Unable to prune object {checksum}: {e}"),
                    }
                }
            }
        }

        debug!(
            "Pruned {}/{} objects, {} bytes",
            stats.objects_pruned, stats.objects_total, stats.freed_bytes
        );
        Ok(stats)
    }

    fn mark_commit(
        &self,
        checksum: &str,
        reachable: &mut HashSet<(String, ObjectType)>,
    ) -> Result<()> {
        if !reachable.insert((checksum.to_string(), ObjectType::Commit)) {
            return Ok(());
        }
        // Tolerate partially-pulled history: unreachable pieces just stay
        // candidates for the next prune after a completed pull.
        let commit = match self.read_commit(checksum) {
            Ok(commit) => commit,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        self.mark_dirtree(&commit.root_tree, reachable)
    }

    fn mark_dirtree(
        &self,
        checksum: &str,
        reachable: &mut HashSet<(String, ObjectType)>,
    ) -> Result<()> {
        if !reachable.insert((checksum.to_string(), ObjectType::DirTree)) {
            return Ok(());
        }
        let tree = match self.read_dirtree(checksum) {
            Ok(tree) => tree,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        for (_, file_checksum) in &tree.files {
            reachable.insert((file_checksum.clone(), ObjectType::File));
        }
        for (_, subtree, _) in &tree.dirs {
            self.mark_dirtree(subtree, reachable)?;
        }
        Ok(())
    }
}
