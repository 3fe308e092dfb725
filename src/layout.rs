// src/layout.rs

//! On-disk layout
//!
//! Pure functions mapping logical identifiers to paths under an
//! installation base directory, plus the well-known system locations.
//!
//! An installation base contains:
//! - `repo/` — the content-addressed object store
//! - `app/`, `runtime/` — deployment trees
//! - `exports/` — installation-wide published exports (symlinks only)
//! - `overrides/` — per-app override files
//! - `.removed/` — quarantine for undeployed but still-locked checkouts

use crate::reference::RefName;
use std::path::{Path, PathBuf};

/// System-wide installation base
pub const SYSTEM_DIR: &str = "/var/lib/capsule";

/// Directory scanned for `*.trigger` scripts after export updates
pub const TRIGGER_DIR: &str = "/usr/share/capsule/triggers";

/// Privileged helper that trigger scripts are run through
pub const TRIGGER_HELPER: &str = "/usr/libexec/capsule-helper";

/// Directory holding the sandbox launcher binary
pub const SANDBOX_BINDIR: &str = "/usr/bin";

/// Name of the sandbox launcher binary
pub const SANDBOX_BIN: &str = "capsule";

/// System-wide installation base directory
pub fn system_base_dir() -> PathBuf {
    PathBuf::from(SYSTEM_DIR)
}

/// Per-user installation base directory (`$XDG_DATA_HOME/capsule`)
pub fn user_base_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("capsule")
}

/// `{base}/{kind}/{name}/{arch}/{branch}` — the per-ref deployment base
pub fn deploy_base(base: &Path, ref_name: &RefName) -> PathBuf {
    base.join(ref_name.kind.as_str())
        .join(&ref_name.name)
        .join(&ref_name.arch)
        .join(&ref_name.branch)
}

/// `{base}/{kind}/{name}/{arch}/{branch}/{checksum}` — one checkout
pub fn checkout_dir(base: &Path, ref_name: &RefName, checksum: &str) -> PathBuf {
    deploy_base(base, ref_name).join(checksum)
}

/// `{base}/exports`
pub fn exports_dir(base: &Path) -> PathBuf {
    base.join("exports")
}

/// `{base}/.removed`
pub fn removed_dir(base: &Path) -> PathBuf {
    base.join(".removed")
}

/// `{base}/repo`
pub fn repo_dir(base: &Path) -> PathBuf {
    base.join("repo")
}

/// `{base}/overrides/{app_id}`
pub fn override_path(base: &Path, app_id: &str) -> PathBuf {
    base.join("overrides").join(app_id)
}

/// `{base}/app/{name}/current` — the current (arch, branch) link of an app
pub fn current_link(base: &Path, name: &str) -> PathBuf {
    base.join("app").join(name).join("current")
}
