// src/overrides.rs

//! Per-app override files
//!
//! `{base}/overrides/{app-id}` holds a key-value file tweaking the sandbox
//! context an application runs with. Overrides exist in both scopes; the
//! deploy inspector merges system then user on top of each other.

use crate::error::{Error, Result};
use crate::keyfile::KeyFile;
use crate::layout;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

/// Installation scope an override file lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    System,
    User,
}

impl Scope {
    fn base_dir(&self) -> PathBuf {
        match self {
            Scope::System => layout::system_base_dir(),
            Scope::User => layout::user_base_dir(),
        }
    }
}

/// Load an override key file. A missing file is an empty file, a present
/// but malformed one is a parse error.
pub fn load_override_keyfile(app_id: &str, scope: Scope) -> Result<KeyFile> {
    let path = layout::override_path(&scope.base_dir(), app_id);

    match fs::read(&path) {
        Ok(data) => KeyFile::parse_bytes(&data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(KeyFile::new()),
        Err(e) => Err(Error::IoError(format!(
            "Failed to read override {}: {e}",
            path.display()
        ))),
    }
}

/// Load and decode an override into a sandbox context
pub fn load_override(app_id: &str, scope: Scope) -> Result<SandboxContext> {
    let keyfile = load_override_keyfile(app_id, scope)?;
    SandboxContext::from_keyfile(&keyfile)
}

/// Save an override key file, creating `overrides/` (mode 0755) first
pub fn save_override_keyfile(keyfile: &KeyFile, app_id: &str, scope: Scope) -> Result<()> {
    let path = layout::override_path(&scope.base_dir(), app_id);
    let parent = path.parent().expect("override path has a parent");

    fs::create_dir_all(parent)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {e}", parent.display())))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o755));
    }

    fs::write(&path, keyfile.to_data())
        .map_err(|e| Error::IoError(format!("Failed to write {}: {e}", path.display())))
}

/// Decoded sandbox context: the subset of the override schema this crate
/// interprets. Unknown groups and keys are ignored, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxContext {
    pub shared: BTreeSet<String>,
    pub sockets: BTreeSet<String>,
    pub devices: BTreeSet<String>,
    pub filesystems: BTreeSet<String>,
    pub environment: BTreeMap<String, String>,
}

impl SandboxContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keyfile(keyfile: &KeyFile) -> Result<Self> {
        let mut ctx = SandboxContext::new();

        for value in keyfile.get_string_list("Context", "shared") {
            ctx.shared.insert(value);
        }
        for value in keyfile.get_string_list("Context", "sockets") {
            ctx.sockets.insert(value);
        }
        for value in keyfile.get_string_list("Context", "devices") {
            ctx.devices.insert(value);
        }
        for value in keyfile.get_string_list("Context", "filesystems") {
            ctx.filesystems.insert(value);
        }
        for key in keyfile.keys("Environment") {
            if let Some(value) = keyfile.get_string("Environment", &key) {
                ctx.environment.insert(key, value.to_string());
            }
        }

        Ok(ctx)
    }

    /// Union `other` into self; later sources win on environment clashes
    pub fn merge(&mut self, other: &SandboxContext) {
        self.shared.extend(other.shared.iter().cloned());
        self.sockets.extend(other.sockets.iter().cloned());
        self.devices.extend(other.devices.iter().cloned());
        self.filesystems.extend(other.filesystems.iter().cloned());
        for (k, v) in &other.environment {
            self.environment.insert(k.clone(), v.clone());
        }
    }
}
