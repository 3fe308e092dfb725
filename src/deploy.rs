// src/deploy.rs

//! Deployed-ref inspection
//!
//! A `Deploy` is the read-only view consumers get of one deployment: its
//! directory, the application tree under `files/`, the parsed `metadata`
//! key file, and the sandbox context merged from the system and user
//! override files.

use crate::keyfile::KeyFile;
use crate::overrides::SandboxContext;
use std::path::{Path, PathBuf};

/// Handle to one deployed checkout
#[derive(Debug, Clone)]
pub struct Deploy {
    dir: PathBuf,
    metadata: KeyFile,
    system_overrides: Option<SandboxContext>,
    user_overrides: Option<SandboxContext>,
}

impl Deploy {
    pub(crate) fn new(dir: PathBuf, metadata: KeyFile) -> Self {
        Self {
            dir,
            metadata,
            system_overrides: None,
            user_overrides: None,
        }
    }

    pub(crate) fn set_system_overrides(&mut self, overrides: SandboxContext) {
        self.system_overrides = Some(overrides);
    }

    pub(crate) fn set_user_overrides(&mut self, overrides: SandboxContext) {
        self.user_overrides = Some(overrides);
    }

    /// The deployment directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The application tree inside the deployment
    pub fn files(&self) -> PathBuf {
        self.dir.join("files")
    }

    /// The deployment's parsed `metadata`
    pub fn metadata(&self) -> &KeyFile {
        &self.metadata
    }

    /// Merged override context: system first, user on top
    pub fn overrides(&self) -> SandboxContext {
        let mut merged = SandboxContext::new();
        if let Some(system) = &self.system_overrides {
            merged.merge(system);
        }
        if let Some(user) = &self.user_overrides {
            merged.merge(user);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_and_metadata() {
        let metadata = KeyFile::parse("[Application]\nname=org.x.App\n").unwrap();
        let deploy = Deploy::new(PathBuf::from("/inst/app/x/arch/b/aa"), metadata);

        assert_eq!(deploy.dir(), Path::new("/inst/app/x/arch/b/aa"));
        assert_eq!(deploy.files(), PathBuf::from("/inst/app/x/arch/b/aa/files"));
        assert_eq!(
            deploy.metadata().get_string("Application", "name"),
            Some("org.x.App")
        );
    }

    #[test]
    fn test_override_merge_order() {
        let mut deploy = Deploy::new(PathBuf::from("/d"), KeyFile::new());

        let mut system = SandboxContext::new();
        system.sockets.insert("x11".to_string());
        system.environment.insert("MODE".to_string(), "system".to_string());
        deploy.set_system_overrides(system);

        let mut user = SandboxContext::new();
        user.environment.insert("MODE".to_string(), "user".to_string());
        deploy.set_user_overrides(user);

        let merged = deploy.overrides();
        assert!(merged.sockets.contains("x11"));
        assert_eq!(merged.environment.get("MODE").map(String::as_str), Some("user"));
    }
}
