// src/exports.rs

//! Export rewriting and publishing
//!
//! A deployment may ship an `export/` subtree of desktop files, D-BUS
//! service files and icons. Before a deployment goes active its exports
//! are rewritten in place: files not named after the application are
//! dropped, and every `Exec=` line is replaced so the entry launches the
//! application under the sandbox. The installation-wide `exports/` tree
//! then mirrors the current deployment's exports as relative symlinks.

use crate::error::{Error, Result};
use crate::keyfile::KeyFile;
use crate::layout::{SANDBOX_BIN, SANDBOX_BINDIR};
use crate::reference::has_name_prefix;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use tracing::warn;

fn needs_quoting(token: &str) -> bool {
    !token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_%.=:/@".contains(c))
}

/// Conservative quoting: plain tokens pass through untouched so common
/// `Exec=` lines stay byte-identical apart from the launcher prefix.
fn maybe_quote(token: &str) -> String {
    if needs_quoting(token) {
        match shlex::try_quote(token) {
            Ok(quoted) => quoted.into_owned(),
            Err(_) => token.to_string(),
        }
    } else {
        token.to_string()
    }
}

/// Rewrite one `.desktop`/`.service` file into a temp file next to it,
/// returning the temp file name. The caller renames it over the original.
fn export_desktop_file(
    app: &str,
    branch: &str,
    arch: &str,
    dir: &Path,
    name: &str,
) -> Result<OsString> {
    let path = dir.join(name);
    let data = fs::read(&path)?;
    let mut keyfile = KeyFile::parse_bytes(&data)
        .map_err(|e| e.with_context(&format!("While rewriting {}", path.display())))?;

    if let Some(expected) = name.strip_suffix(".service") {
        let dbus_name = keyfile.get_string("D-BUS Service", "Name");
        if dbus_name != Some(expected) {
            return Err(Error::PolicyViolation(format!(
                "dbus service file {name} has wrong name"
            )));
        }
    }

    let escaped_app = maybe_quote(app);
    let escaped_branch = maybe_quote(branch);
    let escaped_arch = maybe_quote(arch);

    let launcher = format!("{SANDBOX_BINDIR}/{SANDBOX_BIN} launch ");

    for group in keyfile.groups() {
        keyfile.remove_key(&group, "TryExec");
        // Nothing may point outside the sandbox
        keyfile.remove_key(&group, "X-GNOME-Bugzilla-ExtraInfoScript");

        // An already-rewritten line launches under the sandbox as it is;
        // wrapping it again would stack launchers on every deploy
        if keyfile
            .get_string(&group, "Exec")
            .is_some_and(|exec| exec.starts_with(&launcher))
        {
            continue;
        }

        let mut new_exec = format!(
            "{SANDBOX_BINDIR}/{SANDBOX_BIN} launch --branch={escaped_branch} --arch={escaped_arch}"
        );

        let old_argv = keyfile
            .get_string(&group, "Exec")
            .and_then(shlex::split)
            .filter(|argv| !argv.is_empty());

        match old_argv {
            Some(argv) => {
                new_exec.push_str(" --command=");
                new_exec.push_str(&maybe_quote(&argv[0]));
                new_exec.push(' ');
                new_exec.push_str(&escaped_app);
                for arg in &argv[1..] {
                    new_exec.push(' ');
                    new_exec.push_str(&maybe_quote(arg));
                }
            }
            None => {
                new_exec.push(' ');
                new_exec.push_str(&escaped_app);
            }
        }

        keyfile.set_string(&group, "Exec", &new_exec);
    }

    let tmp_name = format!(".rewrite-{:08x}-{name}", rand::random::<u32>());
    fs::write(dir.join(&tmp_name), keyfile.to_data())?;
    Ok(OsString::from(tmp_name))
}

/// Rewrite a deployment's `export/` tree in place
pub fn rewrite_export_dir(app: &str, branch: &str, arch: &str, dir: &Path) -> Result<()> {
    let mut visited: HashSet<OsString> = HashSet::new();

    let entries = fs::read_dir(dir)?;
    for entry in entries {
        let entry = entry?;
        let os_name = entry.file_name();
        // A rewrite creates files mid-iteration; never process a name twice
        if !visited.insert(os_name.clone()) {
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        let name = os_name.to_string_lossy().to_string();

        if file_type.is_dir() {
            rewrite_export_dir(app, branch, arch, &entry.path())?;
        } else if file_type.is_file() {
            if !has_name_prefix(&name, app) {
                warn!("Non-prefixed filename {name} in app {app}, removing");
                remove_ignoring_missing(&entry.path())?;
                continue;
            }

            if name.ends_with(".desktop") || name.ends_with(".service") {
                let tmp_name = export_desktop_file(app, branch, arch, dir, &name)?;
                visited.insert(tmp_name.clone());
                fs::rename(dir.join(&tmp_name), entry.path())?;
            }
        } else {
            warn!("Not exporting file {name} of unsupported type");
            remove_ignoring_missing(&entry.path())?;
        }
    }

    Ok(())
}

fn remove_ignoring_missing(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Mirror `source` into `destination`: parallel directories, every regular
/// file replaced by a relative symlink `{symlink_prefix}/{name}`.
pub fn export_dir(source: &Path, destination: &Path, symlink_prefix: &Path) -> Result<()> {
    fs::create_dir_all(destination)?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();

        if file_type.is_dir() {
            let child_prefix = Path::new("..").join(symlink_prefix).join(&name);
            export_dir(&entry.path(), &destination.join(&name), &child_prefix)?;
        } else if file_type.is_file() {
            let target = symlink_prefix.join(&name);
            let link = destination.join(&name);
            remove_ignoring_missing(&link)?;
            std::os::unix::fs::symlink(&target, &link)?;
        }
    }

    Ok(())
}

/// Drop symlinks whose target no longer resolves, recursively
pub fn remove_dangling_symlinks(dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            remove_dangling_symlinks(&entry.path())?;
        } else if file_type.is_symlink() && !entry.path().exists() {
            remove_ignoring_missing(&entry.path())?;
        }
    }

    Ok(())
}
