// src/lock.rs

//! Deployment in-use detection
//!
//! Every checkout carries a zero-byte `files/.ref`. A running application
//! holds a shared fcntl lock on it for its lifetime; the installer never
//! locks, it only probes with `F_GETLK` before deleting a checkout. fcntl
//! record locks are used (not `flock`) so the probe sees conflicting locks
//! held by any process, wherever the file was opened.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

fn whole_file_lock(lock_type: libc::c_short) -> libc::flock {
    // SAFETY: flock is plain-old-data; zeroed start/len means whole file
    let mut lock: libc::flock = unsafe { std::mem::zeroed() };
    lock.l_type = lock_type;
    lock.l_whence = libc::SEEK_SET as libc::c_short;
    lock
}

/// True if any process holds a lock conflicting with a whole-file write
/// lock on the deployment's `files/.ref`. A missing or unopenable file
/// counts as unlocked.
pub fn is_locked(deploy_dir: &Path) -> bool {
    let ref_path = deploy_dir.join("files").join(".ref");

    // Rust opens with O_CLOEXEC by default
    let file = match OpenOptions::new().read(true).write(true).open(&ref_path) {
        Ok(file) => file,
        Err(_) => return false,
    };

    let mut lock = whole_file_lock(libc::F_WRLCK as libc::c_short);
    // SAFETY: fd is valid for the lifetime of `file`; F_GETLK only reads
    // lock state into the struct we pass
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETLK, &mut lock) };
    rc == 0 && lock.l_type != libc::F_UNLCK as libc::c_short
}

/// A held shared lock on a deployment's `files/.ref`, as taken by a
/// launched application for its lifetime. Released on drop.
pub struct RefLock {
    _file: File,
}

/// Take the shared in-use lock on a deployment
pub fn hold_ref_lock(deploy_dir: &Path) -> Result<RefLock> {
    let ref_path = deploy_dir.join("files").join(".ref");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&ref_path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {e}", ref_path.display())))?;

    let lock = whole_file_lock(libc::F_RDLCK as libc::c_short);
    // SAFETY: fd is valid; F_SETLK takes a const struct flock
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETLK, &lock) };
    if rc != 0 {
        let e = std::io::Error::last_os_error();
        return Err(Error::IoError(format!(
            "Failed to lock {}: {e}",
            ref_path.display()
        )));
    }

    Ok(RefLock { _file: file })
}
