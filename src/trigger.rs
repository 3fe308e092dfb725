// src/trigger.rs

//! Post-export triggers
//!
//! After the `exports/` tree changes, every `*.trigger` regular file in
//! the system trigger directory is run through the helper to refresh
//! host-side caches (icon caches, desktop databases, mime info). A failing
//! trigger is logged and skipped; triggers never fail the export update.

use crate::error::Result;
use crate::layout::{TRIGGER_DIR, TRIGGER_HELPER};
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Run all triggers against one installation base directory
pub fn run_triggers(base: &Path) -> Result<()> {
    run_triggers_in(Path::new(TRIGGER_DIR), base)
}

fn run_triggers_in(triggers_dir: &Path, base: &Path) -> Result<()> {
    debug!("running triggers");

    let entries = match fs::read_dir(triggers_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !entry.file_type()?.is_file() || !name.ends_with(".trigger") {
            continue;
        }

        debug!("running trigger {name}");
        let status = Command::new(TRIGGER_HELPER)
            .arg("-a")
            .arg(base)
            .arg("-e")
            .arg("-F")
            .arg("/usr")
            .arg(entry.path())
            .stdin(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("Error running trigger {name}: exit status {status}"),
            Err(e) => warn!("Error running trigger {name}: {e}"),
        }
    }

    Ok(())
}
