// src/reference.rs

//! Ref identifiers
//!
//! A ref names one branch of one application or runtime:
//! `kind/name/arch/branch`, e.g. `app/org.gnome.Gedit/x86_64/stable`.
//! Deployment checkouts are named by the 64-hex commit checksum below the
//! ref's directory.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// The two deployment trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    App,
    Runtime,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::App => "app",
            RefKind::Runtime => "runtime",
        }
    }
}

impl FromStr for RefKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "app" => Ok(RefKind::App),
            "runtime" => Ok(RefKind::Runtime),
            other => Err(Error::ParseError(format!(
                "Invalid ref kind {other:?}, expected \"app\" or \"runtime\""
            ))),
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `kind/name/arch/branch` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefName {
    pub kind: RefKind,
    pub name: String,
    pub arch: String,
    pub branch: String,
}

impl RefName {
    pub fn new(kind: RefKind, name: &str, arch: &str, branch: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            arch: arch.to_string(),
            branch: branch.to_string(),
        }
    }

    /// Parse a full ref. Exactly four `/`-separated parts are required.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 4 {
            return Err(Error::ParseError(format!(
                "Invalid ref {s:?}: expected kind/name/arch/branch"
            )));
        }

        Ok(Self {
            kind: parts[0].parse()?,
            name: parts[1].to_string(),
            arch: parts[2].to_string(),
            branch: parts[3].to_string(),
        })
    }

    pub fn is_app(&self) -> bool {
        self.kind == RefKind::App
    }
}

impl FromStr for RefName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RefName::parse(s)
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.kind, self.name, self.arch, self.branch)
    }
}

/// True for a 64-character lowercase-hex commit checksum
pub fn is_valid_checksum(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn is_name_character(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Export filename policy: a file belongs to `name` if its basename is the
/// name itself, or the name followed by `.` or by any character that could
/// not continue an application id (so `org.x.App.desktop` and
/// `org.x.App@2x.png` pass, `org.x.AppEvil.desktop` does not).
pub fn has_name_prefix(basename: &str, name: &str) -> bool {
    let rest = match basename.strip_prefix(name) {
        Some(rest) => rest,
        None => return false,
    };

    match rest.chars().next() {
        None => true,
        Some('.') => true,
        Some(c) => !is_name_character(c),
    }
}
