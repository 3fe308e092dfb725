// src/keyfile.rs

//! Key-value files
//!
//! The format shared by deployment `metadata`, override files, the repo
//! config and exported `.desktop`/`.service` files: `[Group]` headers
//! followed by `Key=Value` lines. Group order, key order and translated
//! keys (`Name[locale]`) are preserved across a parse/serialize round
//! trip; comments and blank lines are dropped, which is what the rewrite
//! path wants.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Group {
    name: String,
    entries: Vec<Entry>,
}

/// An ordered key-value file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFile {
    groups: Vec<Group>,
}

impl KeyFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse file contents. Lines must be group headers, `key=value`
    /// pairs inside a group, comments (`#`) or blank.
    pub fn parse(data: &str) -> Result<Self> {
        let mut file = KeyFile::new();
        let mut current: Option<usize> = None;

        for (lineno, raw) in data.lines().enumerate() {
            let line = raw.trim_end();
            let trimmed = line.trim_start();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| {
                    Error::ParseError(format!(
                        "Invalid group header on line {}: {line:?}",
                        lineno + 1
                    ))
                })?;
                if name.is_empty() || name.contains('[') || name.contains(']') {
                    return Err(Error::ParseError(format!(
                        "Invalid group name on line {}: {line:?}",
                        lineno + 1
                    )));
                }
                current = Some(file.group_index_or_insert(name));
                continue;
            }

            let idx = current.ok_or_else(|| {
                Error::ParseError(format!(
                    "Key-value pair outside any group on line {}: {line:?}",
                    lineno + 1
                ))
            })?;

            let (key, value) = trimmed.split_once('=').ok_or_else(|| {
                Error::ParseError(format!("Invalid line {}: {line:?}", lineno + 1))
            })?;
            let key = key.trim_end();
            if key.is_empty() {
                return Err(Error::ParseError(format!(
                    "Empty key on line {}: {line:?}",
                    lineno + 1
                )));
            }

            let entry = Entry {
                key: key.to_string(),
                value: value.trim_start().to_string(),
            };
            let group = &mut file.groups[idx];
            match group.entries.iter_mut().find(|e| e.key == entry.key) {
                Some(existing) => existing.value = entry.value,
                None => group.entries.push(entry),
            }
        }

        Ok(file)
    }

    /// Parse raw bytes; non-UTF-8 input is a parse error.
    pub fn parse_bytes(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::ParseError(format!("Key file is not valid UTF-8: {e}")))?;
        Self::parse(text)
    }

    /// Serialize back to text. Groups in order, one blank line between.
    pub fn to_data(&self) -> String {
        let mut out = String::new();
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push('[');
            out.push_str(&group.name);
            out.push_str("]\n");
            for entry in &group.entries {
                out.push_str(&entry.key);
                out.push('=');
                out.push_str(&entry.value);
                out.push('\n');
            }
        }
        out
    }

    fn group_index_or_insert(&mut self, name: &str) -> usize {
        if let Some(idx) = self.groups.iter().position(|g| g.name == name) {
            return idx;
        }
        self.groups.push(Group {
            name: name.to_string(),
            entries: Vec::new(),
        });
        self.groups.len() - 1
    }

    /// Group names in file order
    pub fn groups(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.name == group)
    }

    /// Keys of a group in file order (empty if the group is absent)
    pub fn keys(&self, group: &str) -> Vec<String> {
        self.groups
            .iter()
            .find(|g| g.name == group)
            .map(|g| g.entries.iter().map(|e| e.key.clone()).collect())
            .unwrap_or_default()
    }

    pub fn get_string(&self, group: &str, key: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.name == group)?
            .entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Desktop-style list value: `;`-separated, trailing separator allowed
    pub fn get_string_list(&self, group: &str, key: &str) -> Vec<String> {
        self.get_string(group, key)
            .map(|v| {
                v.split(';')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_bool(&self, group: &str, key: &str) -> Option<bool> {
        match self.get_string(group, key) {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        }
    }

    pub fn set_string(&mut self, group: &str, key: &str, value: &str) {
        let idx = self.group_index_or_insert(group);
        let group = &mut self.groups[idx];
        match group.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value.to_string(),
            None => group.entries.push(Entry {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Remove a key; true if it existed
    pub fn remove_key(&mut self, group: &str, key: &str) -> bool {
        if let Some(g) = self.groups.iter_mut().find(|g| g.name == group) {
            let before = g.entries.len();
            g.entries.retain(|e| e.key != key);
            return g.entries.len() != before;
        }
        false
    }
}
