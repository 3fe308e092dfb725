// src/store/wire.rs

//! Object wire format
//!
//! The three object kinds of the content-addressed store, in their
//! serialized-variant layout:
//!
//! - commit: `(a{sv}aya(say)sstayay)` — metadata, parent checksum,
//!   related refs, subject, body, timestamp, root tree checksum (field 6),
//!   root metadata checksum.
//! - dirtree: `(a(say)a(sayay))` — file entries (field 0), then
//!   subdirectory entries.
//! - filez: a 4-byte big-endian header size, the serialized file header
//!   `(tuuuusa(ayay))`, 4 bytes of padding, then a raw-DEFLATE stream of
//!   the file contents.
//!
//! Framing offsets are little-endian with a width of 1/2/4/8 bytes chosen
//! from the container size; fixed-width integers inside objects are stored
//! big-endian. Only the pieces the installation manager needs are decoded,
//! everything else is skipped via the framing offsets.

use crate::error::{Error, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Object kinds addressable in a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    DirTree,
    File,
}

impl ObjectType {
    /// Filename suffix used in `objects/xx/yyyy….{suffix}` and remote URLs
    pub fn suffix(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::DirTree => "dirtree",
            ObjectType::File => "filez",
        }
    }
}

/// Decoded commit object (the fields this crate uses)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub parent: Option<String>,
    pub timestamp: u64,
    pub root_tree: String,
    pub root_metadata: String,
}

/// Decoded dirtree object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirTree {
    /// (filename, file object checksum)
    pub files: Vec<(String, String)>,
    /// (dirname, subtree checksum, dirmeta checksum)
    pub dirs: Vec<(String, String, String)>,
}

/// Decoded filez header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub symlink_target: Option<String>,
}

impl FileHeader {
    pub fn is_symlink(&self) -> bool {
        self.symlink_target.is_some()
    }
}

fn offset_size(container_len: usize) -> usize {
    if container_len <= 0xff {
        1
    } else if container_len <= 0xffff {
        2
    } else if container_len <= 0xffff_ffff {
        4
    } else {
        8
    }
}

fn read_offset(data: &[u8], pos: usize, width: usize) -> Result<usize> {
    let bytes = data
        .get(pos..pos + width)
        .ok_or_else(|| Error::ParseError("Truncated framing offset".to_string()))?;
    let mut value = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        value |= (*b as usize) << (8 * i);
    }
    Ok(value)
}

fn slice<'a>(data: &'a [u8], start: usize, end: usize, what: &str) -> Result<&'a [u8]> {
    if start > end || end > data.len() {
        return Err(Error::ParseError(format!(
            "Invalid {what} bounds {start}..{end} in {}-byte container",
            data.len()
        )));
    }
    Ok(&data[start..end])
}

fn checksum_hex(bytes: &[u8], what: &str) -> Result<String> {
    if bytes.len() != 32 {
        return Err(Error::ParseError(format!(
            "{what} checksum has {} bytes, expected 32",
            bytes.len()
        )));
    }
    Ok(to_hex(bytes))
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(Error::ParseError(format!("Odd-length hex string {s:?}")));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| Error::ParseError(format!("Invalid hex string {s:?}")))
        })
        .collect()
}

/// Read a serialized string member: NUL-terminated UTF-8
fn read_string(bytes: &[u8], what: &str) -> Result<String> {
    match bytes.split_last() {
        Some((0, rest)) => std::str::from_utf8(rest)
            .map(|s| s.to_string())
            .map_err(|_| Error::ParseError(format!("{what} is not valid UTF-8"))),
        _ => Err(Error::ParseError(format!("{what} is not NUL-terminated"))),
    }
}

/// Split an array of variable-sized elements into element slices
fn variable_array_elements<'a>(data: &'a [u8], what: &str) -> Result<Vec<&'a [u8]>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let width = offset_size(data.len());
    if data.len() < width {
        return Err(Error::ParseError(format!("Truncated {what} array")));
    }
    let offsets_start = read_offset(data, data.len() - width, width)?;
    let table_len = data
        .len()
        .checked_sub(offsets_start)
        .ok_or_else(|| Error::ParseError(format!("Invalid {what} offset table")))?;
    if table_len == 0 || table_len % width != 0 {
        return Err(Error::ParseError(format!("Invalid {what} offset table")));
    }

    let count = table_len / width;
    let mut elements = Vec::with_capacity(count);
    let mut start = 0usize;
    for i in 0..count {
        let end = read_offset(data, offsets_start + i * width, width)?;
        elements.push(slice(data, start, end, what)?);
        start = end;
    }
    Ok(elements)
}

/// Parse and validate a commit object, per `(a{sv}aya(say)sstayay)`
pub fn parse_commit(data: &[u8]) -> Result<Commit> {
    let width = offset_size(data.len());
    // Six variable-sized members precede the trailing one: metadata,
    // parent, related, subject, body and the root tree checksum.
    let table = 6 * width;
    if data.len() < table + 8 {
        return Err(Error::ParseError("Commit object too small".to_string()));
    }
    let body_end = data.len() - table;
    let member_end = |index: usize| read_offset(data, data.len() - width * (index + 1), width);

    let parent_bytes = slice(data, member_end(0)?, member_end(1)?, "commit parent")?;
    let parent = match parent_bytes.len() {
        0 => None,
        32 => Some(to_hex(parent_bytes)),
        n => {
            return Err(Error::ParseError(format!(
                "Commit parent checksum has {n} bytes, expected 0 or 32"
            )))
        }
    };

    let timestamp_start = (member_end(4)? + 7) & !7;
    let timestamp_bytes = slice(data, timestamp_start, timestamp_start + 8, "commit timestamp")?;
    let timestamp = u64::from_be_bytes(timestamp_bytes.try_into().unwrap());

    let root_tree = checksum_hex(
        slice(data, timestamp_start + 8, member_end(5)?, "commit root tree")?,
        "Commit root tree",
    )?;
    let root_metadata = checksum_hex(
        slice(data, member_end(5)?, body_end, "commit root metadata")?,
        "Commit root metadata",
    )?;

    Ok(Commit {
        parent,
        timestamp,
        root_tree,
        root_metadata,
    })
}

/// Parse and validate a dirtree object, per `(a(say)a(sayay))`
pub fn parse_dirtree(data: &[u8]) -> Result<DirTree> {
    if data.is_empty() {
        return Ok(DirTree::default());
    }

    let width = offset_size(data.len());
    if data.len() < width {
        return Err(Error::ParseError("Dirtree object too small".to_string()));
    }
    let files_end = read_offset(data, data.len() - width, width)?;
    let files_data = slice(data, 0, files_end, "dirtree files")?;
    let dirs_data = slice(data, files_end, data.len() - width, "dirtree dirs")?;

    let mut tree = DirTree::default();

    for element in variable_array_elements(files_data, "dirtree file entry")? {
        let ew = offset_size(element.len());
        if element.len() < ew {
            return Err(Error::ParseError("Truncated dirtree file entry".to_string()));
        }
        let name_end = read_offset(element, element.len() - ew, ew)?;
        let name = read_string(slice(element, 0, name_end, "file name")?, "File name")?;
        validate_entry_name(&name)?;
        let csum = checksum_hex(
            slice(element, name_end, element.len() - ew, "file checksum")?,
            "File",
        )?;
        tree.files.push((name, csum));
    }

    for element in variable_array_elements(dirs_data, "dirtree dir entry")? {
        let ew = offset_size(element.len());
        if element.len() < 2 * ew {
            return Err(Error::ParseError("Truncated dirtree dir entry".to_string()));
        }
        let name_end = read_offset(element, element.len() - ew, ew)?;
        let tree_end = read_offset(element, element.len() - 2 * ew, ew)?;
        let name = read_string(slice(element, 0, name_end, "dir name")?, "Dir name")?;
        validate_entry_name(&name)?;
        let tree_csum = checksum_hex(slice(element, name_end, tree_end, "dir tree checksum")?, "Dir tree")?;
        let meta_csum = checksum_hex(
            slice(element, tree_end, element.len() - 2 * ew, "dir meta checksum")?,
            "Dir metadata",
        )?;
        tree.dirs.push((name, tree_csum, meta_csum));
    }

    Ok(tree)
}

fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Error::ParseError(format!("Invalid tree entry name {name:?}")));
    }
    Ok(())
}

/// Split a filez object into its parsed header, the raw header bytes
/// (the span file checksums are computed over, together with the
/// uncompressed content) and the raw-DEFLATE payload
pub fn split_filez(data: &[u8]) -> Result<(FileHeader, &[u8], &[u8])> {
    if data.len() < 8 {
        return Err(Error::ParseError("Invalid file object header".to_string()));
    }
    let header_size = u32::from_be_bytes(data[..4].try_into().unwrap()) as usize;
    // The envelope is the 4-byte size, the header, then 4 bytes of padding
    let payload_start = header_size
        .checked_add(8)
        .ok_or_else(|| Error::ParseError("File header size overflow".to_string()))?;
    if payload_start > data.len() {
        return Err(Error::ParseError(format!(
            "File header size {header_size} exceeds object size {}",
            data.len()
        )));
    }

    let header_bytes = &data[4..4 + header_size];
    let header = parse_file_header(header_bytes)?;
    Ok((header, header_bytes, &data[payload_start..]))
}

/// Parse a file header, per `(tuuuusa(ayay))`
fn parse_file_header(data: &[u8]) -> Result<FileHeader> {
    let width = offset_size(data.len());
    if data.len() < 24 + width {
        return Err(Error::ParseError("File header too small".to_string()));
    }
    let size = u64::from_be_bytes(data[0..8].try_into().unwrap());
    let uid = u32::from_be_bytes(data[8..12].try_into().unwrap());
    let gid = u32::from_be_bytes(data[12..16].try_into().unwrap());
    let mode = u32::from_be_bytes(data[16..20].try_into().unwrap());

    let target_end = read_offset(data, data.len() - width, width)?;
    let target = read_string(slice(data, 24, target_end, "symlink target")?, "Symlink target")?;

    Ok(FileHeader {
        size,
        uid,
        gid,
        mode,
        symlink_target: if target.is_empty() { None } else { Some(target) },
    })
}

/// Inflate the raw-DEFLATE payload of a filez object
pub fn inflate(payload: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    DeflateDecoder::new(payload)
        .read_to_end(&mut out)
        .map_err(|e| Error::ParseError(format!("Failed to inflate file object: {e}")))?;
    Ok(out)
}

fn deflate(content: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).expect("in-memory deflate");
    encoder.finish().expect("in-memory deflate")
}

/// Pick the narrowest offset width that can represent the container
fn choose_offset_size(body_len: usize, offset_count: usize) -> usize {
    for width in [1usize, 2, 4, 8] {
        let max = match width {
            1 => 0xff,
            2 => 0xffff,
            4 => 0xffff_ffff,
            _ => usize::MAX,
        };
        if body_len + offset_count * width <= max {
            return width;
        }
    }
    8
}

fn append_offsets(body: &mut Vec<u8>, offsets: &[usize]) {
    let width = choose_offset_size(body.len(), offsets.len());
    for offset in offsets {
        let bytes = offset.to_le_bytes();
        body.extend_from_slice(&bytes[..width]);
    }
}

/// Serialize a commit object
pub fn serialize_commit(
    parent: Option<&str>,
    subject: &str,
    timestamp: u64,
    root_tree: &str,
    root_metadata: &str,
) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut ends = Vec::new();

    // metadata (empty), parent, related (empty)
    ends.push(body.len());
    if let Some(parent) = parent {
        body.extend_from_slice(&from_hex(parent)?);
    }
    ends.push(body.len());
    ends.push(body.len());

    body.extend_from_slice(subject.as_bytes());
    body.push(0);
    ends.push(body.len());
    body.push(0); // empty body string
    ends.push(body.len());

    while body.len() % 8 != 0 {
        body.push(0);
    }
    body.extend_from_slice(&timestamp.to_be_bytes());

    body.extend_from_slice(&from_hex(root_tree)?);
    ends.push(body.len());
    body.extend_from_slice(&from_hex(root_metadata)?);

    // Framing offsets, last variable member's first
    ends.reverse();
    append_offsets(&mut body, &ends);
    Ok(body)
}

/// Serialize a dirtree object
pub fn serialize_dirtree(tree: &DirTree) -> Result<Vec<u8>> {
    let mut files = Vec::new();
    let mut file_ends = Vec::new();
    for (name, csum) in &tree.files {
        let mut element = Vec::new();
        element.extend_from_slice(name.as_bytes());
        element.push(0);
        let name_end = element.len();
        element.extend_from_slice(&from_hex(csum)?);
        append_offsets(&mut element, &[name_end]);
        files.extend_from_slice(&element);
        file_ends.push(files.len());
    }
    append_offsets(&mut files, &file_ends);

    let mut dirs = Vec::new();
    let mut dir_ends = Vec::new();
    for (name, tree_csum, meta_csum) in &tree.dirs {
        let mut element = Vec::new();
        element.extend_from_slice(name.as_bytes());
        element.push(0);
        let name_end = element.len();
        element.extend_from_slice(&from_hex(tree_csum)?);
        let tree_end = element.len();
        element.extend_from_slice(&from_hex(meta_csum)?);
        append_offsets(&mut element, &[tree_end, name_end]);
        dirs.extend_from_slice(&element);
        dir_ends.push(dirs.len());
    }
    append_offsets(&mut dirs, &dir_ends);

    let mut body = files;
    let files_end = body.len();
    body.extend_from_slice(&dirs);
    append_offsets(&mut body, &[files_end]);
    Ok(body)
}

/// Serialize a filez object for regular file contents or a symlink
pub fn serialize_filez(content: &[u8], mode: u32, symlink_target: Option<&str>) -> Vec<u8> {
    let header = serialize_file_header(content.len() as u64, mode, symlink_target);
    let compressed = deflate(content);

    let mut out = Vec::with_capacity(8 + header.len() + compressed.len());
    out.extend_from_slice(&(header.len() as u32).to_be_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&compressed);
    out
}

fn serialize_file_header(size: u64, mode: u32, symlink_target: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&size.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes()); // uid
    body.extend_from_slice(&0u32.to_be_bytes()); // gid
    body.extend_from_slice(&mode.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes()); // rdev
    body.extend_from_slice(symlink_target.unwrap_or("").as_bytes());
    body.push(0);
    let target_end = body.len();
    // xattrs array stays empty
    append_offsets(&mut body, &[target_end]);
    body
}
