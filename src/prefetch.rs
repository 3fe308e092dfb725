// src/prefetch.rs

//! Metadata prefetch
//!
//! Obtains the `metadata` file of a commit with three single-object
//! fetches instead of a full pull: the commit names its root tree, the
//! root tree names the `metadata` file object, and that filez object is
//! inflated in memory.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::store::wire::{self, ObjectType};
use crate::store::ObjectStore;
use tracing::debug;

/// Fetch and inflate the `metadata` file of `commit` from a configured
/// remote. Returns the bytes a full pull and checkout would yield.
pub fn fetch_metadata(
    store: &ObjectStore,
    fetcher: &Fetcher,
    remote: &str,
    commit: &str,
    cancel: &CancelToken,
) -> Result<Vec<u8>> {
    let base_url = store.remote_get_url(remote)?;

    let commit_bytes = fetcher.fetch_object(&base_url, commit, ObjectType::Commit, cancel)?;
    let commit_variant = wire::parse_commit(&commit_bytes)?;
    debug!("Commit {commit} has root tree {}", commit_variant.root_tree);

    let root_bytes = fetcher.fetch_object(
        &base_url,
        &commit_variant.root_tree,
        ObjectType::DirTree,
        cancel,
    )?;
    let root = wire::parse_dirtree(&root_bytes)?;

    let file_checksum = root
        .files
        .iter()
        .find(|(name, _)| name == "metadata")
        .map(|(_, checksum)| checksum.clone())
        .ok_or_else(|| Error::NotFound("Can't find metadata file".to_string()))?;

    let filez_bytes = fetcher.fetch_object(&base_url, &file_checksum, ObjectType::File, cancel)?;
    let (_, _, payload) = wire::split_filez(&filez_bytes)?;
    wire::inflate(payload)
}
