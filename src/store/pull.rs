// src/store/pull.rs

//! Pulling refs and objects into the local store
//!
//! A pull resolves the requested ref against the remote's `refs/heads/`
//! layout (unless the caller already names a commit), walks the commit's
//! tree and fetches every missing object, verifying each against its
//! checksum before it lands in `objects/`. Already-present objects are
//! skipped, so a cancelled or failed pull is resumed by simply retrying.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::progress::{PullProgress, PullState};
use crate::reference::is_valid_checksum;
use crate::store::wire::{self, ObjectType};
use crate::store::ObjectStore;
use sha2::{Digest, Sha256};
use tracing::debug;

struct PullContext<'a> {
    store: &'a ObjectStore,
    fetcher: &'a Fetcher,
    base_url: String,
    progress: &'a dyn PullProgress,
    cancel: &'a CancelToken,
    state: PullState,
}

impl<'a> PullContext<'a> {
    fn note_fetched(&mut self, bytes: usize) {
        self.state.fetched_objects += 1;
        self.state.transferred_bytes += bytes as u64;
        self.progress.progress(&self.state);
    }

    fn fetch_commit(&mut self, checksum: &str) -> Result<()> {
        let root_tree = if self.store.has_object(checksum, ObjectType::Commit) {
            self.store.read_commit(checksum)?.root_tree
        } else {
            let data =
                self.fetcher
                    .fetch_object(&self.base_url, checksum, ObjectType::Commit, self.cancel)?;
            verify_wire_checksum(checksum, &data)?;
            let commit = wire::parse_commit(&data)?;
            self.store.write_object(checksum, ObjectType::Commit, &data)?;
            self.note_fetched(data.len());
            commit.root_tree
        };
        self.fetch_dirtree(&root_tree)
    }

    fn fetch_dirtree(&mut self, checksum: &str) -> Result<()> {
        // Walk even already-present trees: an interrupted pull can leave a
        // tree object without its children.
        let tree = if self.store.has_object(checksum, ObjectType::DirTree) {
            self.store.read_dirtree(checksum)?
        } else {
            let data = self.fetcher.fetch_object(
                &self.base_url,
                checksum,
                ObjectType::DirTree,
                self.cancel,
            )?;
            verify_wire_checksum(checksum, &data)?;
            let tree = wire::parse_dirtree(&data)?;
            self.store.write_object(checksum, ObjectType::DirTree, &data)?;
            self.note_fetched(data.len());
            tree
        };

        for (_, file_checksum) in &tree.files {
            if self.store.has_object(file_checksum, ObjectType::File) {
                continue;
            }
            let data = self.fetcher.fetch_object(
                &self.base_url,
                file_checksum,
                ObjectType::File,
                self.cancel,
            )?;
            ObjectStore::verify_file_object(file_checksum, &data)?;
            self.store.write_object(file_checksum, ObjectType::File, &data)?;
            self.note_fetched(data.len());
        }

        for (_, subtree, _) in &tree.dirs {
            self.fetch_dirtree(subtree)?;
        }
        Ok(())
    }
}

fn verify_wire_checksum(expected: &str, data: &[u8]) -> Result<()> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let actual = wire::to_hex(&hasher.finalize());
    if actual != expected {
        return Err(Error::ParseError(format!(
            "Object checksum mismatch: expected {expected}, got {actual}"
        )));
    }
    Ok(())
}

/// Pull one ref (or a bare commit checksum) from a configured remote into
/// the store
pub fn pull(
    store: &ObjectStore,
    fetcher: &Fetcher,
    remote: &str,
    ref_name: &str,
    progress: &dyn PullProgress,
    cancel: &CancelToken,
) -> Result<()> {
    let inner = || -> Result<()> {
        let base_url = store.remote_get_url(remote)?;

        let checksum = if is_valid_checksum(ref_name) {
            ref_name.to_string()
        } else {
            fetcher.fetch_ref(&base_url, ref_name, cancel)?
        };
        debug!("Pulling {ref_name} ({checksum}) from {remote}");

        let mut context = PullContext {
            store,
            fetcher,
            base_url,
            progress,
            cancel,
            state: PullState::default(),
        };
        context.fetch_commit(&checksum)?;

        if !is_valid_checksum(ref_name) {
            store.write_ref(Some(remote), ref_name, &checksum)?;
        }
        Ok(())
    };

    inner().map_err(|e| match e {
        Error::Cancelled => Error::Cancelled,
        other => other.with_context(&format!("While pulling {ref_name} from remote {remote}")),
    })
}
