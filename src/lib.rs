// src/lib.rs

//! Capsule installation directory manager
//!
//! Manages the on-disk store of sandboxed application and runtime
//! deployments backed by a content-addressed object repository. Two
//! installations coexist, one per-user and one system-wide; each holds an
//! object store, checksum-named checkouts per ref, `active`/`current`
//! symlinks naming what runs, and an `exports/` tree publishing desktop
//! files rewritten to launch under the sandbox.
//!
//! # Architecture
//!
//! - Filesystem-first: the deployment trees under the installation base
//!   *are* the state, transitions are tmp-file-plus-rename
//! - Advisory locks: running apps hold a lock on their deployment's
//!   `files/.ref`; installers only probe, never block
//! - Embedded object store: commit/dirtree/filez objects in their wire
//!   format, pulled object-by-object over file:// or HTTP(S)

pub mod cancel;
pub mod deploy;
mod error;
pub mod exports;
pub mod fetch;
pub mod installation;
pub mod keyfile;
pub mod layout;
pub mod lock;
pub mod overrides;
pub mod prefetch;
pub mod progress;
pub mod reference;
pub mod store;
pub mod trigger;

pub use cancel::CancelToken;
pub use deploy::Deploy;
pub use error::{Error, Result};
pub use installation::Installation;
pub use keyfile::KeyFile;
pub use overrides::{SandboxContext, Scope};
pub use progress::{ConsoleProgress, PullProgress, PullState, SilentProgress};
pub use reference::{RefKind, RefName};
pub use store::{CheckoutMode, ObjectStore, PruneStats, StoreMode};
