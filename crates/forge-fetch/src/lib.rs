//! Forge Fetch Library
//!
//! Resolves repositories hosted on GitHub, GitLab and SourceHut into
//! content-addressed trees, including:
//! - Compact locator parsing (`github:owner/repo/ref`) and validation
//! - Ref to revision resolution through each forge's API
//! - Archive download and import, keyed by Git tree hash
//! - A fact cache so warm fetches of a revision need no network access
//! - Lock verification against previously recorded tree hashes

pub mod config;
pub mod error;
pub mod facts;
pub mod fetcher;
pub mod forge;
pub mod git;
pub mod hash;
pub mod lock;
pub mod locator;
pub mod registry;
pub mod resolve;
pub mod store;
pub mod transport;

pub use config::{ConfigError, FetchSettings};
pub use error::FetchError;
pub use facts::{FactCache, FactCacheError, JsonFactCache};
pub use fetcher::{last_modified_key, tree_hash_key, DownloadedArchive, Fetcher, OpenError};
pub use forge::{
    DownloadDescriptor, FetchContext, Forge, ForgeKind, GitHub, GitLab, RevisionInfo, SourceHut,
};
pub use git::{CloneTarget, CommandGitClient, GitClient, GitError};
pub use hash::{GitHash, HashParseError};
pub use lock::check_locks;
pub use locator::{Attr, Attrs, Locator};
pub use registry::ForgeRegistry;
pub use resolve::{resolve, Resolved};
pub use store::{DiskTreeStore, StoreError, TarballInfo, TreeAccessor, TreeStore};
pub use transport::{HttpHeader, HttpTransport, Transport, TransportError};
