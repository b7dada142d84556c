//! Fetch orchestration
//!
//! [`Fetcher`] ties the forge registry to its collaborators and implements
//! the fetch protocol:
//!
//! 1. Pin the locator to a revision, resolving its ref if needed.
//! 2. Look up `git-rev-to-tree-hash-<rev>` and `git-rev-to-last-modified-<rev>`
//!    in the fact cache. If both are known and the tree is still in the store,
//!    nothing is downloaded.
//! 3. Otherwise stream the forge archive into the store and record both facts.
//! 4. If the forge reported a tree hash for the revision and it differs from
//!    the imported one, warn. Archives and commit metadata can legitimately
//!    disagree when submodules are involved.
//!
//! Cache keys only use the revision: a revision id is treated as naming the
//! same content on every forge and mirror.

use crate::config::FetchSettings;
use crate::error::FetchError;
use crate::facts::{FactCache, FactCacheError, JsonFactCache};
use crate::forge::FetchContext;
use crate::git::{CommandGitClient, GitClient};
use crate::hash::GitHash;
use crate::lock;
use crate::locator::{Attrs, Locator};
use crate::registry::ForgeRegistry;
use crate::resolve::resolve;
use crate::store::{DiskTreeStore, StoreError, TarballInfo, TreeAccessor, TreeStore};
use crate::transport::{HttpTransport, Transport, TransportError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while setting up the default collaborators
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to create HTTP client: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to open tree store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to open fact cache: {0}")]
    Facts(#[from] FactCacheError),
}

/// Fact key for the tree hash of `rev`
pub fn tree_hash_key(rev: &GitHash) -> String {
    format!("git-rev-to-tree-hash-{rev}")
}

/// Fact key for the last modification time of `rev`
pub fn last_modified_key(rev: &GitHash) -> String {
    format!("git-rev-to-last-modified-{rev}")
}

/// Outcome of [`Fetcher::download_archive`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArchive {
    /// Pinned locator carrying `treeHash` and `lastModified`
    pub locator: Locator,
    pub tarball: TarballInfo,
    /// Tree hash the forge reported while resolving the ref
    pub upstream_tree_hash: Option<GitHash>,
    /// True if the tree was already stored and nothing was downloaded
    pub cache_hit: bool,
}

pub struct Fetcher {
    registry: ForgeRegistry,
    settings: FetchSettings,
    transport: Arc<dyn Transport>,
    store: Arc<dyn TreeStore>,
    facts: Arc<dyn FactCache>,
    git: Arc<dyn GitClient>,
}

impl Fetcher {
    pub fn new(
        registry: ForgeRegistry,
        settings: FetchSettings,
        transport: Arc<dyn Transport>,
        store: Arc<dyn TreeStore>,
        facts: Arc<dyn FactCache>,
    ) -> Self {
        Self {
            registry,
            settings,
            transport,
            store,
            facts,
            git: Arc::new(CommandGitClient),
        }
    }

    /// Replace the git client used by [`Fetcher::clone`]
    pub fn with_git_client(mut self, git: Arc<dyn GitClient>) -> Self {
        self.git = git;
        self
    }

    /// Built-in forges over HTTP, with the store and fact cache under the
    /// configured cache directory
    pub fn from_settings(settings: FetchSettings) -> Result<Self, OpenError> {
        let cache_dir = settings.cache_dir();
        let transport = HttpTransport::new(&settings)?;
        let store = DiskTreeStore::open(cache_dir.join("trees"))?;
        let facts = JsonFactCache::open(cache_dir.join("facts.json"))?;

        Ok(Self::new(
            ForgeRegistry::builtin(),
            settings,
            Arc::new(transport),
            Arc::new(store),
            Arc::new(facts),
        ))
    }

    pub fn registry(&self) -> &ForgeRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn parse_from_url(&self, url: &str) -> Result<Locator, FetchError> {
        self.registry.parse(url)
    }

    pub fn from_attrs(&self, attrs: Attrs) -> Result<Locator, FetchError> {
        self.registry.from_attrs(attrs)
    }

    pub fn to_url(&self, locator: &Locator) -> String {
        locator.to_url()
    }

    pub fn apply_overrides(
        &self,
        locator: &Locator,
        reference: Option<&str>,
        rev: Option<GitHash>,
    ) -> Result<Locator, FetchError> {
        locator.apply_overrides(reference, rev)
    }

    pub fn is_locked(&self, locator: &Locator) -> bool {
        locator.is_locked()
    }

    pub fn check_locks(&self, specified: &Locator, final_locator: &Locator) -> Result<(), FetchError> {
        lock::check_locks(specified, final_locator)
    }

    fn context(&self) -> FetchContext<'_> {
        FetchContext {
            transport: self.transport.as_ref(),
            settings: &self.settings,
        }
    }

    /// Previously recorded facts for `rev`; anything missing or unreadable is
    /// a miss
    fn cached_tarball_info(&self, rev: &GitHash) -> Option<TarballInfo> {
        let tree_hash = self.facts.query_fact(&tree_hash_key(rev))?;
        let last_modified = self.facts.query_fact(&last_modified_key(rev))?;
        match (GitHash::parse(&tree_hash), last_modified.parse::<u64>()) {
            (Ok(tree_hash), Ok(last_modified)) => Some(TarballInfo {
                tree_hash,
                last_modified,
            }),
            _ => {
                debug!("ignoring unreadable cached facts for revision {}", rev);
                None
            }
        }
    }

    /// Make the tree of `locator` available in the store
    pub fn download_archive(&self, locator: &Locator) -> Result<DownloadedArchive, FetchError> {
        let forge = self.registry.forge_for(locator)?;
        let cx = self.context();
        let resolved = resolve(forge, cx, locator)?;
        let rev = resolved.rev;
        let input = resolved.locator.to_string();

        if let Some(tarball) = self.cached_tarball_info(&rev) {
            if self.store.has_object(&tarball.tree_hash) {
                debug!("using cached tree {} for revision {}", tarball.tree_hash, rev);
                return Ok(DownloadedArchive {
                    locator: resolved.locator.with_tarball_info(&tarball),
                    tarball,
                    upstream_tree_hash: resolved.upstream_tree_hash,
                    cache_hit: true,
                });
            }
            debug!(
                "tree {} for revision {} is no longer in the store, fetching it again",
                tarball.tree_hash, rev
            );
        }

        let descriptor = forge.download_url(cx, &resolved.locator)?;
        debug!("downloading '{}' from {}", input, descriptor.url);
        let mut body = self
            .transport
            .fetch(&descriptor.url, &descriptor.headers)
            .map_err(|source| FetchError::Transport {
                input: input.clone(),
                source,
            })?;
        let tarball = self
            .store
            .import_archive(&mut body)
            .map_err(|source| FetchError::Store {
                input: input.clone(),
                source,
            })?;

        self.facts
            .upsert_fact(&tree_hash_key(&rev), &tarball.tree_hash.to_hex())?;
        self.facts
            .upsert_fact(&last_modified_key(&rev), &tarball.last_modified.to_string())?;

        if let Some(upstream) = resolved.upstream_tree_hash {
            if upstream != tarball.tree_hash {
                warn!(
                    "Git tree hash mismatch for revision '{}' of '{}': upstream tree hash is '{}', but the archive has '{}'. \
                     This can happen if the repository uses submodules, which archives do not include.",
                    rev, input, upstream, tarball.tree_hash
                );
            }
        }

        Ok(DownloadedArchive {
            locator: resolved.locator.with_tarball_info(&tarball),
            tarball,
            upstream_tree_hash: resolved.upstream_tree_hash,
            cache_hit: false,
        })
    }

    /// Fetch `locator` and open its tree. Returns the accessor together with
    /// the final, pinned locator.
    pub fn get_accessor(&self, locator: &Locator) -> Result<(TreeAccessor, Locator), FetchError> {
        let archive = self.download_archive(locator)?;
        let mut accessor = self
            .store
            .accessor(&archive.tarball.tree_hash)
            .map_err(|source| FetchError::Store {
                input: archive.locator.to_string(),
                source,
            })?;
        accessor.set_path_display(format!("«{}»", archive.locator));
        Ok((accessor, archive.locator))
    }

    /// Clone the repository with git instead of downloading an archive
    pub fn clone(&self, locator: &Locator, dest: &Path) -> Result<(), FetchError> {
        let forge = self.registry.forge_for(locator)?;
        forge.clone_into(self.git.as_ref(), locator, dest)
    }
}
