//! Content-addressed tree store
//!
//! Imported archives are kept as plain directory trees indexed by their Git
//! tree hash:
//!
//! ```text
//! <root>/
//! ├── objects/
//! │   └── <tree-hash>/      # Extracted archive, top-level directory stripped
//! └── tmp/                  # In-progress imports
//! ```

mod tree;

pub use tree::{EntryMode, TreeBuilder};

use crate::hash::GitHash;
use flate2::read::GzDecoder;
use sha1::Digest;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tar::{Archive, EntryType};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error (file operations, or the archive stream failing mid-transfer)
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Entry path escapes the tree or is not UTF-8
    #[error("Unsafe path in archive: {0}")]
    UnsafePath(String),

    /// A path is used both as a file and as a directory
    #[error("Conflicting archive entries at {0}")]
    PathConflict(String),

    /// No tree with this hash in the store
    #[error("Tree not found in store: {0}")]
    TreeNotFound(GitHash),
}

/// Result of importing one archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TarballInfo {
    pub tree_hash: GitHash,
    /// Newest entry mtime, in seconds since the epoch
    pub last_modified: u64,
}

/// Store of imported trees
pub trait TreeStore: Send + Sync {
    fn has_object(&self, tree_hash: &GitHash) -> bool;

    /// Consume a gzip'd tarball stream and store its contents
    fn import_archive(&self, archive: &mut dyn Read) -> Result<TarballInfo, StoreError>;

    fn accessor(&self, tree_hash: &GitHash) -> Result<TreeAccessor, StoreError>;
}

/// Read access to one stored tree
#[derive(Debug, Clone)]
pub struct TreeAccessor {
    root: PathBuf,
    tree_hash: GitHash,
    display: String,
}

impl TreeAccessor {
    pub fn new(root: PathBuf, tree_hash: GitHash) -> Self {
        let display = root.display().to_string();
        Self {
            root,
            tree_hash,
            display,
        }
    }

    /// Label used when printing paths inside this tree
    pub fn set_path_display(&mut self, label: impl Into<String>) {
        self.display = label.into();
    }

    pub fn path_display(&self) -> &str {
        &self.display
    }

    /// `<label>/<relative>` for diagnostics
    pub fn show_path(&self, relative: &str) -> String {
        format!("{}/{}", self.display, relative.trim_start_matches('/'))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tree_hash(&self) -> GitHash {
        self.tree_hash
    }

    pub fn path_exists(&self, relative: &str) -> bool {
        self.resolve(relative)
            .map(|path| path.symlink_metadata().is_ok())
            .unwrap_or(false)
    }

    pub fn read_file(&self, relative: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(relative)?;
        Ok(fs::read(path)?)
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir | Component::RootDir => {}
                _ => return Err(StoreError::UnsafePath(self.show_path(relative))),
            }
        }
        Ok(path)
    }
}

static IMPORT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// [`TreeStore`] on the local filesystem
#[derive(Debug, Clone)]
pub struct DiskTreeStore {
    root: PathBuf,
}

impl DiskTreeStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("tmp"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_path(&self, tree_hash: &GitHash) -> PathBuf {
        self.root.join("objects").join(tree_hash.to_hex())
    }

    /// Evict one tree
    pub fn remove(&self, tree_hash: &GitHash) -> Result<(), StoreError> {
        let path = self.object_path(tree_hash);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        Ok(())
    }

    fn import_dir(&self) -> PathBuf {
        self.root.join("tmp").join(format!(
            "import-{}-{}",
            std::process::id(),
            IMPORT_COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }

    /// Move a finished import into place. Another importer may have won the
    /// race for the same tree; its copy is identical, so ours is dropped.
    fn commit(&self, staging: &Path, tree_hash: &GitHash) -> Result<(), StoreError> {
        let final_dir = self.object_path(tree_hash);
        if final_dir.exists() {
            fs::remove_dir_all(staging)?;
            return Ok(());
        }
        if let Err(e) = fs::rename(staging, &final_dir) {
            if final_dir.exists() {
                fs::remove_dir_all(staging)?;
            } else {
                return Err(e.into());
            }
        }
        Ok(())
    }
}

impl TreeStore for DiskTreeStore {
    fn has_object(&self, tree_hash: &GitHash) -> bool {
        self.object_path(tree_hash).is_dir()
    }

    fn import_archive(&self, archive: &mut dyn Read) -> Result<TarballInfo, StoreError> {
        let staging = self.import_dir();
        fs::create_dir_all(&staging)?;

        let info = match unpack_archive(archive, &staging) {
            Ok(info) => info,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        self.commit(&staging, &info.tree_hash)?;
        debug!("imported tree {} into {}", info.tree_hash, self.root.display());
        Ok(info)
    }

    fn accessor(&self, tree_hash: &GitHash) -> Result<TreeAccessor, StoreError> {
        if !self.has_object(tree_hash) {
            return Err(StoreError::TreeNotFound(*tree_hash));
        }
        Ok(TreeAccessor::new(self.object_path(tree_hash), *tree_hash))
    }
}

/// Extract `archive` into `dest` and compute its tree hash
fn unpack_archive(archive: &mut dyn Read, dest: &Path) -> Result<TarballInfo, StoreError> {
    let mut archive = Archive::new(GzDecoder::new(archive));
    let mut tree = TreeBuilder::new();
    let mut last_modified = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        let raw_path = entry.path()?.into_owned();

        let Some(components) = tree_components(&raw_path, entry_type.is_dir())? else {
            continue;
        };
        if !matches!(
            entry_type,
            EntryType::Regular | EntryType::Continuous | EntryType::Directory | EntryType::Symlink
        ) {
            debug!("skipping archive entry {} of type {:?}", raw_path.display(), entry_type);
            continue;
        }
        last_modified = last_modified.max(entry.header().mtime()?);

        if entry_type.is_dir() {
            tree.insert_dir(&components)?;
            real_dir(dest, &components)?;
            continue;
        }
        let Some((name, parents)) = components.split_last() else {
            continue;
        };
        let target = real_dir(dest, parents)?.join(name);
        clear_leaf(&target, &components)?;

        if entry_type.is_symlink() {
            let link = entry
                .link_name()?
                .ok_or_else(|| StoreError::UnsafePath(raw_path.display().to_string()))?
                .into_owned();
            let link = link
                .to_str()
                .ok_or_else(|| StoreError::UnsafePath(link.display().to_string()))?
                .to_string();
            tree.insert_blob(&components, EntryMode::Symlink, GitHash::of_object("blob", link.as_bytes()))?;
            write_symlink(&link, &target)?;
        } else {
            let mode = if entry.header().mode()? & 0o111 != 0 {
                EntryMode::Executable
            } else {
                EntryMode::File
            };
            let file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)?;
            let mut writer = HashingWriter {
                inner: file,
                hasher: GitHash::object_hasher("blob", entry.size()),
            };
            io::copy(&mut entry, &mut writer)?;
            writer.inner.flush()?;
            set_executable(&target, mode == EntryMode::Executable)?;
            tree.insert_blob(&components, mode, GitHash::from_hasher(writer.hasher))?;
        }
    }

    Ok(TarballInfo {
        tree_hash: tree.hash(),
        last_modified,
    })
}

/// Create the directory `components` below `dest` one level at a time.
/// Existing ancestors must be real directories, not symlinks.
fn real_dir(dest: &Path, components: &[String]) -> Result<PathBuf, StoreError> {
    let mut dir = dest.to_path_buf();
    for (depth, component) in components.iter().enumerate() {
        dir.push(component);
        match fs::symlink_metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(StoreError::PathConflict(components[..=depth].join("/"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir(&dir)?,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(dir)
}

/// Remove a file or symlink left at `target` by an earlier entry with the
/// same path. Directories are a conflict.
fn clear_leaf(target: &Path, components: &[String]) -> Result<(), StoreError> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => Err(StoreError::PathConflict(components.join("/"))),
        Ok(_) => Ok(fs::remove_file(target)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Path components below the archive's top-level directory. `None` for the
/// top-level directory itself.
fn tree_components(path: &Path, is_dir: bool) -> Result<Option<Vec<String>>, StoreError> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| StoreError::UnsafePath(path.display().to_string()))?
                    .to_string(),
            ),
            Component::CurDir => {}
            _ => return Err(StoreError::UnsafePath(path.display().to_string())),
        }
    }
    match parts.len() {
        0 => Ok(None),
        1 if is_dir => Ok(None),
        // A lone top-level file (e.g. `pax_global_header`) stays at the root
        1 => Ok(Some(parts)),
        _ => Ok(Some(parts.split_off(1))),
    }
}

struct HashingWriter<W> {
    inner: W,
    hasher: sha1::Sha1,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(unix)]
fn write_symlink(link: &str, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn write_symlink(link: &str, target: &Path) -> io::Result<()> {
    fs::write(target, link)
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if executable { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> io::Result<()> {
    Ok(())
}
