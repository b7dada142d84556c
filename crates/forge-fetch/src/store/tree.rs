//! Git tree hashing
//!
//! Builds the same tree object ids `git write-tree` would produce for the
//! imported files. Empty directories are dropped, as Git cannot record them.

use super::StoreError;
use crate::hash::GitHash;
use std::collections::BTreeMap;

/// Mode of a non-directory tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    File,
    Executable,
    Symlink,
}

impl EntryMode {
    fn as_git_str(self) -> &'static str {
        match self {
            EntryMode::File => "100644",
            EntryMode::Executable => "100755",
            EntryMode::Symlink => "120000",
        }
    }
}

#[derive(Debug)]
enum Node {
    Blob { mode: EntryMode, hash: GitHash },
    Tree(BTreeMap<String, Node>),
}

/// Accumulates blob entries by path and computes the root tree id
#[derive(Debug, Default)]
pub struct TreeBuilder {
    root: BTreeMap<String, Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file or symlink; a later entry for the same path replaces it
    pub fn insert_blob(
        &mut self,
        path: &[String],
        mode: EntryMode,
        hash: GitHash,
    ) -> Result<(), StoreError> {
        let (name, parents) = path
            .split_last()
            .ok_or_else(|| StoreError::UnsafePath(String::new()))?;
        let dir = self.dir_mut(parents, path)?;
        if matches!(dir.get(name), Some(Node::Tree(_))) {
            return Err(StoreError::PathConflict(path.join("/")));
        }
        dir.insert(name.clone(), Node::Blob { mode, hash });
        Ok(())
    }

    /// Record a directory
    pub fn insert_dir(&mut self, path: &[String]) -> Result<(), StoreError> {
        self.dir_mut(path, path).map(|_| ())
    }

    /// Id of the root tree
    pub fn hash(&self) -> GitHash {
        hash_tree(&self.root).unwrap_or_else(|| GitHash::of_object("tree", b""))
    }

    fn dir_mut(
        &mut self,
        components: &[String],
        full: &[String],
    ) -> Result<&mut BTreeMap<String, Node>, StoreError> {
        let mut dir = &mut self.root;
        for component in components {
            let node = dir
                .entry(component.clone())
                .or_insert_with(|| Node::Tree(BTreeMap::new()));
            dir = match node {
                Node::Tree(children) => children,
                Node::Blob { .. } => return Err(StoreError::PathConflict(full.join("/"))),
            };
        }
        Ok(dir)
    }
}

/// Serialized tree object, or `None` if the tree holds no blobs at any depth
fn serialize_tree(entries: &BTreeMap<String, Node>) -> Option<Vec<u8>> {
    let mut rows: Vec<(String, &'static str, &str, GitHash)> = Vec::new();
    for (name, node) in entries {
        match node {
            Node::Blob { mode, hash } => rows.push((name.clone(), mode.as_git_str(), name, *hash)),
            Node::Tree(children) => {
                if let Some(hash) = hash_tree(children) {
                    // Git orders directories as if their name ended in '/'
                    rows.push((format!("{name}/"), "40000", name, hash));
                }
            }
        }
    }
    if rows.is_empty() {
        return None;
    }
    rows.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let mut content = Vec::new();
    for (_, mode, name, hash) in rows {
        content.extend_from_slice(mode.as_bytes());
        content.push(b' ');
        content.extend_from_slice(name.as_bytes());
        content.push(0);
        content.extend_from_slice(hash.as_bytes());
    }
    Some(content)
}

fn hash_tree(entries: &BTreeMap<String, Node>) -> Option<GitHash> {
    serialize_tree(entries).map(|content| GitHash::of_object("tree", &content))
}
