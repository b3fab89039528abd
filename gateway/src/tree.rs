//! Node Tree and Path Resolver
//! ---------------------------
//!
//! The whole remote namespace lives in one arena, [`Vfs`]. The tree is
//! built exactly once, from backend listings, through [`VfsBuilder`];
//! after [`VfsBuilder::finish`] publishes it, the structure never changes
//! (only per-node fetch state does). Publishing sorts every directory's
//! children by name, which is what makes the binary-search lookup in
//! [`Vfs::lookup_child`] valid. Sorting is a build-time responsibility,
//! never a per-call one.
//!
//! Identifiers: every node gets a protocol-visible `ino`, assigned
//! breadth-first over the sorted tree. The root is always 1 (reserved by
//! the kernel protocol). `ino` values double as open handles, and the
//! arena keeps an explicit `ino` -> slot map so handle resolution is O(1)
//! and independent of build order.

use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::backend::ObjectMeta;
use crate::error::{Error, Result};
use crate::node::{FetchState, Node, NodeId, NodeKind};

/// Identifier of the root directory, fixed by the kernel protocol.
pub const ROOT_INO: u64 = 1;

/// The published, immutable namespace tree.
pub struct Vfs {
    nodes: Vec<Node>,
    index: HashMap<u64, NodeId>,
    root: NodeId,
    uid: u32,
    gid: u32,
}

impl Vfs {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.as_usize()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.as_usize()]
    }

    /// O(1) handle resolution through the identifier table.
    pub fn by_ino(&self, ino: u64) -> Option<NodeId> {
        self.index.get(&ino).copied()
    }

    /// Identity of the mounting process, reported as the owner of every
    /// entry.
    pub fn owner(&self) -> (u32, u32) {
        (self.uid, self.gid)
    }

    pub fn set_owner(&mut self, uid: u32, gid: u32) {
        self.uid = uid;
        self.gid = gid;
    }

    /// Ordered lookup of one name among a directory's children.
    /// Comparison is byte-wise and case-sensitive.
    pub fn lookup_child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        let children = &self.nodes[dir.as_usize()].children;
        children
            .binary_search_by(|id| self.nodes[id.as_usize()].name.as_str().cmp(name))
            .ok()
            .map(|pos| children[pos])
    }

    /// Walks a slash-separated path from the root. Empty segments are
    /// skipped, so repeated slashes are harmless and a path with no
    /// non-empty segments resolves to the root itself.
    pub fn resolve(&self, path: &str) -> Result<NodeId> {
        let mut current = self.root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self
                .lookup_child(current, segment)
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Presented path of a node, for diagnostics.
    pub fn path_of(&self, id: NodeId) -> String {
        format!("/{}", self.join_to_root(id, |node| node.name.as_str()))
    }

    /// Backend key of a node: the original listing segments joined with
    /// `/`. This is what the fetch collaborator receives, since the
    /// kernel-facing protocol does not carry paths past resolution.
    pub fn backend_path(&self, id: NodeId) -> String {
        self.join_to_root(id, |node| node.original_name.as_str())
    }

    fn join_to_root<'a>(&'a self, id: NodeId, field: impl Fn(&'a Node) -> &'a str) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = &self.nodes[id.as_usize()];
            if node.parent.is_some() {
                segments.push(field(node));
            }
            current = node.parent;
        }
        segments.reverse();
        segments.join("/")
    }
}

/// Construction side of [`Vfs`]. Backends insert listings in any order;
/// `finish` sorts, numbers and publishes the tree.
pub struct VfsBuilder {
    nodes: Vec<Node>,
}

impl VfsBuilder {
    pub fn new() -> Self {
        let root = Node {
            name: String::new(),
            original_name: String::new(),
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Directory,
            size: 0,
            ino: 0,
            last_modified: UNIX_EPOCH,
            fetch_state: FetchState::Uninitialized,
        };
        VfsBuilder { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId::new(0)
    }

    /// Adds one directory under `parent`. The backend segment is
    /// sanitized for presentation; a sibling already holding the
    /// sanitized name is disambiguated the same way the listing side of
    /// the backend expects: a colliding file is renamed with a digest
    /// suffix, a colliding directory makes the new directory take the
    /// suffix.
    pub fn add_directory(&mut self, parent: NodeId, meta: &ObjectMeta) -> NodeId {
        let mut name = sanitize_name(&meta.name);
        if let Some(twin) = self.child_by_name(parent, &name) {
            if self.nodes[twin.as_usize()].is_dir() {
                name = format!("{}({})", name, collision_suffix(&meta.name));
            } else {
                let renamed = file_suffixed(&name, &self.nodes[twin.as_usize()].original_name);
                log::warn!(
                    "File {} renamed to {} to make room for a directory",
                    self.nodes[twin.as_usize()].original_name,
                    renamed
                );
                self.nodes[twin.as_usize()].name = renamed;
            }
        }
        if name != meta.name {
            log::warn!("Directory {} presented as {}", meta.name, name);
        }
        self.push_node(parent, name, meta, NodeKind::Directory)
    }

    /// Adds one file under `parent`. A name already taken by any sibling
    /// gets the digest suffix inserted before the extension.
    pub fn add_file(&mut self, parent: NodeId, meta: &ObjectMeta) -> NodeId {
        let mut name = sanitize_name(&meta.name);
        if self.child_by_name(parent, &name).is_some() {
            name = file_suffixed(&name, &meta.name);
        }
        if name != meta.name {
            log::warn!("Object {} presented as {}", meta.name, name);
        }
        self.push_node(parent, name, meta, NodeKind::File)
    }

    /// Expands a full object key (`a/b/c.txt`) under `parent`, creating
    /// the intermediate directories on demand. Keys ending in `/` are
    /// zero-byte directory markers and are dropped. Returns the file
    /// node, or `None` when the key produced no file.
    pub fn add_object_key(&mut self, parent: NodeId, meta: &ObjectMeta) -> Option<NodeId> {
        if meta.name.ends_with('/') {
            return None;
        }
        let segments: Vec<&str> = meta.name.split('/').filter(|s| !s.is_empty()).collect();
        let (basename, dirs) = segments.split_last()?;

        let mut current = parent;
        for segment in dirs {
            current = match self.dir_by_original(current, segment) {
                Some(existing) => existing,
                None => {
                    let dir_meta = ObjectMeta::new(segment.to_string(), 0);
                    self.add_directory(current, &dir_meta)
                }
            };
        }
        let file_meta = ObjectMeta {
            name: basename.to_string(),
            bytes: meta.bytes,
            last_modified: meta.last_modified,
        };
        Some(self.add_file(current, &file_meta))
    }

    /// Publishes the tree: sorts every directory's children, assigns
    /// identifiers breadth-first in sorted order, aggregates directory
    /// sizes and timestamps, and builds the handle index.
    pub fn finish(mut self) -> Vfs {
        for idx in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[idx].children);
            children.sort_by(|a, b| {
                self.nodes[a.as_usize()]
                    .name
                    .cmp(&self.nodes[b.as_usize()].name)
            });
            self.nodes[idx].children = children;
        }

        let root = NodeId::new(0);
        let mut next_ino = ROOT_INO;
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            self.nodes[id.as_usize()].ino = next_ino;
            next_ino += 1;
            queue.extend(self.nodes[id.as_usize()].children.iter().copied());
        }

        aggregate(&mut self.nodes, root);

        let index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.ino, NodeId::new(idx)))
            .collect();

        Vfs {
            nodes: self.nodes,
            index,
            root,
            uid: 0,
            gid: 0,
        }
    }

    fn push_node(
        &mut self,
        parent: NodeId,
        name: String,
        meta: &ObjectMeta,
        kind: NodeKind,
    ) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node {
            name,
            original_name: meta.name.clone(),
            parent: Some(parent),
            children: Vec::new(),
            kind,
            size: meta.bytes,
            ino: 0,
            last_modified: meta
                .last_modified
                .map(SystemTime::from)
                .unwrap_or(UNIX_EPOCH),
            fetch_state: FetchState::Uninitialized,
        });
        self.nodes[parent.as_usize()].children.push(id);
        id
    }

    fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent.as_usize()]
            .children
            .iter()
            .copied()
            .find(|id| self.nodes[id.as_usize()].name == name)
    }

    fn dir_by_original(&self, parent: NodeId, original: &str) -> Option<NodeId> {
        self.nodes[parent.as_usize()]
            .children
            .iter()
            .copied()
            .find(|id| {
                let node = &self.nodes[id.as_usize()];
                node.is_dir() && node.original_name == original
            })
    }
}

impl Default for VfsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Bottom-up pass filling in directory sizes (sum of descendants) and
/// timestamps (newest descendant).
fn aggregate(nodes: &mut Vec<Node>, id: NodeId) -> (u64, SystemTime) {
    let children = nodes[id.as_usize()].children.clone();
    if children.is_empty() {
        let node = &nodes[id.as_usize()];
        return (node.size, node.last_modified);
    }

    let mut total = 0;
    let mut newest = nodes[id.as_usize()].last_modified;
    for child in children {
        let (size, modified) = aggregate(nodes, child);
        total += size;
        if modified > newest {
            newest = modified;
        }
    }
    let node = &mut nodes[id.as_usize()];
    node.size = total;
    node.last_modified = newest;
    (total, newest)
}

/// Replaces characters that would interfere with path structure.
fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '#' | '%' | '$' | '+' | '|' | '@' | ':' | '&' | '!' | '?' | '<' | '>' | '\''
            | '"' => '_',
            other => other,
        })
        .collect()
}

/// First six hex characters of the SHA-256 of the original name; stable
/// across rebuilds of the same listing.
fn collision_suffix(original: &str) -> String {
    let digest = Sha256::digest(original.as_bytes());
    digest[..3].iter().map(|b| format!("{b:02x}")).collect()
}

/// Inserts the digest suffix before the first extension:
/// `report.tar.gz` becomes `report(1a2b3c).tar.gz`.
fn file_suffixed(name: &str, original: &str) -> String {
    let suffix = collision_suffix(original);
    match name.split_once('.') {
        Some((stem, ext)) => format!("{stem}({suffix}).{ext}"),
        None => format!("{name}({suffix})"),
    }
}
