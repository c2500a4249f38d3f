//! The node model: `Dir`, file, and symlink nodes joined by a common
//! `Node` handle, plus path traversal (`traverse`, `realpath`) and
//! symlink resolution.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use crate::error::{Result, TorrentFtpError};

/// The discriminant carried by `Stat::filetype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
}

/// POSIX-ish metadata returned by `Node::stat`.
#[derive(Debug, Clone)]
pub struct Stat {
    pub filetype: FileType,
    pub size: u64,
    pub mtime: Option<i64>,
}

/// One entry in a directory listing.
#[derive(Debug, Clone)]
pub struct Dirent {
    pub name: String,
    pub stat: Stat,
}

/// A stream opened for reading a file node. `TorrentIO` (see
/// `crate::torrent_io`) is the production implementation; tests use
/// plain in-memory byte buffers.
pub trait ReadStream: std::io::Read + Send + Sync {}
impl<T: std::io::Read + Send + Sync> ReadStream for T {}

/// Capability shared by every directory implementation: list children,
/// look one up by name, and report directory metadata.
///
/// `StaticDir` preloads an ordered name -> child map; `DictDir`
/// computes its children lazily from a closure each time it is asked.
/// Both share the same `NodeMeta` bookkeeping via `meta()`.
pub trait Dir: Send + Sync {
    fn meta(&self) -> &NodeMeta;
    fn readdir(&self) -> Result<Vec<Dirent>>;
    fn lookup(&self, name: &str) -> Result<Node>;

    fn stat(&self) -> Stat {
        Stat {
            filetype: FileType::Directory,
            size: 0,
            mtime: None,
        }
    }
}

/// Capability shared by every regular-file implementation.
pub trait FileNode: Send + Sync {
    fn meta(&self) -> &NodeMeta;
    fn size(&self) -> u64;
    fn mtime(&self) -> Option<i64>;
    fn open(&self) -> Result<Box<dyn ReadStream>>;

    fn stat(&self) -> Stat {
        Stat {
            filetype: FileType::Regular,
            size: self.size(),
            mtime: self.mtime(),
        }
    }
}

/// What a symlink resolves to: either a node reached by reference
/// (identity-based) or a path string re-parsed relative to the
/// symlink's parent directory.
pub enum SymlinkTarget {
    Node(Node),
    Path(String),
}

/// A symlink node. `target` is mutable only during tree construction
/// (see `Symlink::set_target`), never concurrently with traversal,
/// matching the build-then-publish discipline the whole VFS relies on.
pub struct Symlink {
    meta: NodeMeta,
    target: Mutex<Option<SymlinkTarget>>,
}

impl Symlink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            meta: NodeMeta::new(),
            target: Mutex::new(None),
        })
    }

    pub fn with_target(target: SymlinkTarget) -> Arc<Self> {
        Arc::new(Self {
            meta: NodeMeta::new(),
            target: Mutex::new(Some(target)),
        })
    }

    pub fn set_target(&self, target: SymlinkTarget) {
        *self.target.lock().unwrap() = Some(target);
    }

    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn target_snapshot(&self) -> Option<SymlinkTarget> {
        self.target.lock().unwrap().clone()
    }

    pub fn stat(&self) -> Stat {
        Stat {
            filetype: FileType::Symlink,
            size: 0,
            mtime: None,
        }
    }

    /// Resolve this symlink's target to a path string, relative to its
    /// own parent directory. For a node target, this is the relative
    /// path from the parent to the target's absolute location; for a
    /// string target, the string itself. Fails with `InvalidSymlink`
    /// if there is no target.
    pub fn readlink(&self) -> Result<String> {
        match self.target_snapshot() {
            None => Err(TorrentFtpError::InvalidSymlink),
            Some(SymlinkTarget::Path(p)) => Ok(p),
            Some(SymlinkTarget::Node(target)) => {
                let parent = self
                    .meta
                    .parent()
                    .ok_or(TorrentFtpError::InvalidSymlink)?;
                let from_abs = Node::Dir(parent).absolute_path();
                let to_abs = target.absolute_path();
                Ok(relative_path_between(&from_abs, &to_abs))
            }
        }
    }
}

impl Clone for SymlinkTarget {
    fn clone(&self) -> Self {
        match self {
            SymlinkTarget::Node(n) => SymlinkTarget::Node(n.clone()),
            SymlinkTarget::Path(p) => SymlinkTarget::Path(p.clone()),
        }
    }
}

/// Fields common to every node: its name as seen in its parent's
/// listing, and a non-owning reference to that parent. Both are set
/// once, at the point the node is adopted into a directory
/// (`StaticDir::mkchild`), and never change afterward.
pub struct NodeMeta {
    name: Mutex<Option<String>>,
    parent: Mutex<Option<Weak<dyn Dir>>>,
}

impl NodeMeta {
    pub fn new() -> Self {
        Self {
            name: Mutex::new(None),
            parent: Mutex::new(None),
        }
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().unwrap().clone()
    }

    pub fn parent(&self) -> Option<Arc<dyn Dir>> {
        self.parent.lock().unwrap().as_ref().and_then(Weak::upgrade)
    }

    /// Adopt this node under `parent` with the given `name`. Called
    /// exactly once per node, by the directory that owns it.
    pub fn adopt(&self, name: &str, parent: &Arc<dyn Dir>) {
        *self.name.lock().unwrap() = Some(name.to_string());
        *self.parent.lock().unwrap() = Some(Arc::downgrade(parent));
    }
}

impl Default for NodeMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle to any node in the tree. Cheap to clone (an `Arc` bump);
/// equality is by identity via `Node::ptr_eq`, never by path.
#[derive(Clone)]
pub enum Node {
    Dir(Arc<dyn Dir>),
    File(Arc<dyn FileNode>),
    Symlink(Arc<Symlink>),
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Node::File(_))
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Node::Symlink(_))
    }

    pub fn name(&self) -> Option<String> {
        match self {
            Node::Dir(d) => d.meta().name(),
            Node::File(f) => f.meta().name(),
            Node::Symlink(s) => s.meta().name(),
        }
    }

    pub fn parent(&self) -> Option<Arc<dyn Dir>> {
        match self {
            Node::Dir(d) => d.meta().parent(),
            Node::File(f) => f.meta().parent(),
            Node::Symlink(s) => s.meta().parent(),
        }
    }

    pub fn stat(&self) -> Stat {
        match self {
            Node::Dir(d) => d.stat(),
            Node::File(f) => f.stat(),
            Node::Symlink(s) => s.stat(),
        }
    }

    pub fn as_dir(&self) -> Result<Arc<dyn Dir>> {
        match self {
            Node::Dir(d) => Ok(d.clone()),
            _ => Err(TorrentFtpError::NotADirectory),
        }
    }

    pub fn as_file(&self) -> Result<Arc<dyn FileNode>> {
        match self {
            Node::File(f) => Ok(f.clone()),
            Node::Dir(_) => Err(TorrentFtpError::IsADirectory),
            Node::Symlink(_) => Err(TorrentFtpError::InvalidSymlink),
        }
    }

    pub fn as_symlink(&self) -> Result<Arc<Symlink>> {
        match self {
            Node::Symlink(s) => Ok(s.clone()),
            _ => Err(TorrentFtpError::InvalidSymlink),
        }
    }

    pub fn readdir(&self) -> Result<Vec<Dirent>> {
        self.as_dir()?.readdir()
    }

    pub fn lookup(&self, name: &str) -> Result<Node> {
        self.as_dir()?.lookup(name)
    }

    pub fn open(&self) -> Result<Box<dyn ReadStream>> {
        self.as_file()?.open()
    }

    pub fn readlink(&self) -> Result<String> {
        self.as_symlink()?.readlink()
    }

    /// Identity comparison: two `Node`s are equal iff they point at the
    /// same underlying allocation.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Dir(a), Node::Dir(b)) => Arc::ptr_eq(a, b),
            (Node::File(a), Node::File(b)) => Arc::ptr_eq(a, b),
            (Node::Symlink(a), Node::Symlink(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Walk `parent` links to the first node with no parent.
    pub fn get_root(&self) -> Node {
        let mut cur = self.clone();
        loop {
            match cur.parent() {
                Some(p) => cur = Node::Dir(p),
                None => return cur,
            }
        }
    }

    /// The absolute, normalized path from the root to this node,
    /// computed by walking parent pointers. A root node's path is `/`.
    pub fn absolute_path(&self) -> String {
        let mut parts = Vec::new();
        let mut cur = self.clone();
        loop {
            match cur.parent() {
                Some(p) => {
                    if let Some(name) = cur.name() {
                        parts.push(name);
                    }
                    cur = Node::Dir(p);
                }
                None => break,
            }
        }
        parts.reverse();
        if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        }
    }

    /// Resolve `path` starting from `self`, applying the traversal
    /// rules in order: split on `/`, rebase at root on a leading `/`,
    /// skip empty/`.` components, `..` moves to parent (staying at
    /// root if already there), and every other component is a
    /// `lookup`. Symlinks are followed when `follow_symlinks` is true,
    /// or whenever they are not the final component — intermediate
    /// symlinks always follow regardless of the flag.
    pub fn traverse(&self, path: &str, follow_symlinks: bool) -> Result<Node> {
        let components = normalize_components(path);
        let mut cur = if path.starts_with('/') {
            self.get_root()
        } else {
            self.clone()
        };
        let n = components.len();
        for (i, comp) in components.iter().enumerate() {
            let is_last = i + 1 == n;
            if comp == ".." {
                cur = match cur.parent() {
                    Some(p) => Node::Dir(p),
                    None => cur,
                };
                continue;
            }
            let dir = cur.as_dir()?;
            let mut child = dir.lookup(comp)?;
            let mut visited: HashSet<usize> = HashSet::new();
            loop {
                let sl = match &child {
                    Node::Symlink(sl) => sl.clone(),
                    _ => break,
                };
                if !follow_symlinks && is_last {
                    break;
                }
                let key = Arc::as_ptr(&sl) as *const () as usize;
                if !visited.insert(key) {
                    return Err(TorrentFtpError::SymlinkLoop);
                }
                let target = sl
                    .target_snapshot()
                    .ok_or(TorrentFtpError::InvalidSymlink)?;
                child = match target {
                    SymlinkTarget::Node(n) => n,
                    SymlinkTarget::Path(p) => {
                        let base = Node::Dir(
                            sl.meta().parent().ok_or(TorrentFtpError::InvalidSymlink)?,
                        );
                        base.traverse(&p, true)?
                    }
                };
            }
            cur = child;
        }
        Ok(cur)
    }

    /// Resolve as much of `path` as possible without ever failing.
    /// Unlike `traverse`, an unresolvable final component (missing
    /// child, symlink loop, or dangling symlink) is not an error: the
    /// remaining unresolved components are appended, as a relative
    /// path, to the last node that *was* resolved.
    pub fn realpath(&self, path: &str) -> String {
        let components = normalize_components(path);
        let mut cur = if path.starts_with('/') {
            self.get_root()
        } else {
            self.clone()
        };
        let mut iter = components.into_iter().peekable();
        while let Some(comp) = iter.next() {
            if comp == ".." {
                if let Some(p) = cur.parent() {
                    cur = Node::Dir(p);
                }
                continue;
            }
            let dir = match cur.as_dir() {
                Ok(d) => d,
                Err(_) => return bail_with_remaining(&cur, comp, iter),
            };
            let mut child = match dir.lookup(&comp) {
                Ok(c) => c,
                Err(_) => return bail_with_remaining(&cur, comp, iter),
            };
            let mut visited: HashSet<usize> = HashSet::new();
            loop {
                let sl = match &child {
                    Node::Symlink(sl) => sl.clone(),
                    _ => break,
                };
                let key = Arc::as_ptr(&sl) as *const () as usize;
                if !visited.insert(key) {
                    return bail_with_remaining(&cur, comp, iter);
                }
                let target = match sl.target_snapshot() {
                    Some(t) => t,
                    None => return bail_with_remaining(&cur, comp, iter),
                };
                child = match target {
                    SymlinkTarget::Node(n) => n,
                    SymlinkTarget::Path(p) => {
                        let base = match sl.meta().parent() {
                            Some(parent) => Node::Dir(parent),
                            None => return bail_with_remaining(&cur, comp, iter),
                        };
                        match base.traverse(&p, true) {
                            Ok(n) => n,
                            Err(_) => return bail_with_remaining(&cur, comp, iter),
                        }
                    }
                };
            }
            cur = child;
        }
        cur.absolute_path()
    }
}

fn bail_with_remaining(
    cur: &Node,
    comp: String,
    rest: std::iter::Peekable<std::vec::IntoIter<String>>,
) -> String {
    let mut remaining = vec![comp];
    remaining.extend(rest);
    let base = cur.absolute_path();
    if base == "/" {
        format!("/{}", remaining.join("/"))
    } else {
        format!("{}/{}", base, remaining.join("/"))
    }
}

/// Split a path on `/`, dropping empty components and `.`. Does not
/// interpret a leading `/` (callers check that separately to decide
/// whether to rebase at the root).
fn normalize_components(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .map(|c| c.to_string())
        .collect()
}

/// The relative path from directory `from_abs` to target `to_abs`,
/// computed from their common prefix: one `..` per extra component of
/// `from_abs`, followed by the suffix of `to_abs`.
fn relative_path_between(from_abs: &str, to_abs: &str) -> String {
    let from_parts: Vec<&str> = from_abs
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let to_parts: Vec<&str> = to_abs
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let ups = from_parts.len() - common;
    let mut comps: Vec<String> = (0..ups).map(|_| "..".to_string()).collect();
    comps.extend(to_parts[common..].iter().map(|s| s.to_string()));
    if comps.is_empty() {
        ".".to_string()
    } else {
        comps.join("/")
    }
}
