//! Concrete `Dir` implementations: `StaticDir` (preloaded, ordered)
//! and `DictDir` (computed lazily from a closure each call).

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::error::{Result, TorrentFtpError};
use crate::vfs::node::{Dir, Dirent, Node, NodeMeta};

/// A directory whose children are fixed at construction time via
/// repeated calls to `mkchild`. Children are never removed or
/// reordered once added — callers build the whole subtree and then
/// publish it by sharing the `Arc<StaticDir>`, matching the VFS-wide
/// build-then-publish discipline (no `mkchild` call happens
/// concurrently with traversal of an already-published tree).
pub struct StaticDir {
    meta: NodeMeta,
    children: Mutex<IndexMap<String, Node>>,
}

impl StaticDir {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            meta: NodeMeta::new(),
            children: Mutex::new(IndexMap::new()),
        })
    }

    /// Add `child` under `name`, adopting it (setting its name/parent).
    /// `self` must already be held behind an `Arc` so the child can
    /// take a weak reference back to it.
    pub fn mkchild(self: &Arc<Self>, name: &str, child: Node) {
        let parent: Arc<dyn Dir> = self.clone();
        match &child {
            Node::Dir(d) => d.meta().adopt(name, &parent),
            Node::File(f) => f.meta().adopt(name, &parent),
            Node::Symlink(s) => s.meta().adopt(name, &parent),
        }
        self.children.lock().unwrap().insert(name.to_string(), child);
    }
}

impl Dir for StaticDir {
    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn readdir(&self) -> Result<Vec<Dirent>> {
        Ok(self
            .children
            .lock()
            .unwrap()
            .iter()
            .map(|(name, node)| Dirent {
                name: name.clone(),
                stat: node.stat(),
            })
            .collect())
    }

    fn lookup(&self, name: &str) -> Result<Node> {
        self.children
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or(TorrentFtpError::NotFound)
    }
}

/// A directory whose children are computed on demand from a closure,
/// rather than stored. Used for per-torrent views (by-path, by-index)
/// whose contents are cheap to derive from the torrent's own metadata
/// and would otherwise duplicate it in a second, stateful structure.
///
/// The closure receives the `DictDir` itself as `&Arc<dyn Dir>` so it
/// can adopt (set name/parent on) each node it returns; it is expected
/// to be cheap and side-effect free, and may be called more than once
/// per logical listing.
pub struct DictDir {
    meta: NodeMeta,
    get_dict: Box<dyn Fn(&Arc<dyn Dir>) -> Vec<(String, Node)> + Send + Sync>,
    self_ref: Mutex<Option<Arc<dyn Dir>>>,
}

impl DictDir {
    pub fn new<F>(get_dict: F) -> Arc<Self>
    where
        F: Fn(&Arc<dyn Dir>) -> Vec<(String, Node)> + Send + Sync + 'static,
    {
        let dir = Arc::new(Self {
            meta: NodeMeta::new(),
            get_dict: Box::new(get_dict),
            self_ref: Mutex::new(None),
        });
        let as_dir: Arc<dyn Dir> = dir.clone();
        *dir.self_ref.lock().unwrap() = Some(as_dir);
        dir
    }

    fn entries(&self) -> Vec<(String, Node)> {
        let self_ref = self.self_ref.lock().unwrap().clone().expect("DictDir always initialized via new()");
        let entries = (self.get_dict)(&self_ref);
        for (name, node) in &entries {
            match node {
                Node::Dir(d) => d.meta().adopt(name, &self_ref),
                Node::File(f) => f.meta().adopt(name, &self_ref),
                Node::Symlink(s) => s.meta().adopt(name, &self_ref),
            }
        }
        entries
    }
}

impl Dir for DictDir {
    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn readdir(&self) -> Result<Vec<Dirent>> {
        Ok(self
            .entries()
            .into_iter()
            .map(|(name, node)| Dirent {
                name,
                stat: node.stat(),
            })
            .collect())
    }

    fn lookup(&self, name: &str) -> Result<Node> {
        self.entries()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
            .ok_or(TorrentFtpError::NotFound)
    }
}
