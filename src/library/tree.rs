//! Builds the per-torrent `<network>/{f,i}` tree from a `Library`'s
//! file list: `i/` is a flat by-index view keyed on each file's
//! position in the original list (padding entries skipped, leaving
//! gaps); `f/` mirrors the torrent's own directory structure, with
//! leaves as relative symlinks back into `i/` and any path that
//! collides with another file's path or an implied directory name
//! omitted entirely.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::vfs::node::{Dir, Node};
use crate::vfs::{DictDir, StaticDir, Symlink, SymlinkTarget};

use super::{FileEntry, Library, Libraries, Opener, TorrentFile};

pub(super) fn build_torrent_dir(info_hash: String, libraries: Arc<Libraries>, opener: Arc<dyn Opener>) -> Arc<dyn Dir> {
    DictDir::new(move |_self_ref| {
        libraries
            .networks_for(&info_hash)
            .into_iter()
            .filter_map(|network| {
                let library = libraries.get(&network)?;
                let dir = build_network_dir(info_hash.clone(), library, opener.clone());
                Some((network, Node::Dir(dir)))
            })
            .collect()
    })
}

fn build_network_dir(info_hash: String, library: Arc<dyn Library>, opener: Arc<dyn Opener>) -> Arc<dyn Dir> {
    DictDir::new(move |_self_ref| {
        let files = match library.files(&info_hash) {
            Some(files) => files,
            None => return Vec::new(),
        };
        let by_path = build_by_path_dir(&files);
        let by_index = build_by_index_dir(files, info_hash.clone(), library.clone(), opener.clone());
        vec![("f".to_string(), Node::Dir(by_path)), ("i".to_string(), Node::Dir(by_index))]
    })
}

fn build_by_index_dir(files: Vec<FileEntry>, info_hash: String, library: Arc<dyn Library>, opener: Arc<dyn Opener>) -> Arc<dyn Dir> {
    DictDir::new(move |_self_ref| {
        files
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_padding)
            .map(|(idx, f)| {
                let tfile = TorrentFile::new(info_hash.clone(), f.start, f.stop, opener.clone(), library.clone());
                (idx.to_string(), Node::File(tfile))
            })
            .collect()
    })
}

fn is_valid_path(path: &[String]) -> bool {
    !path.is_empty()
        && path
            .iter()
            .all(|c| !c.is_empty() && c != "." && c != ".." && !c.contains('/') && !c.contains('\0'))
}

enum TrieNode {
    Dir(HashMap<String, TrieNode>),
    Leaf(usize),
}

fn insert_path(trie: &mut HashMap<String, TrieNode>, path: &[String], idx: usize) {
    if path.len() == 1 {
        trie.insert(path[0].clone(), TrieNode::Leaf(idx));
        return;
    }
    let entry = trie
        .entry(path[0].clone())
        .or_insert_with(|| TrieNode::Dir(HashMap::new()));
    if let TrieNode::Dir(sub) = entry {
        insert_path(sub, &path[1..], idx);
    }
}

fn build_dir_from_trie(trie: &HashMap<String, TrieNode>, depth: usize) -> Arc<dyn Dir> {
    let dir = StaticDir::new();
    for (name, node) in trie {
        match node {
            TrieNode::Leaf(idx) => {
                let target = format!("{}i/{}", "../".repeat(depth + 1), idx);
                dir.mkchild(name, Node::Symlink(Symlink::with_target(SymlinkTarget::Path(target))));
            }
            TrieNode::Dir(sub) => {
                dir.mkchild(name, Node::Dir(build_dir_from_trie(sub, depth + 1)));
            }
        }
    }
    dir
}

/// The indices (into the original file list) whose paths collide with
/// another file's exact path, or with an ancestor-directory path
/// implied by another file.
fn conflicted_indices(candidates: &[(usize, Vec<String>)]) -> HashSet<usize> {
    let mut conflicted = HashSet::new();

    let mut by_full_path: HashMap<&Vec<String>, Vec<usize>> = HashMap::new();
    for (idx, path) in candidates {
        by_full_path.entry(path).or_default().push(*idx);
    }
    for idxs in by_full_path.values() {
        if idxs.len() > 1 {
            conflicted.extend(idxs.iter().copied());
        }
    }

    for (idx_a, path_a) in candidates {
        for (idx_b, path_b) in candidates {
            if idx_a == idx_b {
                continue;
            }
            if path_a.len() < path_b.len() && path_b.starts_with(path_a.as_slice()) {
                conflicted.insert(*idx_a);
                conflicted.insert(*idx_b);
            }
        }
    }

    conflicted
}

fn build_by_path_dir(files: &[FileEntry]) -> Arc<dyn Dir> {
    let candidates: Vec<(usize, Vec<String>)> = files
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.is_padding && is_valid_path(&f.path))
        .map(|(idx, f)| (idx, f.path.clone()))
        .collect();

    let conflicted = conflicted_indices(&candidates);

    let mut trie: HashMap<String, TrieNode> = HashMap::new();
    for (idx, path) in &candidates {
        if !conflicted.contains(idx) {
            insert_path(&mut trie, path, *idx);
        }
    }
    build_dir_from_trie(&trie, 0)
}
