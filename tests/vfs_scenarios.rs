//! Integration coverage for VFS traversal and path-resolution scenarios.

use std::sync::Arc;

use proptest::prelude::*;

use torrent_ftpd::vfs::node::{FileNode, NodeMeta, ReadStream};
use torrent_ftpd::vfs::{Node, StaticDir, Symlink, SymlinkTarget};

struct TestFile(NodeMeta);

impl TestFile {
    fn new() -> Arc<Self> {
        Arc::new(Self(NodeMeta::new()))
    }
}

impl FileNode for TestFile {
    fn meta(&self) -> &NodeMeta {
        &self.0
    }
    fn size(&self) -> u64 {
        0
    }
    fn mtime(&self) -> Option<i64> {
        None
    }
    fn open(&self) -> torrent_ftpd::error::Result<Box<dyn ReadStream>> {
        Ok(Box::new(std::io::empty()))
    }
}

fn build_tree() -> Node {
    let root = StaticDir::new();
    let directory = StaticDir::new();

    directory.mkchild("file", Node::File(TestFile::new()));
    directory.mkchild(
        "symlink",
        Node::Symlink(Symlink::with_target(SymlinkTarget::Path("file".to_string()))),
    );
    directory.mkchild(
        "loop_symlink",
        Node::Symlink({
            let link = Symlink::new();
            link.set_target(SymlinkTarget::Node(Node::Symlink(link.clone())));
            link
        }),
    );

    root.mkchild("directory", Node::Dir(directory));
    Node::Dir(root)
}

#[test]
fn s1_vfs_traversal() {
    let root = build_tree();

    let file = root.traverse("directory/file", true).unwrap();
    assert!(file.is_file());

    let through_symlink = root.traverse("directory/symlink", true).unwrap();
    assert!(through_symlink.ptr_eq(&file));

    let symlink_itself = root.traverse("directory/symlink", false).unwrap();
    assert!(symlink_itself.is_link());

    assert!(root.traverse("directory/loop_symlink", true).is_err());
}

#[test]
fn s2_realpath() {
    let root = build_tree();

    assert_eq!(root.realpath(""), "/");
    assert_eq!(root.realpath("does/not/exist"), "/does/not/exist");
    assert_eq!(root.realpath("directory/symlink/a"), "/directory/file/a");
    assert_eq!(root.realpath("loop_symlink/a"), "/loop_symlink/a");
}

fn nested_tree(depth: usize) -> (Node, String) {
    let leaf = StaticDir::new();
    leaf.mkchild("leaf", Node::File(TestFile::new()));
    let mut current = Node::Dir(leaf);
    for _ in 0..depth {
        let dir = StaticDir::new();
        dir.mkchild("child", current);
        current = Node::Dir(dir);
    }
    let mut path = "child/".repeat(depth);
    path.push_str("leaf");
    (current, path)
}

proptest! {
    /// Invariant 1: re-traversing a node's own absolute path returns
    /// the same node, for any depth reachable without a leading `..`.
    #[test]
    fn invariant_traverse_absolute_path_round_trips(depth in 0usize..12) {
        let (root, path) = nested_tree(depth);
        let found = root.traverse(&path, true).unwrap();
        let again = root.traverse(&found.absolute_path(), true).unwrap();
        prop_assert!(found.ptr_eq(&again));
    }

    /// Invariant 2: a symlink cycle of any length fails under
    /// `traverse(follow=true)`, but `realpath` never errors on one.
    #[test]
    fn invariant_symlink_cycles_fail_traverse_not_realpath(cycle_len in 1usize..8) {
        let root = StaticDir::new();
        let mut links = Vec::new();
        for _ in 0..cycle_len {
            links.push(Symlink::new());
        }
        for i in 0..cycle_len {
            let next = links[(i + 1) % cycle_len].clone();
            links[i].set_target(SymlinkTarget::Node(Node::Symlink(next)));
        }
        for (i, link) in links.iter().enumerate() {
            root.mkchild(&format!("link-{i}"), Node::Symlink(link.clone()));
        }
        let root_node = Node::Dir(root);

        let name = "link-0";
        prop_assert!(root_node.traverse(name, true).is_err());
        let resolved = root_node.realpath(name);
        prop_assert_eq!(resolved, format!("/{name}"));
    }
}
