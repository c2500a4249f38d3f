//! Read-path benchmarks for torrent-ftpd.
//!
//! Run with: cargo bench
//!
//! These measure the parts of the read path that are pure, synchronous
//! tree operations: VFS path traversal (including symlink resolution),
//! `DictDir` recomputation cost, and the `/v1` library tree's by-index
//! and by-path listing cost as file counts grow.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use torrent_ftpd::engine::ResumeBlob;
use torrent_ftpd::library::{FileEntry, Libraries, Library, LibraryService, Opener};
use torrent_ftpd::request_service::RequestService;
use torrent_ftpd::vfs::node::{FileNode, NodeMeta, ReadStream};
use torrent_ftpd::vfs::{Dir, Node, StaticDir, Symlink, SymlinkTarget};

struct EmptyFile(NodeMeta);
impl FileNode for EmptyFile {
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
        Ok(Box::new(std::io::Cursor::new(Vec::new())))
    }
}

fn nested_dir_tree(depth: usize) -> (Node, String) {
    let leaf = StaticDir::new();
    leaf.mkchild("leaf.txt", Node::File(Arc::new(EmptyFile(NodeMeta::new()))));
    let mut current = Node::Dir(leaf);

    for _ in 0..depth {
        let dir = StaticDir::new();
        dir.mkchild("child", current);
        current = Node::Dir(dir);
    }

    let mut path = "child/".repeat(depth);
    path.push_str("leaf.txt");
    (current, path)
}

fn bench_vfs_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("vfs_traversal");

    for depth in [1usize, 8, 32, 128] {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let (root, path) = nested_dir_tree(depth);
            b.iter(|| {
                let node = root.traverse(black_box(&path), true).unwrap();
                black_box(node);
            });
        });
    }

    group.finish();
}

fn bench_symlink_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("symlink_chain");

    for chain_len in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("length", chain_len), &chain_len, |b, &chain_len| {
            let root = StaticDir::new();
            root.mkchild("target", Node::File(Arc::new(EmptyFile(NodeMeta::new()))));
            let mut name = "target".to_string();
            for i in 0..chain_len {
                let link = Symlink::with_target(SymlinkTarget::Path(name.clone()));
                let link_name = format!("link-{i}");
                root.mkchild(&link_name, Node::Symlink(link));
                name = link_name;
            }
            let root_node = Node::Dir(root);

            b.iter(|| {
                let node = root_node.traverse(black_box(&name), true).unwrap();
                black_box(node);
            });
        });
    }

    group.finish();
}

fn bench_dictdir_readdir(c: &mut Criterion) {
    let mut group = c.benchmark_group("dictdir_readdir");

    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("children", size), &size, |b, &size| {
            let dict = torrent_ftpd::vfs::DictDir::new(move |_self_ref| {
                (0..size)
                    .map(|i| (format!("file-{i}"), Node::File(Arc::new(EmptyFile(NodeMeta::new())))))
                    .collect()
            });
            let node = Node::Dir(dict);
            b.iter(|| {
                let entries = node.as_dir().unwrap().readdir().unwrap();
                black_box(entries);
            });
        });
    }

    group.finish();
}

struct BenchLibrary {
    files: Vec<FileEntry>,
    piece_length: u64,
}

impl Library for BenchLibrary {
    fn files(&self, _info_hash: &str) -> Option<Vec<FileEntry>> {
        Some(self.files.clone())
    }
    fn piece_length(&self, _info_hash: &str) -> Option<u64> {
        Some(self.piece_length)
    }
    fn configure_atp(&self, _info_hash: &str) -> ResumeBlob {
        Vec::new()
    }
}

struct NoopOpener;
impl Opener for NoopOpener {
    fn open(
        &self,
        _info_hash: String,
        _start: u64,
        _stop: u64,
        _configure_atp: torrent_ftpd::request_service::ConfigureAtp,
    ) -> torrent_ftpd::error::Result<Box<dyn ReadStream>> {
        Ok(Box::new(std::io::Cursor::new(Vec::new())))
    }
}

fn many_file_torrent(count: usize) -> Vec<FileEntry> {
    (0..count)
        .map(|i| FileEntry {
            path: vec!["dir".to_string(), format!("file-{i}.bin")],
            start: i as u64 * 4096,
            stop: (i as u64 + 1) * 4096,
            is_padding: false,
        })
        .collect()
}

fn bench_library_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("library_listing");
    let info_hash = "a".repeat(40);

    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));

        let libraries = Libraries::new();
        libraries.register(
            "bench",
            Arc::new(BenchLibrary {
                files: many_file_torrent(size),
                piece_length: 16384,
            }),
        );
        let svc = LibraryService::new(Arc::new(NoopOpener), libraries);
        let by_index_path = format!("v1/{info_hash}/bench/i");
        let by_path_path = format!("v1/{info_hash}/bench/f");

        group.bench_with_input(BenchmarkId::new("by_index", size), &size, |b, _| {
            let root = Node::Dir(svc.root.clone());
            b.iter(|| {
                let dir = root.traverse(black_box(&by_index_path), true).unwrap();
                black_box(dir.readdir().unwrap());
            });
        });

        group.bench_with_input(BenchmarkId::new("by_path", size), &size, |b, _| {
            let root = Node::Dir(svc.root.clone());
            b.iter(|| {
                let dir = root.traverse(black_box(&by_path_path), true).unwrap();
                black_box(dir.readdir().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_request_service_lifecycle(c: &mut Criterion) {
    use torrent_ftpd::engine::MockEngine;

    let mut group = c.benchmark_group("request_service");

    group.bench_function("request_then_release", |b| {
        let engine = Arc::new(MockEngine::new());
        let svc = RequestService::new(engine);
        let info_hash = "b".repeat(40);
        b.iter(|| {
            let handle = svc
                .request(info_hash.clone(), 0, 2, 5, Box::new(|| Vec::new()))
                .unwrap();
            black_box(&handle);
            drop(handle);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_vfs_traversal,
    bench_symlink_chain,
    bench_dictdir_readdir,
    bench_library_listing,
    bench_request_service_lifecycle,
);
criterion_main!(benches);
