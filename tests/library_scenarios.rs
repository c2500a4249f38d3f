//! Integration coverage for the `/v1` by-index/by-path library tree.

use std::io::Read;
use std::sync::Arc;

use torrent_ftpd::engine::ResumeBlob;
use torrent_ftpd::error::Result;
use torrent_ftpd::library::{FileEntry, Libraries, Library, LibraryService, Opener};
use torrent_ftpd::request_service::ConfigureAtp;
use torrent_ftpd::vfs::node::ReadStream;
use torrent_ftpd::vfs::Node;

struct FixtureLibrary {
    files: Vec<FileEntry>,
    piece_length: u64,
}

impl Library for FixtureLibrary {
    fn files(&self, _info_hash: &str) -> Option<Vec<FileEntry>> {
        Some(self.files.clone())
    }
    fn piece_length(&self, _info_hash: &str) -> Option<u64> {
        Some(self.piece_length)
    }
    fn configure_atp(&self, info_hash: &str) -> ResumeBlob {
        format!("atp:{info_hash}").into_bytes()
    }
}

/// Opens every file as a fixed byte buffer keyed on its start offset,
/// standing in for a real `TorrentIO`-backed `Opener`.
struct FixtureOpener;

impl Opener for FixtureOpener {
    fn open(&self, info_hash: String, start: u64, stop: u64, _configure_atp: ConfigureAtp) -> Result<Box<dyn ReadStream>> {
        let body = format!("{info_hash}:{start}:{stop}").into_bytes();
        Ok(Box::new(std::io::Cursor::new(body)))
    }
}

fn service_with(files: Vec<FileEntry>) -> (Arc<LibraryService>, String) {
    let info_hash = "1".repeat(40);
    let libraries = Libraries::new();
    libraries.register("net", Arc::new(FixtureLibrary { files, piece_length: 16384 }));
    let svc = LibraryService::new(Arc::new(FixtureOpener), libraries);
    (svc, info_hash)
}

#[test]
fn s3_by_index_and_by_path() {
    let (svc, info_hash) = service_with(vec![FileEntry {
        path: vec!["test.txt".to_string()],
        start: 0,
        stop: 10,
        is_padding: false,
    }]);

    let root = Node::Dir(svc.root.clone());
    let link_path = format!("v1/{info_hash}/net/f/test.txt");
    let link = root.traverse(&link_path, false).unwrap();
    assert!(link.is_link());
    assert_eq!(link.readlink().unwrap(), "../i/0");

    let resolved = root.traverse(&link_path, true).unwrap();
    assert!(resolved.is_file());

    let mut buf = String::new();
    resolved.open().unwrap().read_to_string(&mut buf).unwrap();
    assert_eq!(buf, format!("{info_hash}:0:10"));
}

#[test]
fn s4_padding_hidden() {
    let (svc, info_hash) = service_with(vec![
        FileEntry {
            path: vec!["data.bin".to_string()],
            start: 0,
            stop: 4096,
            is_padding: false,
        },
        FileEntry {
            path: vec![".pad".to_string()],
            start: 4096,
            stop: 4352,
            is_padding: true,
        },
    ]);

    let root = Node::Dir(svc.root.clone());
    let by_index = root.traverse(&format!("v1/{info_hash}/net/i"), true).unwrap();
    let names: Vec<String> = by_index.readdir().unwrap().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["0".to_string()]);

    assert!(root.traverse(&format!("v1/{info_hash}/net/i/1"), true).is_err());
}

#[test]
fn v1_enumeration_is_denied() {
    let (svc, _info_hash) = service_with(vec![]);
    let root = Node::Dir(svc.root.clone());
    let v1 = root.traverse("v1", true).unwrap();
    assert!(v1.readdir().is_err());
}
