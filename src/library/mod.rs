//! Library registry and the canonical `/v1/<info_hash>/<network>/{f,i}`
//! tree (§4.2): maps opaque per-network torrent metadata providers
//! (`Library`) onto the fixed VFS shape, plus a `/browse` mount point
//! libraries can populate with curated views.

mod tree;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::engine::{InfoHash, ResumeBlob};
use crate::error::{Result, TorrentFtpError};
use crate::request_service::{ConfigureAtp, RequestService};
use crate::torrent_io::TorrentIO;
use crate::vfs::node::{Dir, Dirent, FileNode, NodeMeta, ReadStream, Stat};
use crate::vfs::{DictDir, Node, StaticDir};

/// One file inside a torrent, as a library reports it. `path` is the
/// list of path components (e.g. `["multi", "file.tar.gz"]`); a
/// single-file torrent's one entry has a one-element path.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: Vec<String>,
    pub start: u64,
    pub stop: u64,
    pub is_padding: bool,
}

/// A source of torrent metadata for some network. Implementations are
/// typically backed by a tracker database or a torrent-metadata cache;
/// this crate only consumes the trait.
pub trait Library: Send + Sync {
    /// `None` means this library has never seen `info_hash`.
    fn files(&self, info_hash: &str) -> Option<Vec<FileEntry>>;

    /// The torrent's piece length in bytes, needed to translate byte
    /// windows into piece ranges for `TorrentIO`.
    fn piece_length(&self, info_hash: &str) -> Option<u64>;

    /// Build the engine's `add_torrent_params` blob for this torrent
    /// (metadata, save path, trackers — whatever the engine needs to
    /// fetch and verify it from the info hash alone).
    fn configure_atp(&self, info_hash: &str) -> ResumeBlob;
}

/// The registry of per-network `Library` providers. Shared (and
/// mutated after construction, e.g. when a network goes offline) via
/// interior mutability, so every `Dir` built over it observes changes.
pub struct Libraries {
    networks: Mutex<HashMap<String, Arc<dyn Library>>>,
}

impl Libraries {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            networks: Mutex::new(HashMap::new()),
        })
    }

    pub fn register(&self, network: impl Into<String>, library: Arc<dyn Library>) {
        self.networks.lock().unwrap().insert(network.into(), library);
    }

    pub fn clear(&self) {
        self.networks.lock().unwrap().clear();
    }

    fn get(&self, network: &str) -> Option<Arc<dyn Library>> {
        self.networks.lock().unwrap().get(network).cloned()
    }

    /// Every network name under which `info_hash` has at least a file
    /// list registered.
    fn networks_for(&self, info_hash: &str) -> Vec<String> {
        self.networks
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, lib)| lib.files(info_hash).is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn has_any(&self, info_hash: &str) -> bool {
        self.networks.lock().unwrap().values().any(|lib| lib.files(info_hash).is_some())
    }

    fn piece_length(&self, info_hash: &str) -> Option<u64> {
        self.networks.lock().unwrap().values().find_map(|lib| lib.piece_length(info_hash))
    }
}

/// Opens a byte window of a torrent as a stream, decoupling the
/// library tree from `TorrentIO`/`RequestService` so tests can swap in
/// a trivial in-memory opener.
pub trait Opener: Send + Sync {
    fn open(&self, info_hash: InfoHash, start: u64, stop: u64, configure_atp: ConfigureAtp) -> Result<Box<dyn ReadStream>>;
}

/// Production `Opener`: every open becomes a `TorrentIO` backed by the
/// shared `RequestService`, with piece length resolved from whichever
/// library first recognizes the torrent.
pub struct RequestServiceOpener {
    request_service: Arc<RequestService>,
    libraries: Arc<Libraries>,
}

impl RequestServiceOpener {
    pub fn new(request_service: Arc<RequestService>, libraries: Arc<Libraries>) -> Arc<Self> {
        Arc::new(Self { request_service, libraries })
    }
}

impl Opener for RequestServiceOpener {
    fn open(&self, info_hash: InfoHash, start: u64, stop: u64, configure_atp: ConfigureAtp) -> Result<Box<dyn ReadStream>> {
        let piece_length = self
            .libraries
            .piece_length(&info_hash)
            .ok_or(TorrentFtpError::NotFound)?;
        let io = TorrentIO::new(self.request_service.clone(), info_hash, start, stop, piece_length, configure_atp)
            .map_err(|e| TorrentFtpError::EngineError(e.to_string()))?;
        Ok(Box::new(io))
    }
}

/// A leaf under `i/<idx>`: the single authoritative opener for one
/// file inside one torrent, on one network.
pub struct TorrentFile {
    meta: NodeMeta,
    pub info_hash: InfoHash,
    pub start: u64,
    pub stop: u64,
    opener: Arc<dyn Opener>,
    library: Arc<dyn Library>,
}

impl TorrentFile {
    fn new(info_hash: InfoHash, start: u64, stop: u64, opener: Arc<dyn Opener>, library: Arc<dyn Library>) -> Arc<Self> {
        Arc::new(Self {
            meta: NodeMeta::new(),
            info_hash,
            start,
            stop,
            opener,
            library,
        })
    }

    /// Build the `add_torrent_params` blob, exactly as the library
    /// that knows this torrent would.
    pub fn configure_atp(&self) -> ResumeBlob {
        self.library.configure_atp(&self.info_hash)
    }
}

impl FileNode for TorrentFile {
    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn size(&self) -> u64 {
        self.stop - self.start
    }

    fn mtime(&self) -> Option<i64> {
        None
    }

    fn open(&self) -> Result<Box<dyn ReadStream>> {
        let info_hash = self.info_hash.clone();
        let library = self.library.clone();
        let configure_atp: ConfigureAtp = Box::new(move || library.configure_atp(&info_hash));
        self.opener.open(self.info_hash.clone(), self.start, self.stop, configure_atp)
    }
}

/// `v1` itself: enumeration is disallowed, but `lookup(info_hash)`
/// succeeds for any hash at least one library recognizes, even if
/// every network for it is empty at the moment of lookup.
struct V1Dir {
    meta: NodeMeta,
    libraries: Arc<Libraries>,
    opener: Arc<dyn Opener>,
}

fn looks_like_info_hash(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl Dir for V1Dir {
    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn readdir(&self) -> Result<Vec<Dirent>> {
        Err(TorrentFtpError::EnumerationDenied)
    }

    fn lookup(&self, name: &str) -> Result<Node> {
        if !looks_like_info_hash(name) || !self.libraries.has_any(name) {
            return Err(TorrentFtpError::NotFound);
        }
        Ok(Node::Dir(tree::build_torrent_dir(
            name.to_string(),
            self.libraries.clone(),
            self.opener.clone(),
        )))
    }

    fn stat(&self) -> Stat {
        Stat {
            filetype: crate::vfs::node::FileType::Directory,
            size: 0,
            mtime: None,
        }
    }
}

/// Owns the VFS root (`/browse`, `/v1`) and the registry it is built
/// over.
pub struct LibraryService {
    pub root: Arc<StaticDir>,
    libraries: Arc<Libraries>,
    browse: Arc<Mutex<HashMap<String, Node>>>,
}

impl LibraryService {
    pub fn new(opener: Arc<dyn Opener>, libraries: Arc<Libraries>) -> Arc<Self> {
        let root = StaticDir::new();
        let browse_entries: Arc<Mutex<HashMap<String, Node>>> = Arc::new(Mutex::new(HashMap::new()));

        let browse_for_closure = browse_entries.clone();
        let browse_dir = DictDir::new(move |_self_ref| {
            browse_for_closure
                .lock()
                .unwrap()
                .iter()
                .map(|(name, node)| (name.clone(), node.clone()))
                .collect()
        });
        root.mkchild("browse", Node::Dir(browse_dir));

        let v1 = Arc::new(V1Dir {
            meta: NodeMeta::new(),
            libraries: libraries.clone(),
            opener,
        });
        root.mkchild("v1", Node::Dir(v1));

        Arc::new(Self {
            root,
            libraries,
            browse: browse_entries,
        })
    }

    /// Register `node` at `/browse/<key>`, replacing any prior mount
    /// at that key.
    pub fn set_browse_node(&self, key: impl Into<String>, node: Node) {
        self.browse.lock().unwrap().insert(key.into(), node);
    }

    pub fn get_torrent_path(&self, info_hash: &str) -> String {
        format!("v1/{info_hash}")
    }

    pub fn lookup_torrent(&self, info_hash: &str) -> Result<Arc<dyn Dir>> {
        Node::Dir(self.root.clone())
            .traverse(&self.get_torrent_path(info_hash), true)?
            .as_dir()
    }

    pub fn libraries(&self) -> &Arc<Libraries> {
        &self.libraries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use std::io::Read;

    struct FakeLibrary {
        torrents: Map<InfoHash, (Vec<FileEntry>, u64)>,
    }

    impl Library for FakeLibrary {
        fn files(&self, info_hash: &str) -> Option<Vec<FileEntry>> {
            self.torrents.get(info_hash).map(|(files, _)| files.clone())
        }
        fn piece_length(&self, info_hash: &str) -> Option<u64> {
            self.torrents.get(info_hash).map(|(_, pl)| *pl)
        }
        fn configure_atp(&self, info_hash: &str) -> ResumeBlob {
            format!("atp:{info_hash}").into_bytes()
        }
    }

    struct EchoOpener;
    impl Opener for EchoOpener {
        fn open(&self, info_hash: InfoHash, start: u64, stop: u64, _configure_atp: ConfigureAtp) -> Result<Box<dyn ReadStream>> {
            Ok(Box::new(std::io::Cursor::new(format!("{info_hash}:{start}:{stop}").into_bytes())))
        }
    }

    fn single_file_hash() -> String {
        "1".repeat(40)
    }

    fn multi_file_hash() -> String {
        "2".repeat(40)
    }

    fn conflict_hash() -> String {
        "3".repeat(40)
    }

    fn padded_hash() -> String {
        "4".repeat(40)
    }

    fn build_service() -> Arc<LibraryService> {
        let mut torrents = Map::new();
        torrents.insert(
            single_file_hash(),
            (
                vec![FileEntry {
                    path: vec!["test.txt".to_string()],
                    start: 0,
                    stop: 10,
                    is_padding: false,
                }],
                16384,
            ),
        );
        torrents.insert(
            multi_file_hash(),
            (
                vec![
                    FileEntry {
                        path: vec!["multi".to_string(), "file.tar.gz".to_string()],
                        start: 0,
                        stop: 20,
                        is_padding: false,
                    },
                    FileEntry {
                        path: vec!["multi".to_string(), "info.nfo".to_string()],
                        start: 20,
                        stop: 25,
                        is_padding: false,
                    },
                ],
                16384,
            ),
        );
        torrents.insert(
            conflict_hash(),
            (
                vec![
                    FileEntry {
                        path: vec!["a".to_string()],
                        start: 0,
                        stop: 5,
                        is_padding: false,
                    },
                    FileEntry {
                        path: vec!["a".to_string(), "b".to_string()],
                        start: 5,
                        stop: 10,
                        is_padding: false,
                    },
                ],
                16384,
            ),
        );
        torrents.insert(
            padded_hash(),
            (
                vec![
                    FileEntry {
                        path: vec!["data.bin".to_string()],
                        start: 0,
                        stop: 10,
                        is_padding: false,
                    },
                    FileEntry {
                        path: vec![".pad".to_string()],
                        start: 10,
                        stop: 16384,
                        is_padding: true,
                    },
                ],
                16384,
            ),
        );

        let libraries = Libraries::new();
        libraries.register("test", Arc::new(FakeLibrary { torrents }));
        LibraryService::new(Arc::new(EchoOpener), libraries)
    }

    #[test]
    fn v1_readdir_is_denied() {
        let svc = build_service();
        let v1 = Node::Dir(svc.root.clone()).traverse("v1", true).unwrap();
        assert!(matches!(v1.readdir(), Err(TorrentFtpError::EnumerationDenied)));
    }

    #[test]
    fn v1_lookup_unknown_hash_fails() {
        let svc = build_service();
        let v1 = Node::Dir(svc.root.clone()).traverse("v1", true).unwrap();
        assert!(matches!(v1.lookup(&"0".repeat(40)), Err(TorrentFtpError::NotFound)));
    }

    #[test]
    fn lookup_torrent_succeeds_for_known_hash() {
        let svc = build_service();
        assert!(svc.lookup_torrent(&single_file_hash()).is_ok());
    }

    #[test]
    fn torrent_dir_with_no_network_has_empty_readdir() {
        let svc = build_service();
        svc.libraries().clear();
        let dir = svc.lookup_torrent(&single_file_hash()).unwrap();
        assert!(dir.readdir().unwrap().is_empty());
    }

    #[test]
    fn network_dir_lists_f_and_i() {
        let svc = build_service();
        let network = Node::Dir(svc.root.clone())
            .traverse(&format!("v1/{}/test", single_file_hash()), true)
            .unwrap();
        let mut names: Vec<String> = network.readdir().unwrap().into_iter().map(|d| d.name).collect();
        names.sort();
        assert_eq!(names, vec!["f", "i"]);
    }

    #[test]
    fn by_path_single_file_symlinks_to_by_index() {
        let svc = build_service();
        let link = Node::Dir(svc.root.clone())
            .traverse(&format!("v1/{}/test/f/test.txt", single_file_hash()), false)
            .unwrap();
        assert_eq!(link.readlink().unwrap(), "../i/0");
    }

    #[test]
    fn by_path_multi_file_nests_and_links_up_two_levels() {
        let svc = build_service();
        let link = Node::Dir(svc.root.clone())
            .traverse(&format!("v1/{}/test/f/multi/file.tar.gz", multi_file_hash()), false)
            .unwrap();
        assert_eq!(link.readlink().unwrap(), "../../i/0");
    }

    #[test]
    fn by_index_open_reads_bytes_for_its_window() {
        let svc = build_service();
        let tfile = Node::Dir(svc.root.clone())
            .traverse(&format!("v1/{}/test/i/0", single_file_hash()), true)
            .unwrap();
        let mut buf = Vec::new();
        tfile.open().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, format!("{}:0:10", single_file_hash()).into_bytes());
    }

    #[test]
    fn conflicting_paths_are_omitted_from_by_path_but_not_by_index() {
        let svc = build_service();
        let by_path = Node::Dir(svc.root.clone())
            .traverse(&format!("v1/{}/test/f", conflict_hash()), true)
            .unwrap();
        assert!(by_path.readdir().unwrap().is_empty());

        let by_index = Node::Dir(svc.root.clone())
            .traverse(&format!("v1/{}/test/i", conflict_hash()), true)
            .unwrap();
        let mut names: Vec<String> = by_index.readdir().unwrap().into_iter().map(|d| d.name).collect();
        names.sort();
        assert_eq!(names, vec!["0", "1"]);
    }

    #[test]
    fn padding_files_hidden_but_indices_preserved() {
        let svc = build_service();
        let by_index = Node::Dir(svc.root.clone())
            .traverse(&format!("v1/{}/test/i", padded_hash()), true)
            .unwrap();
        let names: Vec<String> = by_index.readdir().unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["0"]);
        assert!(matches!(by_index.lookup("1"), Err(TorrentFtpError::NotFound)));
    }

    #[test]
    fn browse_mounts_at_fixed_key() {
        let svc = build_service();
        let single_dir = svc.lookup_torrent(&single_file_hash()).unwrap();
        let test_dir = StaticDir::new();
        test_dir.mkchild("single", Node::Dir(single_dir));
        svc.set_browse_node("test", Node::Dir(test_dir));

        let browse = Node::Dir(svc.root.clone()).traverse("browse", true).unwrap();
        let names: Vec<String> = browse.readdir().unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["test"]);
    }
}
