//! Async/sync bridge for the FTP adapter (§4.7, §10.4 scheduling
//! model), the mirror image of the teacher's `fs::async_bridge`: there
//! the caller was synchronous (a FUSE callback) and the work was
//! async; here the caller is async (a `libunftp` storage-backend
//! method running on the protocol crate's own runtime) and the work —
//! VFS traversal, `TorrentIO` reads — is blocking sync code that must
//! never run on a tokio worker thread. Jobs are handed to a small
//! dedicated worker pool, grounded on `crate::resume`'s `WorkerPool`,
//! and each caller awaits a oneshot reply instead of calling
//! `block_in_place`/`block_on`, which would risk deadlocking the
//! protocol crate's own runtime under load.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

type Job = Box<dyn FnOnce() + Send>;

pub struct SyncBridge {
    sender: std::sync::mpsc::Sender<Job>,
    workers: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl SyncBridge {
    pub fn new(worker_count: usize) -> Arc<Self> {
        let (sender, receiver) = std::sync::mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let receiver = receiver.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("ftp-bridge-{i}"))
                    .spawn(move || loop {
                        let job = { receiver.lock().unwrap().recv() };
                        match job {
                            Ok(job) => job(),
                            Err(_) => break,
                        }
                    })
                    .expect("failed to spawn ftp bridge worker"),
            );
        }
        Arc::new(Self {
            sender,
            workers: Mutex::new(workers),
        })
    }

    /// Submit `f` to the worker pool, returning a receiver the caller
    /// can `.await` (or poll manually, as `SyncReadBridge` does) for
    /// its result.
    pub fn submit<F, T>(&self, f: F) -> oneshot::Receiver<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let _ = self.sender.send(Box::new(move || {
            let _ = tx.send(f());
        }));
        rx
    }

    /// Run `f` on the worker pool and await its result. Panics only if
    /// every worker thread has already exited, which only happens
    /// after `Drop`.
    pub async fn run<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit(f).await.expect("ftp bridge worker pool is gone")
    }
}
