//! TCP inference service.
//!
//! One accept thread hands connections to a fixed pool of session workers
//! through a bounded queue. A connection that finds the queue full is dropped.
//! Each worker serves one session at a time, frames in order.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::config::ServerConfig;
use crate::detect::{DetectionAdapter, PlateDetector, StubDetector};
use crate::persist::{ArtifactStore, PersistencePolicy, Persister, PlateStore, SqlitePlateStore};
use crate::pipeline::FramePipeline;
use crate::plate::PlateValidator;
use crate::recognize::{RecognitionAdapter, StubRecognizer, TextRecognizer};
use crate::selector::CandidateSelector;
use crate::session::StreamingSession;

const ACCEPT_POLL: Duration = Duration::from_millis(50);

type Job = (u64, TcpStream);

#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Stop accepting, let workers finish the sessions they hold and the
    /// connections already queued, then join every thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(accept) = self.accept.take() {
            accept
                .join()
                .map_err(|_| anyhow!("accept thread panicked"))?;
        }
        for worker in self.workers.drain(..) {
            worker
                .join()
                .map_err(|_| anyhow!("session worker panicked"))?;
        }
        Ok(())
    }
}

pub struct PlateServer {
    cfg: ServerConfig,
    pipeline: Arc<FramePipeline>,
}

impl PlateServer {
    pub fn new(cfg: ServerConfig, pipeline: Arc<FramePipeline>) -> Self {
        Self { cfg, pipeline }
    }

    pub fn spawn(self) -> Result<ServerHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address '{}'", self.cfg.listen_addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("failed to bind {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let (tx, rx) = sync_channel::<Job>(self.cfg.backlog);
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = Vec::with_capacity(self.cfg.workers);
        for worker_id in 0..self.cfg.workers {
            let rx = rx.clone();
            let pipeline = self.pipeline.clone();
            let idle_timeout = self.cfg.idle_timeout;
            let worker = std::thread::Builder::new()
                .name(format!("plate-session-{}", worker_id))
                .spawn(move || run_worker(worker_id, rx, pipeline, idle_timeout))
                .context("failed to spawn session worker")?;
            workers.push(worker);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let accept = std::thread::Builder::new()
            .name("plate-accept".to_string())
            .spawn(move || {
                if let Err(err) = run_accept(listener, tx, shutdown_thread) {
                    log::error!("plate server stopped accepting: {}", err);
                }
            })
            .context("failed to spawn accept thread")?;

        log::info!(
            "plate server listening on {} ({} workers, backlog {})",
            addr,
            self.cfg.workers,
            self.cfg.backlog
        );
        Ok(ServerHandle {
            addr,
            shutdown,
            accept: Some(accept),
            workers,
        })
    }
}

fn run_accept(listener: TcpListener, tx: SyncSender<Job>, shutdown: Arc<AtomicBool>) -> Result<()> {
    let mut next_session = 0u64;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let session_id = next_session;
                next_session += 1;
                match tx.try_send((session_id, stream)) {
                    Ok(()) => log::debug!("session {}: accepted {}", session_id, peer),
                    Err(TrySendError::Full(_)) => {
                        log::warn!("refusing {}: all workers busy and queue full", peer);
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        return Err(anyhow!("session workers exited"));
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<Receiver<Job>>>,
    pipeline: Arc<FramePipeline>,
    idle_timeout: Duration,
) {
    loop {
        let job = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => {
                log::error!("worker {}: job queue lock poisoned", worker_id);
                return;
            }
        };
        let Ok((session_id, stream)) = job else {
            return;
        };
        if let Err(err) = serve_connection(session_id, stream, &pipeline, idle_timeout) {
            log::warn!("session {}: {:#}", session_id, err);
        }
    }
}

fn serve_connection(
    session_id: u64,
    mut stream: TcpStream,
    pipeline: &FramePipeline,
    idle_timeout: Duration,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(idle_timeout))?;
    stream.set_nodelay(true)?;
    let mut session = StreamingSession::new(session_id);
    session.run(&mut stream, pipeline)?;
    Ok(())
}

/// Assemble the shared pipeline from configuration.
///
/// If the record store cannot be opened or probed the pipeline runs with
/// persistence disabled; responses are unaffected.
pub fn build_pipeline(cfg: &ServerConfig) -> Result<FramePipeline> {
    let detector = build_detector(cfg)?;
    let recognizer = build_recognizer(cfg)?;
    detector.warm_up()?;

    let selector = CandidateSelector::new(
        DetectionAdapter::new(detector),
        RecognitionAdapter::new(recognizer),
        PlateValidator::new(cfg.correction_mode),
    );
    let policy = PersistencePolicy::new(cfg.dedup_window);
    let persister = match open_persistence(cfg) {
        Ok((store, artifacts)) => Persister::new(policy, store, artifacts),
        Err(err) => {
            log::warn!("persistence disabled: {:#}", err);
            Persister::disabled(policy)
        }
    };
    log::info!(
        "pipeline ready: {} detector, {} recognizer, {:?} correction, dedup window {}s, persistence {}",
        selector.detector().backend_name(),
        selector.recognizer().backend_name(),
        selector.validator().mode(),
        persister.policy().window().as_secs(),
        if persister.is_enabled() { "on" } else { "off" }
    );
    Ok(FramePipeline::new(cfg.codec, selector, persister))
}

fn open_persistence(cfg: &ServerConfig) -> Result<(Arc<dyn PlateStore>, Arc<ArtifactStore>)> {
    let store = SqlitePlateStore::open(&cfg.db_path)?;
    let artifacts = ArtifactStore::open(&cfg.artifact_dir, cfg.codec)?;
    log::info!(
        "recording plates to {} (artifacts under {})",
        cfg.db_path,
        cfg.artifact_dir.display()
    );
    Ok((Arc::new(store), Arc::new(artifacts)))
}

fn build_detector(cfg: &ServerConfig) -> Result<Arc<dyn PlateDetector>> {
    match &cfg.models.detector {
        None => {
            log::warn!("no detector model configured; using stub detector (no plates will be found)");
            Ok(Arc::new(StubDetector::empty()))
        }
        #[cfg(feature = "backend-tract")]
        Some(path) => Ok(Arc::new(
            crate::detect::TractDetector::new(path, cfg.models.detector_input_size)?
                .with_threshold(cfg.models.detector_threshold),
        )),
        #[cfg(not(feature = "backend-tract"))]
        Some(path) => Err(anyhow!(
            "detector model {} configured but built without the backend-tract feature",
            path.display()
        )),
    }
}

fn build_recognizer(cfg: &ServerConfig) -> Result<Arc<dyn TextRecognizer>> {
    match &cfg.models.recognizer {
        None => Ok(Arc::new(StubRecognizer::new())),
        #[cfg(feature = "backend-tract")]
        Some(path) => Ok(Arc::new(
            crate::recognize::TractRecognizer::new(
                path,
                cfg.models.recognizer_width,
                cfg.models.recognizer_height,
            )?
            .with_charset(&cfg.models.recognizer_charset),
        )),
        #[cfg(not(feature = "backend-tract"))]
        Some(path) => Err(anyhow!(
            "recognizer model {} configured but built without the backend-tract feature",
            path.display()
        )),
    }
}
