//! Connection manager
//!
//! Owns the single broker session used for actuator commands. Callers only ever see
//! three things: `connect` (fire and forget), `disconnect`, and a read accessor for the
//! session that is live right now.
//!
//! # Worker lifecycle
//!
//! ```text
//! ConnectionWorker<Idle> ──start──► ConnectionWorker<Running> ──run──► (loop until cancelled)
//! ```
//!
//! # Connection states
//!
//! ```text
//!                 ┌──────── handshake failed / broker closed ────────┐
//!                 ▼                                                   │
//! Disconnected ──► Connecting ──► Connected ──────────────────────────┘
//!      ▲                                   │
//!      └────────────── disconnect() ───────┘
//! ```
//!
//! After every failure or broker-side close the worker sleeps for the fixed retry
//! interval and starts over with a new client id. The sleep is the only pending timer
//! and it belongs to the one worker task, so `disconnect()` cancelling that task is
//! enough to stop all retries.

use statum::{machine, state};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::BrokerConfig;
use super::transport::{BrokerLink, BrokerTransport};

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

type LinkSlot = Option<Arc<dyn BrokerLink>>;

// State shared between the manager handles and the worker task.
// The link slot lock also serialises state updates, so a cancelled worker can never
// overwrite what disconnect() just published.
pub struct SharedConnection {
    state_tx: watch::Sender<ConnectionState>,
    link: RwLock<LinkSlot>,
    worker: Mutex<Option<WorkerHandle>>,
}

struct WorkerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SharedConnection {
    fn write_link(&self) -> RwLockWriteGuard<'_, LinkSlot> {
        self.link.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_state(&self, cancel: &CancellationToken, state: ConnectionState) -> bool {
        let _slot = self.write_link();
        if cancel.is_cancelled() {
            return false;
        }
        self.state_tx.send_replace(state);
        true
    }

    fn install(&self, cancel: &CancellationToken, link: Arc<dyn BrokerLink>) -> bool {
        let mut slot = self.write_link();
        if cancel.is_cancelled() {
            return false;
        }
        *slot = Some(link);
        self.state_tx.send_replace(ConnectionState::Connected);
        true
    }

    fn clear(&self, cancel: &CancellationToken) {
        let mut slot = self.write_link();
        if cancel.is_cancelled() {
            return;
        }
        *slot = None;
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    // Unconditional teardown used by the manager itself
    fn take_link(&self) -> LinkSlot {
        let mut slot = self.write_link();
        self.state_tx.send_replace(ConnectionState::Disconnected);
        slot.take()
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum WorkerState {
    Idle,
    Running,
}

#[machine]
pub struct ConnectionWorker<S: WorkerState> {
    config: BrokerConfig,
    transport: Arc<dyn BrokerTransport>,
    shared: Arc<SharedConnection>,
    cancel: CancellationToken,
}

impl ConnectionWorker<Idle> {
    fn create(
        config: BrokerConfig,
        transport: Arc<dyn BrokerTransport>,
        shared: Arc<SharedConnection>,
        cancel: CancellationToken,
    ) -> Self {
        debug!("Creating connection worker for {}", config);
        Self::new(config, transport, shared, cancel)
    }

    fn start(self) -> ConnectionWorker<Running> {
        info!(
            "Starting connection worker for {} (retry every {:?})",
            self.config,
            self.config.retry_interval()
        );
        self.transition()
    }
}

impl ConnectionWorker<Running> {
    async fn run(self) {
        let retry_interval = self.config.retry_interval();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if !self
                .shared
                .publish_state(&self.cancel, ConnectionState::Connecting)
            {
                break;
            }

            let options = self.config.session_options();
            info!(
                "Connecting to {} as {} (attempt {})",
                self.config, options.client_id, attempt
            );

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break,
                opened = self.transport.open(&options) => opened,
            };

            match opened {
                Ok(link) => {
                    if !self.shared.install(&self.cancel, link.clone()) {
                        debug!("Disconnect raced with handshake, closing fresh session");
                        link.close().await;
                        break;
                    }
                    info!("Connected to {} after {} attempt(s)", self.config, attempt);
                    attempt = 0;

                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = link.closed() => {
                            warn!("Connection to {} lost, reconnecting", self.config);
                            self.shared.clear(&self.cancel);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Connection attempt {} to {} failed: {}",
                        attempt, self.config, e
                    );
                    self.shared
                        .publish_state(&self.cancel, ConnectionState::Disconnected);
                }
            }

            debug!("Next connection attempt in {:?}", retry_interval);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(retry_interval) => {}
            }
        }

        debug!("Connection worker for {} stopped", self.config);
    }
}

/// Handle onto the broker connection. Cheap to clone; all clones share one session.
///
/// Dropping the last handle stops the worker and closes the live session, same as
/// [`disconnect`](Self::disconnect) without waiting for it.
#[derive(Clone)]
pub struct ConnectionManager {
    transport: Arc<dyn BrokerTransport>,
    shared: Arc<SharedConnection>,
    _owner: Arc<OwnerGuard>,
}

// Shared by the manager handles only, never by the worker
struct OwnerGuard {
    shared: Arc<SharedConnection>,
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        if let Some(worker) = self.shared.lock_worker().take() {
            debug!("Last connection manager handle dropped, stopping worker");
            worker.cancel.cancel();
        }
        if let Some(link) = self.shared.take_link() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    info!("Closing session {} of dropped manager", link.client_id());
                    runtime.spawn(async move { link.close().await });
                }
                Err(_) => warn!(
                    "No runtime to close session {} of dropped manager",
                    link.client_id()
                ),
            }
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(transport: impl BrokerTransport) -> Self {
        Self::with_transport(Arc::new(transport))
    }

    pub fn with_transport(transport: Arc<dyn BrokerTransport>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(SharedConnection {
            state_tx,
            link: RwLock::new(None),
            worker: Mutex::new(None),
        });
        Self {
            transport,
            _owner: Arc::new(OwnerGuard {
                shared: shared.clone(),
            }),
            shared,
        }
    }

    /// Starts connecting in the background and returns immediately.
    ///
    /// Failures are logged and retried every `config.retry_interval()` until the
    /// connection succeeds or [`disconnect`](Self::disconnect) is called. Calling this
    /// again replaces the running worker and drops the current session first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, config: BrokerConfig) {
        let mut worker = self.shared.lock_worker();

        if let Some(old) = worker.take() {
            info!("Replacing running connection worker");
            old.cancel.cancel();
        }
        if let Some(stale) = self.shared.take_link() {
            info!("Closing previous session {}", stale.client_id());
            tokio::spawn(async move { stale.close().await });
        }

        let cancel = CancellationToken::new();
        let running = ConnectionWorker::create(
            config,
            self.transport.clone(),
            self.shared.clone(),
            cancel.clone(),
        )
        .start();
        let task = tokio::spawn(running.run());

        *worker = Some(WorkerHandle { cancel, task });
    }

    /// Stops retrying and closes the live session, if any. Idempotent.
    pub async fn disconnect(&self) {
        let worker = self.shared.lock_worker().take();
        if let Some(worker) = &worker {
            worker.cancel.cancel();
        }

        let link = self.shared.take_link();

        if let Some(worker) = worker {
            if let Err(e) = worker.task.await {
                error!("Connection worker ended abnormally: {}", e);
            }
        }

        match link {
            Some(link) => {
                info!("Disconnecting session {}", link.client_id());
                link.close().await;
            }
            None => debug!("Disconnect requested with no live session"),
        }
    }

    /// The session that is live right now, or `None` unless `Connected`.
    pub fn current_connection(&self) -> Option<Arc<dyn BrokerLink>> {
        self.shared
            .link
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }
}
