mod clock;
mod conflict;
mod error;
mod gaps;
mod mutations;
mod pricing;
mod queries;
mod store;
mod utilization;

pub use clock::{Clock, FixedClock, SystemClock};
pub use conflict::{find_conflict, has_conflict};
pub use error::EngineError;
pub use gaps::{gaps_in, GapQuery, Gaps, DEFAULT_SEARCH_DAYS};
pub use pricing::{price, PricingPolicy};
pub use store::{HallStore, ReservationClaim};
pub use utilization::utilization;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedHallState = Arc<RwLock<HallState>>;

/// Construction-time engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Event log location; `None` keeps everything in memory.
    pub wal_path: Option<PathBuf>,
    pub search_before_days: i64,
    pub search_after_days: i64,
    /// Length of the trailing window used when utilization is asked without one.
    pub utilization_days: i64,
    pub pricing: PricingPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wal_path: None,
            search_before_days: DEFAULT_SEARCH_DAYS,
            search_after_days: DEFAULT_SEARCH_DAYS,
            utilization_days: 30,
            pricing: PricingPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_wal(path: impl Into<PathBuf>) -> Self {
        Self {
            wal_path: Some(path.into()),
            ..Self::default()
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that arrive together share a single fsync:
/// take one, drain whatever else is queued, flush once, answer everyone.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        warn!("WAL flush of {} events failed: {e}", batch.len());
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so the half-written batch does not
    // leak into the next one.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

/// The booking core: halls, their reservations, and the operations over them.
pub struct Engine {
    pub(super) store: HallStore,
    pub(super) wal_tx: Option<mpsc::Sender<WalCommand>>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: EngineConfig,
    /// Serializes hall creation/deletion against compaction snapshots.
    pub(super) admin: Mutex<()>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> io::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Replay the log (if any) and start the WAL writer. Must run inside a tokio runtime
    /// when `config.wal_path` is set.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let (store, wal_tx) = match &config.wal_path {
            Some(path) => {
                if let Some(dir) = path.parent()
                    && !dir.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(dir)?;
                }
                let events = Wal::replay(path)?;
                let store = HallStore::from_events(&events);
                info!(
                    "replayed {} events from {}: {} halls, {} reservations",
                    events.len(),
                    path.display(),
                    store.hall_count(),
                    store.reservation_count()
                );
                let wal = Wal::open(path)?;
                let (tx, rx) = mpsc::channel(4096);
                tokio::spawn(wal_writer_loop(wal, rx));
                (store, Some(tx))
            }
            None => {
                info!("persistence disabled, running in memory");
                (HallStore::new(), None)
            }
        };

        Ok(Self {
            store,
            wal_tx,
            clock,
            config,
            admin: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    pub fn is_persistent(&self) -> bool {
        self.wal_tx.is_some()
    }

    /// Hand an event to the group-commit writer and wait for the fsync.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))
    }

    pub(super) fn hall(&self, id: &Ulid) -> Result<SharedHallState, EngineError> {
        self.store.get_hall(id).ok_or(EngineError::HallNotFound(*id))
    }

    /// Take a hall's write lock, failing if the hall was deleted while we waited.
    pub(super) async fn hall_write(&self, id: &Ulid) -> Result<OwnedRwLockWriteGuard<HallState>, EngineError> {
        let guard = self.hall(id)?.write_owned().await;
        if guard.deleted {
            return Err(EngineError::HallNotFound(*id));
        }
        Ok(guard)
    }

    /// Log the event, then apply it. Caller holds the hall's write lock, which makes
    /// conflict check + insert a single serializable step.
    pub(super) async fn persist_and_apply(
        &self,
        hs: &mut HallState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(hs, event);
        Ok(())
    }

    /// Lookup reservation -> hall and take the hall's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<HallState>, EngineError> {
        let hall_id = self
            .store
            .hall_for_reservation(reservation_id)
            .ok_or(EngineError::ReservationNotFound(*reservation_id))?;
        let hs = self.hall(&hall_id)?;
        let guard = hs.write_owned().await;
        // The reservation may have been cancelled, and its hall deleted, while we waited.
        if guard.deleted || guard.get_reservation(*reservation_id).is_none() {
            return Err(EngineError::ReservationNotFound(*reservation_id));
        }
        Ok(guard)
    }
}
