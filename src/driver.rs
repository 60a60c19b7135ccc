//! Background task that owns the cache layer.
//!
//! All mutations are funneled through one unbounded channel and applied in
//! arrival order by a single tokio task. Readers subscribe to snapshots.

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error};

use crate::cache::{CacheLayer, Snapshot};
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::event::InboundEvent;

enum Command {
  Submit {
    event: InboundEvent,
    reply: oneshot::Sender<SyncResult<InboundEvent>>,
  },
  Clear {
    schema: String,
    reply: oneshot::Sender<bool>,
  },
}

pub struct SyncDriver {
  engine: SyncEngine,
  layer: CacheLayer,
  rx: mpsc::UnboundedReceiver<Command>,
  snapshots: watch::Sender<Snapshot>,
}

impl SyncDriver {
  /// Start the driver on the current tokio runtime.
  pub fn spawn(engine: SyncEngine, layer: CacheLayer) -> DriverHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (snapshots, snapshot_rx) = watch::channel(layer.snapshot());

    let driver = Self {
      engine,
      layer,
      rx,
      snapshots,
    };
    tokio::spawn(driver.run());

    DriverHandle {
      tx,
      snapshots: snapshot_rx,
    }
  }

  async fn run(mut self) {
    debug!(source = self.engine.source(), "sync driver started");

    while let Some(command) = self.rx.recv().await {
      match command {
        Command::Submit { event, reply } => {
          let result = self.apply(|engine, layer| engine.handle(event, layer));
          if let Err(err) = &result {
            error!(%err, "rejected lifecycle event");
          }
          let _ = reply.send(result);
        }
        Command::Clear { schema, reply } => {
          let changed = self.apply(|_, layer| layer.clear(&schema));
          let _ = reply.send(changed);
        }
      }
    }

    debug!(revision = self.layer.revision(), "sync driver stopped");
  }

  /// Run `f` against the layer and publish a snapshot if it changed state.
  /// Publishing happens before the caller is answered, so a completed
  /// command is always visible to [`DriverHandle::snapshot`].
  fn apply<T>(&mut self, f: impl FnOnce(&SyncEngine, &mut CacheLayer) -> T) -> T {
    let revision = self.layer.revision();
    let out = f(&self.engine, &mut self.layer);
    if self.layer.revision() != revision {
      self.snapshots.send_replace(self.layer.snapshot());
    }
    out
  }
}

/// Cloneable handle to a running [`SyncDriver`]. The driver stops once every
/// handle is dropped.
#[derive(Clone)]
pub struct DriverHandle {
  tx: mpsc::UnboundedSender<Command>,
  snapshots: watch::Receiver<Snapshot>,
}

impl DriverHandle {
  /// Process `event` and return it for forwarding.
  pub async fn submit(&self, event: InboundEvent) -> SyncResult<InboundEvent> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(Command::Submit { event, reply })
      .map_err(|_| SyncError::DriverStopped)?;
    rx.await.map_err(|_| SyncError::DriverStopped)?
  }

  /// Drop every tagged collection of `schema`. Returns whether anything
  /// was removed.
  pub async fn clear(&self, schema: &str) -> SyncResult<bool> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(Command::Clear {
        schema: schema.to_string(),
        reply,
      })
      .map_err(|_| SyncError::DriverStopped)?;
    rx.await.map_err(|_| SyncError::DriverStopped)
  }

  /// Receiver notified after every command that changed state.
  pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
    self.snapshots.clone()
  }

  /// Latest published snapshot.
  pub fn snapshot(&self) -> Snapshot {
    self.snapshots.borrow().clone()
  }
}
