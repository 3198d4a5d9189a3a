//! Observable per-server status cells.

use crate::{ConnectionState, ServerId, StatusRecord};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tracing::debug;

/// Concurrent map from server id to a last-value-cached status cell.
///
/// Each cell is a `watch` channel: a subscriber sees the current record
/// immediately and every later one, never the history before it. Cells are
/// created lazily as `Disconnected` with no message.
///
/// Writes are ordered by a registry-wide sequence number stamped under the
/// map's write lock, so the last write to arrive wins. `updated_at` is for
/// display only and never decides ordering.
#[derive(Clone, Default)]
pub struct StatusRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    cells: RwLock<HashMap<ServerId, watch::Sender<StatusRecord>>>,
    closed: AtomicBool,
    sequence: AtomicU64,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one server's status, creating the cell if needed.
    pub fn get(&self, server_id: &ServerId) -> watch::Receiver<StatusRecord> {
        {
            let cells = self.inner.cells.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cell) = cells.get(server_id) {
                return cell.subscribe();
            }
        }

        let mut cells = self
            .inner
            .cells
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        cells
            .entry(server_id.clone())
            .or_insert_with(|| watch::channel(StatusRecord::unknown(server_id.clone())).0)
            .subscribe()
    }

    /// Current record for one server.
    pub fn current(&self, server_id: &ServerId) -> StatusRecord {
        self.get(server_id).borrow().clone()
    }

    /// Subscribe to every known server.
    pub fn get_all(&self) -> HashMap<ServerId, watch::Receiver<StatusRecord>> {
        let cells = self.inner.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells
            .iter()
            .map(|(id, cell)| (id.clone(), cell.subscribe()))
            .collect()
    }

    /// Current records of every known server.
    pub fn snapshot(&self) -> HashMap<ServerId, StatusRecord> {
        let cells = self.inner.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells
            .iter()
            .map(|(id, cell)| (id.clone(), cell.borrow().clone()))
            .collect()
    }

    /// Publish a new state for a server. Returns whether it was stored.
    pub fn set(&self, server_id: &ServerId, state: ConnectionState) -> bool {
        self.publish(StatusRecord::new(server_id.clone(), state))
    }

    pub(crate) fn publish(&self, mut record: StatusRecord) -> bool {
        let mut cells = self
            .inner
            .cells
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            debug!(server_id = %record.server_id, "Registry closed, dropping status update");
            return false;
        }

        let cell = cells.entry(record.server_id.clone()).or_insert_with(|| {
            watch::channel(StatusRecord::unknown(record.server_id.clone())).0
        });
        record.sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        debug!(
            server_id = %record.server_id,
            sequence = record.sequence,
            "Status {} -> {}",
            cell.borrow().state.label(),
            record.state.label()
        );
        cell.send_replace(record);
        true
    }

    /// Stop accepting publications. Existing subscribers keep the last value.
    pub fn close(&self) {
        let _cells = self
            .inner
            .cells
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}
