use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth::SessionCache;
use crate::engine::fare::FareCalculator;
use crate::models::assignment::Assignment;
use crate::observability::metrics::Metrics;
use crate::store::MemoryStore;

pub struct AppState {
    pub store: MemoryStore,
    pub sessions: SessionCache,
    pub fares: FareCalculator,
    pub batch_size: usize,
    /// Committed assignments keyed by ride id.
    pub assignments: DashMap<Uuid, Assignment>,
    pub assignment_events_tx: broadcast::Sender<Assignment>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(batch_size: usize, event_buffer_size: usize, fares: FareCalculator) -> Self {
        let (assignment_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            store: MemoryStore::new(),
            sessions: SessionCache::new(),
            fares,
            batch_size,
            assignments: DashMap::new(),
            assignment_events_tx,
            metrics: Metrics::new(),
        }
    }
}
