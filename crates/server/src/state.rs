// Shared application state handed to every handler.

use std::sync::Arc;

use coscribe_engine::capability::{CapabilityResolver, MembershipStore};
use coscribe_engine::config::EngineConfig;
use coscribe_engine::presence::PresenceStore;
use coscribe_engine::store::MemoryStore;
use coscribe_engine::sync::DocSynchronizer;
use coscribe_engine::tracker::ChangeTracker;

#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<DocSynchronizer>,
    pub tracker: Arc<ChangeTracker>,
    pub presence: Arc<PresenceStore>,
    pub membership: MembershipStore,
    pub engine_config: Arc<EngineConfig>,
}

impl AppState {
    /// Wires the engine over the in-memory backing store.
    pub fn new(engine_config: EngineConfig) -> Self {
        let backend = Arc::new(MemoryStore::new());
        let membership = MembershipStore::default();
        let capabilities: Arc<dyn CapabilityResolver> = Arc::new(membership.clone());

        let sync = Arc::new(DocSynchronizer::new(backend.clone(), capabilities.clone()));
        let tracker =
            Arc::new(ChangeTracker::new(backend.clone(), capabilities, sync.clone()));
        let presence =
            Arc::new(PresenceStore::new(backend, engine_config.presence_stale_after()));

        Self { sync, tracker, presence, membership, engine_config: Arc::new(engine_config) }
    }
}
