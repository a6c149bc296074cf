//! Application state management

use lighthouse_core::DeviceStore;
use lighthouse_discovery::{CommandProber, NetworkEnumerator, PresenceService};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Presence tracking over the process-wide store
    pub presence: Arc<PresenceService>,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Create application state around an already opened store
    pub fn new(config: Config, store: Arc<DeviceStore>) -> Arc<Self> {
        let prober = CommandProber::new(config.probe.program.clone(), config.probe.args.clone());
        info!(
            program = %prober.program(),
            stale_after_minutes = config.presence.stale_after_minutes,
            "Presence service configured"
        );

        let presence = PresenceService::new(
            store,
            Arc::new(prober),
            NetworkEnumerator::system(),
            config.presence.stale_after_minutes,
        );

        Self::with_presence(config, Arc::new(presence))
    }

    pub fn with_presence(config: Config, presence: Arc<PresenceService>) -> Arc<Self> {
        Arc::new(Self { presence, config })
    }
}
