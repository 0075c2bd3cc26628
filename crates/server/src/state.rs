use std::sync::Arc;
use triage_core::{Config, TriageEngine};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<TriageEngine>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<TriageEngine>, ws_broadcaster: WsBroadcaster) -> Self {
        Self {
            config,
            engine,
            ws_broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &TriageEngine {
        self.engine.as_ref()
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
