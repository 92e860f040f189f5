//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::MatchRegistry;
use crate::util::id::{FlakeIdGenerator, IdError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub matches: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, IdError> {
        let config = Arc::new(config);

        // Initialize match registry with its id source and tick clock
        let ids = Arc::new(FlakeIdGenerator::new(config.machine_id)?);
        let matches = Arc::new(MatchRegistry::new(ids, config.tick_period()));

        Ok(Self { config, matches })
    }
}
