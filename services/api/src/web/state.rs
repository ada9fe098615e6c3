//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use sop_compliance_core::ports::{ChangeFeed, DatabaseService};
use sop_compliance_core::ComplianceService;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub feed: Arc<dyn ChangeFeed>,
    pub service: ComplianceService,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the compliance service to the given store and change feed.
    pub fn new(db: Arc<dyn DatabaseService>, feed: Arc<dyn ChangeFeed>, config: Config) -> Self {
        let service = ComplianceService::new(db.clone()).with_change_feed(feed.clone());
        Self {
            db,
            feed,
            service,
            config: Arc::new(config),
        }
    }
}
