//! Bizsync Server - keeps business records and a workspace directory in sync.
//!
//! The server runs push-then-pull sync cycles per organization and resource
//! type, either on request over HTTP or on a fixed schedule. Decisions come
//! from `bizsync-engine`; this crate supplies the remote adapters, the
//! Postgres stores and the trigger surface.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod google;
pub mod handlers;
pub mod routes;
pub mod store;
pub mod sync;

use std::sync::Arc;

use crate::config::Config;
use crate::store::{SyncLogSink, WatermarkStore};
use crate::sync::{RunRegistry, SyncEngine};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<SyncEngine>,
    pub runs: RunRegistry,
    pub watermarks: Arc<dyn WatermarkStore>,
    pub log: Arc<dyn SyncLogSink>,
}
