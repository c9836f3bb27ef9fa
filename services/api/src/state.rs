//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the ledger, retrieval engine and service clients.

use crate::config::Config;
use parlo_core::{ledger::Ledger, llm::ChatClient, materials::MaterialStore, retrieval::RetrievalEngine};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers and connection contexts.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub retrieval: Arc<RetrievalEngine>,
    pub materials: Arc<dyn MaterialStore>,
    /// Chat client for the think step; absent when no LLM key is configured,
    /// in which case the think endpoint reports unavailability.
    pub chat: Option<Arc<dyn ChatClient>>,
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}
