//! Parlo API Library Crate
//!
//! This library contains all the logic for the Parlo web service: the
//! application state, configuration, persistence backends, REST handlers,
//! the voice WebSocket bridge, and routing. The `api` binary is a thin
//! wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod seed;
pub mod state;
pub mod store;
pub mod tts;
pub mod ws;
