//! Parlo core: domain logic for the speaking-practice service.
//!
//! Holds the session ledger, the context retrieval engine, learner
//! analytics, the learning-material corpus and the collaborator seams
//! (stores, semantic ranker, chat client). Transport and persistence
//! backends live in the `parlo-api` service crate.

pub mod analytics;
pub mod ledger;
pub mod llm;
pub mod materials;
pub mod prompts;
pub mod retrieval;
pub mod session;
pub mod store;
