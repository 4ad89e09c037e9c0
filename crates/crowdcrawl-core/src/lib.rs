//! # crowdcrawl core
//!
//! Runtime-light reconciliation logic for a crowd-sourced crawler: the data
//! model, batch-to-state reconciliation with domain link graph, curated-term
//! merge, and the collaborator traits both algorithms are written against.
//!
//! This crate performs no I/O of its own. Storage, queues and the blacklist
//! are reached through the traits in [`store`]; in-memory implementations
//! live in [`store::memory`].

pub mod blacklist;
pub mod classify;
pub mod curate;
pub mod links;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod tokenize;
