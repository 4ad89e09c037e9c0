//! # Crowdcrawl
//!
//! Ingestion and curation backend for a crowd-sourced web crawler.
//!
//! Crawling clients upload batches of crawl results. The ingestion driver
//! reconciles them into a deduplicated URL frontier and a domain link
//! graph, and queues newly discovered URLs for crawling. Separately, user
//! curation edits are merged into the shared term index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │   Batches    │──▶│  Ingestion   │──▶│ urls             │
//! │ (uploaded)   │   │  driver      │   │ domain_links     │
//! └──────────────┘   └──────────────┘   │ url_queue        │
//!                                       └──────────────────┘
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  Curation    │──▶│  Curation    │──▶│ curations        │
//! │  request     │   │  merger      │   │ index_documents  │
//! └──────────────┘   └──────────────┘   └──────────────────┘
//! ```
//!
//! Reconciliation and curation logic live in `crowdcrawl-core`; this crate
//! wires them to SQLite, configuration, logging and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! crowdcrawl init
//! crowdcrawl batch import uploads/*.json
//! crowdcrawl ingest                       # runs until Ctrl-C
//! crowdcrawl curate request.json --user alice
//! crowdcrawl stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite collaborator implementations |
//! | [`blacklist`] | File and HTTP blacklist sources |
//! | [`driver`] | Ingestion driver loop |
//! | [`ingest`] | Import, reconcile and ingest commands |
//! | [`curation`] | Curate command |
//! | [`stats`] | Stats and queue commands |
//! | [`logging`] | Tracing subscriber setup |

pub mod blacklist;
pub mod config;
pub mod curation;
pub mod db;
pub mod driver;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod sqlite_store;
pub mod stats;
