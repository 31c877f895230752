//! # ingest-files
//!
//! Watches a directory for new text and PDF files and loads them into a
//! Postgres/pgvector table as embedded, overlapping token-window chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌─────────────────────┐
//! │ Watcher  │──▶│ Debounce │──▶│ Dispatcher │──▶│ FileProcessor       │
//! │ (notify) │   │ per path │   │ N permits  │   │ extract → chunk →   │
//! └──────────┘   └──────────┘   └────────────┘   │ token → embed → txn │
//!                                                └─────────┬───────────┘
//!                                        ┌─────────────────┴──┐
//!                                        ▼                    ▼
//!                                  ┌───────────┐       ┌────────────┐
//!                                  │  Router   │       │  Postgres  │
//!                                  │ (HTTP)    │       │ (pgvector) │
//!                                  └───────────┘       └────────────┘
//! ```
//!
//! Each file is handled independently: a failure is logged with the file
//! name and never stops the watcher, and a file's chunks are written in a
//! single transaction so it is either fully present or absent.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`extract`] | Text and PDF extraction |
//! | [`chunk`] | Token-window chunking |
//! | [`embedding`] | Token + embedding router client |
//! | [`store`] | Transactional chunk storage |
//! | [`processor`] | Per-file pipeline |
//! | [`debounce`] | Per-path event coalescing |
//! | [`dispatch`] | Bounded-concurrency task dispatch |
//! | [`watcher`] | Directory watching and scanning |
//! | [`server`] | Liveness endpoint |
//! | [`logging`] | Tracing subscriber setup |
//! | [`error`] | Error types |

pub mod chunk;
pub mod config;
pub mod debounce;
pub mod dispatch;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod logging;
pub mod models;
pub mod processor;
pub mod server;
pub mod store;
pub mod watcher;
