//! # Recall
//!
//! A semantic item store: capture short texts, deduplicate them by
//! identity, embed them, and answer questions over the distinct items.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ Capture      │──▶│ Recall service   │──▶│ Item store   │
//! │ (seen-set)   │   │ analyze + embed  │   │ insert/kNN   │
//! └──────────────┘   └────────┬─────────┘   └──────┬───────┘
//!                             │                    │
//!                             ▼                    ▼
//!                      ┌─────────────┐      ┌─────────────┐
//!                      │ Providers   │      │ Widening    │
//!                      │ embed/chat  │      │ retrieval   │
//!                      └─────────────┘      └─────────────┘
//! ```
//!
//! Runtime-free logic (normalization, fingerprints, the store, retrieval,
//! the seen-set) lives in the `recall-core` crate; this crate adds config,
//! provider adapters, the service, the HTTP server, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`logging`] | Tracing subscriber setup |
//! | [`provider`] | OpenAI-compatible embedding and completion adapters |
//! | [`analysis`] | Insert-time content verdicts |
//! | [`service`] | Insert and query orchestration |
//! | [`server`] | HTTP API |
//! | [`client`] | Capture session and API client |

pub mod analysis;
pub mod client;
pub mod config;
pub mod logging;
pub mod provider;
pub mod server;
pub mod service;

pub use recall_core;
