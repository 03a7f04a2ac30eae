//! # Docshelf
//!
//! A document catalog over a remote content store, with a reactive state
//! core and an enrichment pipeline.
//!
//! Docshelf keeps a catalog of documents as three kinds of remote objects:
//! the blob under `docs/`, a metadata sidecar under `meta/`, and one entry in
//! the shared `index.json`. Every remote write is conditional on an opaque
//! version token, so concurrent writers surface as conflicts instead of
//! silently overwriting each other. Uploads pass through an enrichment
//! pipeline that extracts text (plain, PDF, DOCX) and optionally summarizes
//! it through a hosted model.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │ UploadForm │──▶│ UploadCoordinator │──▶│  ObjectStore   │
//! │  (cells)   │   │ confirm→enrich→  │   │ docs/ meta/    │
//! └────────────┘   │ upload→index     │   │ index.json     │
//!                  └────────┬─────────┘   └───────────────┘
//!                           │ observable stage / progress /
//!                           ▼ document list
//!                  ┌──────────────────┐
//!                  │   CLI (shelf)    │
//!                  └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`cell`] | Observable value cells and derived computations |
//! | [`config`] | TOML configuration parsing |
//! | [`store`] | Remote object store trait, HTTP and in-memory backends |
//! | [`index`] | Document records and index synchronization |
//! | [`extract`] | Text extraction (plain, PDF, DOCX) |
//! | [`summarize`] | Hosted summarization client |
//! | [`enrich`] | Extract-then-summarize pipeline with stage reporting |
//! | [`upload`] | Upload and delete workflow orchestration |
//! | [`tokenize`] | Search token derivation |
//! | [`error`] | Error taxonomy and retryability |

pub mod cell;
pub mod config;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod index;
pub mod store;
pub mod summarize;
pub mod tokenize;
pub mod upload;

pub use cell::{DeriveOptions, DerivedCell, Disposer, ValueCell};
pub use enrich::Stage;
pub use error::{Error, Result};
pub use index::{DocStatus, Document};
pub use store::{ObjectStore, VersionToken};
pub use upload::{UploadCoordinator, UploadForm, UploadOutcome};
