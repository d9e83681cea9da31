//! # ckan-snapshot
//!
//! Keeps a local CSV snapshot of a CKAN DataStore resource up to date.
//!
//! Each run reads the previous snapshot, fetches only the records newer than
//! its watermark (falling back to a full paginated fetch when the filtered
//! query is unavailable), merges them in, and rewrites the snapshot together
//! with a small metadata file.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Snapshot   │──▶│    Fetch     │──▶│  Reconcile   │──▶│   Snapshot   │
//! │    reader    │   │ incr / full  │   │ keep/upd/add │   │    writer    │
//! └──────────────┘   └──────┬───────┘   └──────────────┘   └──────────────┘
//!                           │
//!                    ┌──────▼───────┐
//!                    │  CKAN client │
//!                    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ckan-snapshot sync            # incremental when a snapshot exists
//! ckan-snapshot sync --full     # ignore the watermark
//! ckan-snapshot status          # what is on disk
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and defaults |
//! | [`models`] | Fixed record shape and identity key |
//! | [`client`] | CKAN DataStore HTTP transport |
//! | [`fetch`] | Incremental / full fetch strategy with retry |
//! | [`reconcile`] | Merge of snapshot rows with fresh records |
//! | [`snapshot`] | CSV snapshot and metadata persistence |
//! | [`sync`] | One end-to-end run |
//! | [`stats`] | Snapshot status overview |
//! | [`progress`] | Fetch progress reporting |

pub mod client;
pub mod config;
pub mod fetch;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod snapshot;
pub mod stats;
pub mod sync;
