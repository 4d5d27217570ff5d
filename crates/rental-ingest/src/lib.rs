//! Snapshot extraction.
//!
//! Loads the raw listings, calendar and reviews collections from a
//! directory-backed document store into Polars DataFrames.
//!
//! # Example
//!
//! ```ignore
//! use rental_ingest::SnapshotStore;
//!
//! let store = SnapshotStore::connect("file:///data/snapshots", "madrid")?;
//! let listings = store.fetch("listings")?;
//! store.disconnect();
//! ```

mod error;
mod reader;
mod store;

// === Error Types ===
pub use error::{IngestError, Result};

// === Readers ===
pub use reader::{read_csv_collection, read_json_collection};

// === Store ===
pub use store::SnapshotStore;
