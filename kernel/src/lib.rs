//! Iceberg Kernel resolves the versioned metadata of an Iceberg table into the artifacts a query
//! engine's planner and executor consume.
//!
//! The kernel does not decide which snapshot a query sees, does not read raw bytes from storage
//! and does not prune files by predicate. Those concerns live with the engine, which hands the
//! kernel a [`TableHandle`] and receives back:
//!
//! - a [`DatasetMetadata`] value built by [`DatasetMetadataBuilder`]: statistics, the converted
//!   arrow schema, partition columns, serialized partition specs and schema, snapshot id and the
//!   metadata file location. Feature capabilities are checked by the [`CapabilityGate`] before any
//!   of this is produced.
//! - a one-chunk [`PartitionChunkListing`] from [`SplitListingBuilder`] pointing at the metadata
//!   file.
//! - introspection rows from the [`ManifestProjectionEngine`], one row per data or delete file
//!   referenced by a manifest, written into typed column vectors and exported as arrow.
//!
//! [`TableHandle`]: crate::table::TableHandle
//! [`DatasetMetadata`]: crate::dataset::DatasetMetadata
//! [`DatasetMetadataBuilder`]: crate::dataset::DatasetMetadataBuilder
//! [`CapabilityGate`]: crate::table_features::CapabilityGate
//! [`PartitionChunkListing`]: crate::splits::PartitionChunkListing
//! [`SplitListingBuilder`]: crate::splits::SplitListingBuilder
//! [`ManifestProjectionEngine`]: crate::projection::ManifestProjectionEngine

#![warn(
    unreachable_pub,
    trivial_numeric_casts,
    unused_extern_crates,
    rust_2018_idioms,
    rust_2021_compatibility,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod arrow_compat;
pub use arrow_compat::*;

pub mod dataset;
pub mod engine;
pub mod error;
pub mod expressions;
pub mod manifest;
pub mod options;
pub mod partition;
pub mod projection;
pub mod schema;
pub mod serde_utils;
pub mod snapshot;
pub mod splits;
pub mod table;
pub mod table_features;
pub mod table_files;

pub(crate) mod utils;

pub use dataset::{DatasetMetadata, DatasetMetadataBuilder, DatasetStats};
pub use error::{Error, IcebergResult};
pub use options::{OptionResolver, ScanOptions};
pub use projection::{EntryState, ManifestProjectionEngine, ProjectedField};
pub use snapshot::{Snapshot, SnapshotRef, SnapshotResolver};
pub use splits::SplitListingBuilder;
pub use table::{FileIo, SchemaResolver, TableHandle};
pub use table_features::{CapabilityGate, GateDecision, UnsupportedFeature};

/// Sentinel snapshot id reported for a table that has no snapshot yet.
pub const NO_SNAPSHOT_ID: i64 = -1;
