//! Scan work units handed to the planner. Per-file expansion happens in a later scan stage that
//! reads the manifests itself, so a table always lists as a single split carrying the location of
//! its metadata file.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::expressions::Literal;
use crate::table::TableHandle;
use crate::IcebergResult;

/// A host that is preferred for executing a split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplitAffinity {
    pub host: String,
    pub factor: f64,
}

/// The payload of an iceberg split: where the scan stage starts reading from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPayload {
    pub path: String,
}

impl SplitPayload {
    pub fn to_bytes(&self) -> IcebergResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> IcebergResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    pub affinities: Vec<DatasetSplitAffinity>,
    pub size_in_bytes: u64,
    pub record_count: u64,
    /// Format-specific payload, opaque to the planner
    pub extended_property: Vec<u8>,
}

/// The value of one partition column shared by every split of a chunk
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionValue {
    pub column: String,
    pub value: Option<Literal>,
}

/// Splits that share the same partition values
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionChunk {
    pub partition_values: Vec<PartitionValue>,
    pub splits: Vec<DatasetSplit>,
}

/// Splits grouped into chunks by partition values, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionChunkListing {
    chunks: Vec<PartitionChunk>,
}

impl PartitionChunkListing {
    /// Add `split` to the chunk for `partition_values`, starting a new chunk if there is none.
    pub fn put(&mut self, partition_values: Vec<PartitionValue>, split: DatasetSplit) {
        match self
            .chunks
            .iter_mut()
            .find(|chunk| chunk.partition_values == partition_values)
        {
            Some(chunk) => chunk.splits.push(split),
            None => self.chunks.push(PartitionChunk {
                partition_values,
                splits: vec![split],
            }),
        }
    }

    pub fn chunks(&self) -> &[PartitionChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn into_chunks(self) -> Vec<PartitionChunk> {
        self.chunks
    }
}

/// Lists a table as one unpartitioned chunk of one split. Costs the same whatever the table's
/// size.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitListingBuilder;

impl SplitListingBuilder {
    pub fn list(table: &dyn TableHandle) -> IcebergResult<PartitionChunkListing> {
        let payload = SplitPayload {
            path: table.metadata_location().to_string(),
        };
        debug!(table = table.name(), path = %payload.path, "listing metadata split");
        let split = DatasetSplit {
            affinities: vec![],
            size_in_bytes: 0,
            record_count: 0,
            extended_property: payload.to_bytes()?,
        };
        let mut listing = PartitionChunkListing::default();
        listing.put(vec![], split);
        Ok(listing)
    }
}
