//! Dataset metadata: everything a planner needs to know about a table at a resolved snapshot,
//! assembled once by a [`DatasetMetadataBuilder`] and immutable afterwards.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumString};
use tracing::{debug, info, warn};

use crate::arrow::datatypes::SchemaRef as ArrowSchemaRef;
use crate::options::ScanOptions;
use crate::partition::filter_specs_by_schema;
use crate::schema::arrow_conversion::SchemaConverter;
use crate::serde_utils::{serialize_partition_specs, serialize_schema};
use crate::snapshot::{CurrentSnapshot, Snapshot, SnapshotCounters, SnapshotResolver};
use crate::table::{SchemaResolver, SnapshotSchema, TableHandle};
use crate::table_features::{CapabilityGate, GateDecision};
use crate::utils::parent_location;
use crate::{IcebergResult, NO_SNAPSHOT_ID};

/// Relative per-row cost the planner assigns to reading a kind of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ScanCostFactor {
    /// Compressed columnar data files
    Parquet,
    /// Plain bookkeeping: manifests and delete manifests
    Easy,
}

impl ScanCostFactor {
    pub fn factor(&self) -> f64 {
        match self {
            ScanCostFactor::Parquet => 1.0,
            ScanCostFactor::Easy => 0.25,
        }
    }
}

/// A record count estimate and the cost weight of scanning it. Planner input only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DatasetStats {
    pub record_count: u64,
    /// Whether `record_count` is known exactly rather than estimated
    pub exact: bool,
    pub scan_factor: f64,
}

impl DatasetStats {
    pub fn new(record_count: u64, factor: ScanCostFactor) -> Self {
        Self {
            record_count,
            exact: false,
            scan_factor: factor.factor(),
        }
    }

    pub fn exact(record_count: u64, factor: ScanCostFactor) -> Self {
        Self {
            exact: true,
            ..Self::new(record_count, factor)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, StrumDisplay)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum FileType {
    Iceberg,
}

/// Where the dataset lives and what format it is in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub file_type: FileType,
    pub location: String,
    /// Last modification time, in milliseconds since the epoch
    pub ctime: i64,
}

/// Column path and field id, for every (nested) column of the table's current schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnId {
    pub schema_path: String,
    pub id: i32,
}

/// Format-specific attributes carried opaquely alongside the dataset metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetExtraInfo {
    pub selection_root: String,
    pub column_ids: Vec<ColumnId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_stats_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_stats_file_size: Option<u64>,
}

impl DatasetExtraInfo {
    pub fn to_bytes(&self) -> IcebergResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> IcebergResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Location of the partition statistics file written for `snapshot_id`, next to the metadata file
pub fn partition_stats_location(metadata_location: &str, snapshot_id: i64) -> String {
    format!(
        "{}partition_stats_metadata_{snapshot_id}.json",
        parent_location(metadata_location)
    )
}

/// The resolved metadata of a table. Built by [`DatasetMetadataBuilder`]; a new resolution
/// produces a new value.
#[derive(Debug, Clone)]
pub struct DatasetMetadata {
    file_config: FileConfig,
    row_stats: DatasetStats,
    manifest_stats: DatasetStats,
    delete_stats: DatasetStats,
    equality_delete_stats: DatasetStats,
    delete_manifest_stats: DatasetStats,
    schema: ArrowSchemaRef,
    partition_columns: Vec<String>,
    extra_info: DatasetExtraInfo,
    metadata_location: String,
    snapshot_id: i64,
    partition_specs: Vec<u8>,
    iceberg_schema: String,
    modification_time: i64,
}

impl DatasetMetadata {
    pub fn file_config(&self) -> &FileConfig {
        &self.file_config
    }

    /// Records in the snapshot, weighted as columnar data
    pub fn row_stats(&self) -> &DatasetStats {
        &self.row_stats
    }

    /// Data files in the snapshot, weighted as manifest bookkeeping
    pub fn manifest_stats(&self) -> &DatasetStats {
        &self.manifest_stats
    }

    /// Position and equality deletes combined
    pub fn delete_stats(&self) -> &DatasetStats {
        &self.delete_stats
    }

    pub fn equality_delete_stats(&self) -> &DatasetStats {
        &self.equality_delete_stats
    }

    /// Delete files in the snapshot, weighted as manifest bookkeeping
    pub fn delete_manifest_stats(&self) -> &DatasetStats {
        &self.delete_manifest_stats
    }

    pub fn schema(&self) -> &ArrowSchemaRef {
        &self.schema
    }

    pub fn partition_columns(&self) -> &[String] {
        &self.partition_columns
    }

    pub fn extra_info(&self) -> &DatasetExtraInfo {
        &self.extra_info
    }

    pub fn metadata_location(&self) -> &str {
        &self.metadata_location
    }

    /// The resolved snapshot's id, or [`NO_SNAPSHOT_ID`] for a table without snapshots
    pub fn snapshot_id(&self) -> i64 {
        self.snapshot_id
    }

    /// JSON map from spec id to partition spec, restricted to specs the resolved schema can
    /// satisfy
    pub fn partition_specs(&self) -> &[u8] {
        &self.partition_specs
    }

    /// The resolved schema as iceberg schema JSON
    pub fn iceberg_schema(&self) -> &str {
        &self.iceberg_schema
    }

    pub fn modification_time(&self) -> i64 {
        self.modification_time
    }
}

/// Resolves a table into [`DatasetMetadata`].
///
/// The snapshot is resolved exactly once per [`build`](Self::build). The capability gate runs on
/// that snapshot's counters before the schema is resolved, so a rejected table costs no schema or
/// spec work.
pub struct DatasetMetadataBuilder {
    options: ScanOptions,
    snapshot_resolver: Arc<dyn SnapshotResolver>,
    schema_resolver: Arc<dyn SchemaResolver>,
}

impl DatasetMetadataBuilder {
    /// A builder resolving the current snapshot and the schema it was written with.
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            snapshot_resolver: Arc::new(CurrentSnapshot),
            schema_resolver: Arc::new(SnapshotSchema),
        }
    }

    #[must_use]
    pub fn with_snapshot_resolver(mut self, resolver: Arc<dyn SnapshotResolver>) -> Self {
        self.snapshot_resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_schema_resolver(mut self, resolver: Arc<dyn SchemaResolver>) -> Self {
        self.schema_resolver = resolver;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn build(&self, table: &dyn TableHandle) -> IcebergResult<DatasetMetadata> {
        let snapshot = self.snapshot_resolver.resolve(table)?;
        let snapshot = snapshot.as_deref();
        let counters = SnapshotCounters::from_snapshot(snapshot)?;

        if let GateDecision::Reject(reason) = CapabilityGate::check(&counters, &self.options) {
            warn!(
                table = table.name(),
                feature = %reason.feature(),
                option = reason.feature().option_key(),
                "rejecting table: {reason}"
            );
            return Err(reason.into());
        }

        let schema = self.schema_resolver.resolve(table, snapshot)?;
        let converter = SchemaConverter::new(table.name())
            .with_map_type_enabled(self.options.map_data_type);
        let arrow_schema = Arc::new(converter.from_iceberg(&schema)?);
        let default_spec = table.default_spec()?;
        let partition_columns = converter.partition_columns(&default_spec, &schema);

        let mut extra_info = DatasetExtraInfo {
            selection_root: table.location().to_string(),
            column_ids: table
                .current_schema()?
                .name_to_id()
                .iter()
                .map(|(path, id)| ColumnId {
                    schema_path: path.clone(),
                    id: *id,
                })
                .collect(),
            ..Default::default()
        };
        if let Some(snapshot) = snapshot.filter(|_| !default_spec.is_unpartitioned()) {
            self.find_partition_stats(table, snapshot, &mut extra_info)?;
        }

        let specs = table.specs()?;
        let specs = filter_specs_by_schema(&specs, &schema);
        let partition_specs = serialize_partition_specs(&specs)?;
        let iceberg_schema = serialize_schema(&schema)?;

        let snapshot_id = snapshot.map_or(NO_SNAPSHOT_ID, |s| s.snapshot_id);
        info!(
            table = table.name(),
            snapshot_id,
            records = counters.total_records,
            data_files = counters.total_data_files,
            specs = specs.len(),
            "resolved dataset metadata"
        );
        Ok(DatasetMetadata {
            file_config: FileConfig {
                file_type: FileType::Iceberg,
                location: table.location().to_string(),
                ctime: counters.last_modified_ms,
            },
            row_stats: DatasetStats::exact(counters.total_records, ScanCostFactor::Parquet),
            manifest_stats: DatasetStats::new(counters.total_data_files, ScanCostFactor::Easy),
            delete_stats: DatasetStats::new(
                counters.total_deletes()?,
                ScanCostFactor::Parquet,
            ),
            equality_delete_stats: DatasetStats::new(
                counters.total_equality_deletes,
                ScanCostFactor::Parquet,
            ),
            delete_manifest_stats: DatasetStats::new(
                counters.total_delete_files,
                ScanCostFactor::Easy,
            ),
            schema: arrow_schema,
            partition_columns,
            extra_info,
            metadata_location: table.metadata_location().to_string(),
            snapshot_id,
            partition_specs,
            iceberg_schema,
            modification_time: counters.last_modified_ms,
        })
    }

    fn find_partition_stats(
        &self,
        table: &dyn TableHandle,
        snapshot: &Snapshot,
        extra_info: &mut DatasetExtraInfo,
    ) -> IcebergResult<()> {
        let location = partition_stats_location(table.metadata_location(), snapshot.snapshot_id);
        match table.io().file_length(&location)? {
            Some(length) => {
                debug!(location = %location, length, "found partition stats file");
                extra_info.partition_stats_file = Some(location);
                extra_info.partition_stats_file_size = Some(length);
            }
            None => debug!(location = %location, "no partition stats file"),
        }
        Ok(())
    }
}
