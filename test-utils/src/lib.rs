//! A number of utilities useful for testing that we want to use in multiple crates

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use iceberg_kernel::engine::HeapBufferProvider;
use iceberg_kernel::expressions::{Literal, PartitionData};
use iceberg_kernel::manifest::{ContentFile, FileContent, FileFormat, ManifestEntry};
use iceberg_kernel::partition::{PartitionField, PartitionSpec, Transform};
use iceberg_kernel::schema::{DataType, MapType, NestedField, Schema, SchemaRef, StructType};
use iceberg_kernel::snapshot::{
    Snapshot, SnapshotRef, SnapshotResolver, TOTAL_DATA_FILES, TOTAL_DELETE_FILES,
    TOTAL_EQUALITY_DELETES, TOTAL_POSITION_DELETES, TOTAL_RECORDS,
};
use iceberg_kernel::table::{
    SchemaResolver, SnapshotSchema, TableHandle, TableMetadata, TableMetadataBuilder,
};
use iceberg_kernel::{FileIo, IcebergResult};
use indexmap::IndexMap;

pub const TABLE_LOCATION: &str = "s3://warehouse/db/events";
pub const METADATA_LOCATION: &str = "s3://warehouse/db/events/metadata/00003-abc.metadata.json";

/// `id long, data string, category string, ts timestamptz, props map<string, string>,
/// point struct<x double, y double>`
pub fn sample_schema(schema_id: i32) -> Schema {
    Schema::try_new(
        schema_id,
        [
            NestedField::required(1, "id", DataType::LONG),
            NestedField::optional(2, "data", DataType::STRING),
            NestedField::optional(3, "category", DataType::STRING),
            NestedField::optional(4, "ts", DataType::TIMESTAMPTZ),
            NestedField::optional(
                5,
                "props",
                MapType::new(6, DataType::STRING, 7, DataType::STRING, false),
            ),
            NestedField::optional(
                8,
                "point",
                StructType::new([
                    NestedField::required(9, "x", DataType::DOUBLE),
                    NestedField::required(10, "y", DataType::DOUBLE),
                ]),
            ),
        ],
    )
    .unwrap()
}

/// Identity partitioning on `category`
pub fn category_spec(spec_id: i32) -> PartitionSpec {
    PartitionSpec::new(
        spec_id,
        [PartitionField::new(3, 1000, "category", Transform::Identity)],
    )
}

/// A snapshot whose summary carries the given counters
pub fn snapshot(
    snapshot_id: i64,
    records: u64,
    data_files: u64,
    position_deletes: u64,
    equality_deletes: u64,
    delete_files: u64,
) -> Snapshot {
    Snapshot::new(snapshot_id, 1_700_000_000_000)
        .with_summary([
            (TOTAL_RECORDS, records.to_string()),
            (TOTAL_DATA_FILES, data_files.to_string()),
            (TOTAL_POSITION_DELETES, position_deletes.to_string()),
            (TOTAL_EQUALITY_DELETES, equality_deletes.to_string()),
            (TOTAL_DELETE_FILES, delete_files.to_string()),
        ])
        .with_schema_id(0)
}

/// A table at [`TABLE_LOCATION`] with [`sample_schema`], partitioned by [`category_spec`]. Its
/// file io knows no files.
pub fn table_builder() -> TableMetadataBuilder {
    TableMetadata::builder("db.events", TABLE_LOCATION)
        .with_metadata_location(METADATA_LOCATION)
        .with_file_io(Arc::new(StaticFileIo::default()))
        .with_schema(sample_schema(0), true)
        .with_spec(category_spec(0), true)
}

/// A parquet data file in the given `category` partition, with stats for `id` and `data`.
pub fn data_file(path: &str, records: i64, category: Option<&str>) -> ContentFile {
    let mut file = ContentFile::data(path, records, records * 64).with_partition(
        0,
        PartitionData::new([category.map(|c| Literal::String(c.to_string()))]),
    );
    file.column_sizes = Some(IndexMap::from([(1, records * 8), (2, records * 24)]));
    file.value_counts = Some(IndexMap::from([(1, records), (2, records)]));
    file.null_value_counts = Some(IndexMap::from([(1, 0), (2, 1)]));
    file.lower_bounds = Some(IndexMap::from([
        (1, Bytes::from(1i64.to_le_bytes().to_vec())),
        (2, Bytes::from_static(b"apple")),
    ]));
    file.upper_bounds = Some(IndexMap::from([
        (1, Bytes::from(records.to_le_bytes().to_vec())),
        (2, Bytes::from_static(b"zebra")),
    ]));
    file.split_offsets = Some(vec![Some(4)]);
    file.sort_order_id = Some(0);
    file
}

/// An equality delete file matching on `id`
pub fn equality_delete_file(path: &str, records: i64) -> ContentFile {
    let mut file = ContentFile::new(
        FileContent::EqualityDeletes,
        path,
        FileFormat::Parquet,
        records,
        records * 16,
    )
    .with_partition(0, PartitionData::new([None]));
    file.equality_ids = Some(vec![Some(1)]);
    file
}

pub fn added(files: impl IntoIterator<Item = ContentFile>) -> Vec<ManifestEntry> {
    files.into_iter().map(ManifestEntry::added).collect()
}

/// A [`FileIo`] that knows a fixed set of files and their lengths
#[derive(Debug, Default)]
pub struct StaticFileIo {
    files: HashMap<String, u64>,
}

impl StaticFileIo {
    pub fn with_file(mut self, location: impl Into<String>, length: u64) -> Self {
        self.files.insert(location.into(), length);
        self
    }
}

impl FileIo for StaticFileIo {
    fn file_length(&self, location: &str) -> IcebergResult<Option<u64>> {
        Ok(self.files.get(location).copied())
    }
}

/// Counts calls to a wrapped [`SchemaResolver`]
#[derive(Debug, Default)]
pub struct CountingSchemaResolver {
    calls: AtomicUsize,
}

impl CountingSchemaResolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SchemaResolver for CountingSchemaResolver {
    fn resolve(
        &self,
        table: &dyn TableHandle,
        snapshot: Option<&Snapshot>,
    ) -> IcebergResult<SchemaRef> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SnapshotSchema.resolve(table, snapshot)
    }
}

/// Counts calls to the table's current snapshot
#[derive(Debug, Default)]
pub struct CountingSnapshotResolver {
    calls: AtomicUsize,
}

impl CountingSnapshotResolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SnapshotResolver for CountingSnapshotResolver {
    fn resolve(&self, table: &dyn TableHandle) -> IcebergResult<Option<SnapshotRef>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        table.current_snapshot()
    }
}

/// A buffer provider that refuses to hand out more than `limit` bytes in total
pub fn bounded_provider(limit: usize) -> Arc<HeapBufferProvider> {
    Arc::new(HeapBufferProvider::with_limit(limit))
}
