use std::sync::Arc;

use iceberg_kernel::dataset::{FileType, ScanCostFactor};
use iceberg_kernel::partition::{PartitionField, PartitionSpec, Transform};
use iceberg_kernel::schema::{DataType, NestedField, Schema};
use iceberg_kernel::serde_utils::{deserialize_partition_specs, deserialize_schema};
use iceberg_kernel::snapshot::{
    PinnedSnapshot, Snapshot, TOTAL_DATA_FILES, TOTAL_DELETE_FILES, TOTAL_RECORDS,
};
use iceberg_kernel::splits::SplitPayload;
use iceberg_kernel::table::TableMetadata;
use iceberg_kernel::{
    DatasetMetadataBuilder, Error, ScanOptions, SplitListingBuilder, UnsupportedFeature,
    NO_SNAPSHOT_ID,
};
use rstest::rstest;
use test_utils::{
    sample_schema, snapshot, table_builder, CountingSchemaResolver, CountingSnapshotResolver,
    StaticFileIo, METADATA_LOCATION, TABLE_LOCATION,
};

#[test_log::test]
fn build_and_list_partitioned_table() {
    let schema = Schema::try_new(
        0,
        [
            NestedField::required(1, "id", DataType::LONG),
            NestedField::optional(2, "region", DataType::INT),
        ],
    )
    .unwrap();
    let snapshot = Snapshot::new(42, 1_700_000_000_000)
        .with_summary([
            (TOTAL_RECORDS, "100"),
            (TOTAL_DATA_FILES, "2"),
            (TOTAL_DELETE_FILES, "0"),
        ])
        .with_schema_id(0);
    let table = TableMetadata::builder("db.regions", "s3://warehouse/db/regions")
        .with_schema(schema, true)
        .with_spec(
            PartitionSpec::new(0, [PartitionField::new(2, 1000, "region", Transform::Identity)]),
            true,
        )
        .with_snapshot(snapshot, true)
        .with_file_io(Arc::new(StaticFileIo::default()))
        .build()
        .unwrap();

    let metadata = DatasetMetadataBuilder::new(ScanOptions::default())
        .build(&table)
        .unwrap();
    assert_eq!(metadata.row_stats().record_count, 100);
    assert!(metadata.row_stats().exact);
    assert_eq!(
        metadata.row_stats().scan_factor,
        ScanCostFactor::Parquet.factor()
    );
    assert_eq!(metadata.manifest_stats().record_count, 2);
    assert_eq!(
        metadata.manifest_stats().scan_factor,
        ScanCostFactor::Easy.factor()
    );
    assert_eq!(metadata.delete_stats().record_count, 0);
    assert_eq!(metadata.equality_delete_stats().record_count, 0);
    assert_eq!(metadata.delete_manifest_stats().record_count, 0);
    assert_eq!(metadata.snapshot_id(), 42);
    assert_eq!(metadata.modification_time(), 1_700_000_000_000);
    assert_eq!(metadata.partition_columns(), ["region"]);
    assert_eq!(metadata.schema().fields().len(), 2);
    assert_eq!(metadata.file_config().file_type, FileType::Iceberg);
    assert_eq!(metadata.file_config().location, "s3://warehouse/db/regions");
    assert_eq!(
        metadata.metadata_location(),
        "s3://warehouse/db/regions/metadata/v1.metadata.json"
    );

    let listing = SplitListingBuilder::list(&table).unwrap();
    assert_eq!(listing.len(), 1);
    let splits = &listing.chunks()[0].splits;
    assert_eq!(splits.len(), 1);
    let payload = SplitPayload::from_bytes(&splits[0].extended_property).unwrap();
    assert_eq!(payload.path, metadata.metadata_location());
}

#[test]
fn table_without_snapshot() {
    let table = table_builder().build().unwrap();
    let metadata = DatasetMetadataBuilder::new(ScanOptions::default())
        .build(&table)
        .unwrap();
    assert_eq!(metadata.snapshot_id(), NO_SNAPSHOT_ID);
    assert_eq!(metadata.row_stats().record_count, 0);
    assert_eq!(metadata.manifest_stats().record_count, 0);
    assert_eq!(metadata.delete_stats().record_count, 0);
    assert_eq!(metadata.modification_time(), 0);
    assert_eq!(metadata.extra_info().partition_stats_file, None);
}

#[rstest]
#[test_log::test]
fn no_deletes_never_rejected(
    #[values(false, true)] merge_on_read: bool,
    #[values(false, true)] equality_deletes: bool,
) {
    let table = table_builder()
        .with_snapshot(snapshot(1, 10, 1, 0, 0, 0), true)
        .build()
        .unwrap();
    let options = ScanOptions::default()
        .with_merge_on_read_scan(merge_on_read)
        .with_equality_delete_scan(equality_deletes);
    assert!(DatasetMetadataBuilder::new(options).build(&table).is_ok());
}

#[test_log::test]
fn delete_files_rejected_before_schema_resolution() {
    let table = table_builder()
        .with_snapshot(snapshot(1, 10, 1, 5, 0, 1), true)
        .build()
        .unwrap();
    let schemas = Arc::new(CountingSchemaResolver::default());
    let snapshots = Arc::new(CountingSnapshotResolver::default());
    let err = DatasetMetadataBuilder::new(ScanOptions::default())
        .with_schema_resolver(schemas.clone())
        .with_snapshot_resolver(snapshots.clone())
        .build(&table)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedTableFeature(UnsupportedFeature::DeleteFiles)
    ));
    assert_eq!(
        err.to_string(),
        "Iceberg V2 tables with delete files are not supported."
    );
    assert_eq!(schemas.calls(), 0);
    assert_eq!(snapshots.calls(), 1);
}

#[rstest]
#[case(false, false, Some(UnsupportedFeature::DeleteFiles))]
#[case(true, false, Some(UnsupportedFeature::EqualityDeletes))]
#[case(false, true, Some(UnsupportedFeature::DeleteFiles))]
#[case(true, true, None)]
fn equality_deletes_gate(
    #[case] merge_on_read: bool,
    #[case] equality_deletes: bool,
    #[case] expected: Option<UnsupportedFeature>,
) {
    let table = table_builder()
        .with_snapshot(snapshot(1, 10, 1, 0, 3, 1), true)
        .build()
        .unwrap();
    let options = ScanOptions::from([
        (
            iceberg_kernel::options::MERGE_ON_READ_SCAN,
            merge_on_read.to_string(),
        ),
        (
            iceberg_kernel::options::EQUALITY_DELETE_SCAN,
            equality_deletes.to_string(),
        ),
    ]);
    let schemas = Arc::new(CountingSchemaResolver::default());
    let result = DatasetMetadataBuilder::new(options)
        .with_schema_resolver(schemas.clone())
        .build(&table);
    match expected {
        Some(feature) => {
            assert!(matches!(
                result,
                Err(Error::UnsupportedTableFeature(f)) if f == feature
            ));
            assert_eq!(schemas.calls(), 0);
        }
        None => {
            let metadata = result.unwrap();
            assert_eq!(metadata.delete_stats().record_count, 3);
            assert_eq!(metadata.equality_delete_stats().record_count, 3);
            assert_eq!(metadata.delete_manifest_stats().record_count, 1);
            assert_eq!(schemas.calls(), 1);
        }
    }
}

#[test_log::test]
fn specs_referencing_dropped_columns_are_excluded() {
    let legacy = Schema::try_new(
        0,
        sample_schema(0)
            .fields()
            .cloned()
            .chain([NestedField::optional(11, "legacy", DataType::INT)]),
    )
    .unwrap();
    let current = sample_schema(1);
    let table = TableMetadata::builder("db.events", TABLE_LOCATION)
        .with_schema(legacy, false)
        .with_schema(current, true)
        .with_spec(
            PartitionSpec::new(0, [PartitionField::new(11, 1000, "legacy", Transform::Identity)]),
            false,
        )
        .with_spec(test_utils::category_spec(1), true)
        .with_snapshot(snapshot(5, 10, 1, 0, 0, 0).with_schema_id(1), true)
        .with_file_io(Arc::new(StaticFileIo::default()))
        .build()
        .unwrap();

    let metadata = DatasetMetadataBuilder::new(ScanOptions::default())
        .build(&table)
        .unwrap();
    let specs = deserialize_partition_specs(metadata.partition_specs()).unwrap();
    assert_eq!(specs.keys().copied().collect::<Vec<_>>(), [1]);
    let schema = deserialize_schema(metadata.iceberg_schema()).unwrap();
    assert_eq!(schema.schema_id(), 1);
    for spec in specs.values() {
        assert!(spec
            .fields()
            .all(|field| schema.contains_field_id(field.source_id)));
    }
}

#[test_log::test]
fn partition_stats_file_is_discovered() {
    let stats_location = "s3://warehouse/db/events/metadata/partition_stats_metadata_9.json";
    let table = table_builder()
        .with_snapshot(snapshot(9, 10, 1, 0, 0, 0), true)
        .with_file_io(Arc::new(StaticFileIo::default().with_file(stats_location, 2048)))
        .build()
        .unwrap();
    let metadata = DatasetMetadataBuilder::new(ScanOptions::default())
        .build(&table)
        .unwrap();
    let extra = metadata.extra_info();
    assert_eq!(extra.partition_stats_file.as_deref(), Some(stats_location));
    assert_eq!(extra.partition_stats_file_size, Some(2048));
    assert_eq!(extra.selection_root, TABLE_LOCATION);
    assert!(extra
        .column_ids
        .iter()
        .any(|c| c.schema_path == "point.x" && c.id == 9));
}

#[test]
fn missing_partition_stats_file_is_not_an_error() {
    let table = table_builder()
        .with_snapshot(snapshot(9, 10, 1, 0, 0, 0), true)
        .with_file_io(Arc::new(StaticFileIo::default()))
        .build()
        .unwrap();
    let metadata = DatasetMetadataBuilder::new(ScanOptions::default())
        .build(&table)
        .unwrap();
    assert_eq!(metadata.extra_info().partition_stats_file, None);
    assert_eq!(metadata.metadata_location(), METADATA_LOCATION);
}

#[test_log::test]
fn map_columns_dropped_when_disabled() {
    let table = table_builder().build().unwrap();
    let enabled = DatasetMetadataBuilder::new(ScanOptions::default())
        .build(&table)
        .unwrap();
    assert!(enabled.schema().field_with_name("props").is_ok());

    let disabled = DatasetMetadataBuilder::new(ScanOptions::default().with_map_data_type(false))
        .build(&table)
        .unwrap();
    assert!(disabled.schema().field_with_name("props").is_err());
    assert_eq!(disabled.schema().fields().len(), 5);
    assert_eq!(disabled.partition_columns(), ["category"]);
}

#[test]
fn pinned_snapshot_is_used() {
    let table = table_builder()
        .with_snapshot(snapshot(1, 10, 1, 0, 0, 0), false)
        .with_snapshot(snapshot(2, 20, 2, 0, 0, 0), true)
        .build()
        .unwrap();
    let metadata = DatasetMetadataBuilder::new(ScanOptions::default())
        .with_snapshot_resolver(Arc::new(PinnedSnapshot(1)))
        .build(&table)
        .unwrap();
    assert_eq!(metadata.snapshot_id(), 1);
    assert_eq!(metadata.row_stats().record_count, 10);

    let err = DatasetMetadataBuilder::new(ScanOptions::default())
        .with_snapshot_resolver(Arc::new(PinnedSnapshot(3)))
        .build(&table)
        .unwrap_err();
    assert!(matches!(err, Error::MissingSnapshot(3)));
}

#[test]
fn overflowing_delete_counters_are_rejected() {
    let table = table_builder()
        .with_snapshot(snapshot(1, 10, 1, u64::MAX, 1, 1), true)
        .build()
        .unwrap();
    let options = ScanOptions::default()
        .with_merge_on_read_scan(true)
        .with_equality_delete_scan(true);
    let err = DatasetMetadataBuilder::new(options)
        .build(&table)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSummaryValue { .. }));
}
