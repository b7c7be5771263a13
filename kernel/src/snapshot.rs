//! In-memory representation of table snapshots (an immutable view of a table at a point in its
//! history) and the strategies that pick which snapshot a resolution uses.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::table::TableHandle;
use crate::{Error, IcebergResult};

pub type SnapshotRef = Arc<Snapshot>;

pub const TOTAL_RECORDS: &str = "total-records";
pub const TOTAL_DATA_FILES: &str = "total-data-files";
pub const TOTAL_POSITION_DELETES: &str = "total-position-deletes";
pub const TOTAL_EQUALITY_DELETES: &str = "total-equality-deletes";
pub const TOTAL_DELETE_FILES: &str = "total-delete-files";

/// A snapshot as recorded in table metadata. The summary maps counter names to their string
/// values; see [`SnapshotCounters`] for the parsed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    pub snapshot_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<i64>,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub manifest_list: String,
    #[serde(default)]
    pub summary: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<i32>,
}

impl Snapshot {
    pub fn new(snapshot_id: i64, timestamp_ms: i64) -> Self {
        Self {
            snapshot_id,
            parent_snapshot_id: None,
            timestamp_ms,
            manifest_list: String::new(),
            summary: HashMap::new(),
            schema_id: None,
        }
    }

    #[must_use]
    pub fn with_summary<K: Into<String>, V: Into<String>>(
        mut self,
        summary: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.summary = summary
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_schema_id(mut self, schema_id: i32) -> Self {
        self.schema_id = Some(schema_id);
        self
    }

    /// Parse the summary counter `key`. An absent key counts as zero.
    pub fn summary_count(&self, key: &str) -> IcebergResult<u64> {
        match self.summary.get(key) {
            None => Ok(0),
            Some(value) => value.trim().parse().map_err(|_| Error::InvalidSummaryValue {
                key: key.to_string(),
                value: value.clone(),
            }),
        }
    }
}

/// The counters the capability gate and the dataset statistics are derived from. All zero when
/// the table has no snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotCounters {
    pub total_records: u64,
    pub total_data_files: u64,
    pub total_position_deletes: u64,
    pub total_equality_deletes: u64,
    pub total_delete_files: u64,
    pub last_modified_ms: i64,
}

impl SnapshotCounters {
    pub fn from_snapshot(snapshot: Option<&Snapshot>) -> IcebergResult<Self> {
        let Some(snapshot) = snapshot else {
            return Ok(Self::default());
        };
        Ok(Self {
            total_records: snapshot.summary_count(TOTAL_RECORDS)?,
            total_data_files: snapshot.summary_count(TOTAL_DATA_FILES)?,
            total_position_deletes: snapshot.summary_count(TOTAL_POSITION_DELETES)?,
            total_equality_deletes: snapshot.summary_count(TOTAL_EQUALITY_DELETES)?,
            total_delete_files: snapshot.summary_count(TOTAL_DELETE_FILES)?,
            last_modified_ms: snapshot.timestamp_ms,
        })
    }

    /// Position and equality deletes combined. A sum that does not fit a `u64` means the
    /// summary is corrupt.
    pub fn total_deletes(&self) -> IcebergResult<u64> {
        self.total_position_deletes
            .checked_add(self.total_equality_deletes)
            .ok_or_else(|| Error::InvalidSummaryValue {
                key: format!("{TOTAL_POSITION_DELETES} + {TOTAL_EQUALITY_DELETES}"),
                value: format!(
                    "{} + {}",
                    self.total_position_deletes, self.total_equality_deletes
                ),
            })
    }
}

/// Picks the snapshot a resolution works against. Called once per build; `Ok(None)` means the
/// table has no snapshot.
pub trait SnapshotResolver: Send + Sync {
    fn resolve(&self, table: &dyn TableHandle) -> IcebergResult<Option<SnapshotRef>>;
}

/// Resolve to the table's current snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentSnapshot;

impl SnapshotResolver for CurrentSnapshot {
    fn resolve(&self, table: &dyn TableHandle) -> IcebergResult<Option<SnapshotRef>> {
        let snapshot = table.current_snapshot()?;
        debug!(
            table = table.name(),
            snapshot_id = snapshot.as_ref().map(|s| s.snapshot_id),
            "resolved current snapshot"
        );
        Ok(snapshot)
    }
}

/// Resolve to a specific snapshot id, chosen by the caller (time travel, branch or tag
/// resolution happen upstream).
#[derive(Debug, Clone, Copy)]
pub struct PinnedSnapshot(pub i64);

impl SnapshotResolver for PinnedSnapshot {
    fn resolve(&self, table: &dyn TableHandle) -> IcebergResult<Option<SnapshotRef>> {
        let snapshot = table
            .snapshot(self.0)?
            .ok_or(Error::MissingSnapshot(self.0))?;
        debug!(table = table.name(), snapshot_id = self.0, "resolved pinned snapshot");
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_counters_without_snapshot_are_zero() {
        assert_eq!(
            SnapshotCounters::from_snapshot(None).unwrap(),
            SnapshotCounters::default()
        );
    }

    #[test]
    fn test_counters_from_summary() {
        let snapshot = Snapshot::new(7, 1_000).with_summary([
            (TOTAL_RECORDS, "100"),
            (TOTAL_DATA_FILES, "2"),
            (TOTAL_EQUALITY_DELETES, "3"),
        ]);
        let counters = SnapshotCounters::from_snapshot(Some(&snapshot)).unwrap();
        assert_eq!(
            counters,
            SnapshotCounters {
                total_records: 100,
                total_data_files: 2,
                total_position_deletes: 0,
                total_equality_deletes: 3,
                total_delete_files: 0,
                last_modified_ms: 1_000,
            }
        );
    }

    #[test]
    fn test_total_deletes_overflow_is_an_error() {
        let snapshot = Snapshot::new(1, 0).with_summary([
            (TOTAL_POSITION_DELETES, u64::MAX.to_string()),
            (TOTAL_EQUALITY_DELETES, "1".to_string()),
        ]);
        let counters = SnapshotCounters::from_snapshot(Some(&snapshot)).unwrap();
        assert!(matches!(
            counters.total_deletes(),
            Err(Error::InvalidSummaryValue { .. })
        ));
        let counters = SnapshotCounters {
            total_position_deletes: 2,
            total_equality_deletes: 3,
            ..Default::default()
        };
        assert_eq!(counters.total_deletes().unwrap(), 5);
    }

    #[rstest]
    #[case("abc")]
    #[case("-1")]
    #[case("1.5")]
    fn test_invalid_summary_value(#[case] value: &str) {
        let snapshot = Snapshot::new(1, 0).with_summary([(TOTAL_DELETE_FILES, value)]);
        let err = SnapshotCounters::from_snapshot(Some(&snapshot)).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSummaryValue { ref key, .. } if key == TOTAL_DELETE_FILES
        ));
    }

    #[test]
    fn test_snapshot_json() {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{
                "snapshot-id": 3051729675574597004,
                "timestamp-ms": 1515100955770,
                "summary": {"operation": "append", "total-records": "10"},
                "manifest-list": "s3://b/wh/t/metadata/snap-3051729675574597004.avro",
                "schema-id": 0
            }"#,
        )
        .unwrap();
        assert_eq!(snapshot.snapshot_id, 3051729675574597004);
        assert_eq!(snapshot.parent_snapshot_id, None);
        assert_eq!(snapshot.schema_id, Some(0));
        assert_eq!(snapshot.summary_count(TOTAL_RECORDS).unwrap(), 10);
    }
}
