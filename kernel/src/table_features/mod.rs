//! Table features a caller must explicitly enable before the kernel will resolve a table that
//! uses them, and the gate that enforces this.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumString, VariantNames};

use crate::options::{ScanOptions, EQUALITY_DELETE_SCAN, MERGE_ON_READ_SCAN};
use crate::snapshot::SnapshotCounters;
use crate::IcebergResult;

/// Features of a snapshot that require reader support beyond plain data files. Gated features
/// are checked in declaration order.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    EnumString,
    StrumDisplay,
    AsRefStr,
    VariantNames,
    Hash,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum TableFeature {
    /// Position or equality delete files applied on read
    DeleteFiles,
    /// Delete files that match rows by column values
    EqualityDeletes,
}

impl TableFeature {
    /// The option that enables reading tables with this feature
    pub fn option_key(&self) -> &'static str {
        match self {
            TableFeature::DeleteFiles => MERGE_ON_READ_SCAN,
            TableFeature::EqualityDeletes => EQUALITY_DELETE_SCAN,
        }
    }
}

impl From<TableFeature> for String {
    fn from(feature: TableFeature) -> Self {
        feature.to_string()
    }
}

/// Why the gate rejected a table. The messages are surfaced to users verbatim.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedFeature {
    #[error("Iceberg V2 tables with delete files are not supported.")]
    DeleteFiles,
    #[error("Iceberg V2 tables with equality deletes are not supported.")]
    EqualityDeletes,
}

impl UnsupportedFeature {
    pub fn feature(&self) -> TableFeature {
        match self {
            UnsupportedFeature::DeleteFiles => TableFeature::DeleteFiles,
            UnsupportedFeature::EqualityDeletes => TableFeature::EqualityDeletes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    Reject(UnsupportedFeature),
}

impl GateDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateDecision::Accept)
    }

    pub fn into_result(self) -> IcebergResult<()> {
        match self {
            GateDecision::Accept => Ok(()),
            GateDecision::Reject(reason) => Err(reason.into()),
        }
    }
}

/// Pre-flight check of a snapshot's counters against the enabled options. Only the first failing
/// check is reported: delete files, then equality deletes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityGate;

impl CapabilityGate {
    pub fn check(counters: &SnapshotCounters, options: &ScanOptions) -> GateDecision {
        if counters.total_delete_files > 0 && !options.merge_on_read_scan {
            return GateDecision::Reject(UnsupportedFeature::DeleteFiles);
        }
        if counters.total_equality_deletes > 0 && !options.equality_delete_scan {
            return GateDecision::Reject(UnsupportedFeature::EqualityDeletes);
        }
        GateDecision::Accept
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::Error;

    fn counters(delete_files: u64, equality_deletes: u64) -> SnapshotCounters {
        SnapshotCounters {
            total_delete_files: delete_files,
            total_equality_deletes: equality_deletes,
            ..Default::default()
        }
    }

    #[test]
    fn test_roundtrip_table_features() {
        let cases = [
            (TableFeature::DeleteFiles, "deleteFiles"),
            (TableFeature::EqualityDeletes, "equalityDeletes"),
        ];

        assert_eq!(TableFeature::VARIANTS.len(), cases.len());

        for ((feature, expected), name) in cases.into_iter().zip(TableFeature::VARIANTS) {
            assert_eq!(*name, expected);

            let serialized = serde_json::to_string(&feature).unwrap();
            assert_eq!(serialized, format!("\"{}\"", expected));

            let deserialized: TableFeature = serde_json::from_str(&serialized).unwrap();
            assert_eq!(deserialized, feature);

            let from_str: TableFeature = expected.parse().unwrap();
            assert_eq!(from_str, feature);
        }
    }

    #[rstest]
    #[case(counters(0, 0), false, false, GateDecision::Accept)]
    #[case(counters(0, 0), true, true, GateDecision::Accept)]
    #[case(counters(2, 0), false, false, GateDecision::Reject(UnsupportedFeature::DeleteFiles))]
    #[case(counters(2, 0), true, false, GateDecision::Accept)]
    #[case(counters(2, 1), false, false, GateDecision::Reject(UnsupportedFeature::DeleteFiles))]
    #[case(counters(2, 1), true, false, GateDecision::Reject(UnsupportedFeature::EqualityDeletes))]
    #[case(counters(2, 1), true, true, GateDecision::Accept)]
    // equality deletes are gated independently of the merge-on-read option
    #[case(counters(0, 1), false, true, GateDecision::Accept)]
    #[case(counters(0, 1), true, false, GateDecision::Reject(UnsupportedFeature::EqualityDeletes))]
    fn test_gate(
        #[case] counters: SnapshotCounters,
        #[case] merge_on_read: bool,
        #[case] equality_deletes: bool,
        #[case] expected: GateDecision,
    ) {
        let options = ScanOptions::default()
            .with_merge_on_read_scan(merge_on_read)
            .with_equality_delete_scan(equality_deletes);
        assert_eq!(CapabilityGate::check(&counters, &options), expected);
    }

    #[test]
    fn test_rejection_surfaces_feature_error() {
        let err = GateDecision::Reject(UnsupportedFeature::EqualityDeletes)
            .into_result()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedTableFeature(UnsupportedFeature::EqualityDeletes)
        ));
        assert_eq!(
            UnsupportedFeature::EqualityDeletes.feature().option_key(),
            EQUALITY_DELETE_SCAN
        );
    }
}
