//! Manifest entries and the content files they reference.

use bytes::Bytes;
use indexmap::IndexMap;
use strum::{AsRefStr, Display as StrumDisplay, EnumString, VariantNames};

use crate::expressions::PartitionData;

/// What a content file holds. Displays as the name reported to users (`DATA`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, StrumDisplay, AsRefStr, VariantNames)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FileContent {
    Data,
    PositionDeletes,
    EqualityDeletes,
}

impl FileContent {
    pub fn is_delete(&self) -> bool {
        !matches!(self, FileContent::Data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, StrumDisplay, AsRefStr, VariantNames)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum FileFormat {
    Parquet,
    Orc,
    Avro,
}

/// Whether an entry was added by the manifest's snapshot, carried over, or removed by it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, StrumDisplay, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ManifestEntryStatus {
    Existing = 0,
    Added = 1,
    Deleted = 2,
}

/// One physical data or delete file. Statistic maps are keyed by column id and keep the order the
/// manifest recorded them in; a missing map is distinct from an empty one.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentFile {
    pub content: FileContent,
    pub file_path: String,
    pub file_format: FileFormat,
    pub partition: PartitionData,
    pub record_count: i64,
    pub file_size_in_bytes: i64,
    pub column_sizes: Option<IndexMap<i32, i64>>,
    pub value_counts: Option<IndexMap<i32, i64>>,
    pub null_value_counts: Option<IndexMap<i32, i64>>,
    pub nan_value_counts: Option<IndexMap<i32, i64>>,
    pub lower_bounds: Option<IndexMap<i32, Bytes>>,
    pub upper_bounds: Option<IndexMap<i32, Bytes>>,
    pub split_offsets: Option<Vec<Option<i64>>>,
    pub equality_ids: Option<Vec<Option<i32>>>,
    pub sort_order_id: Option<i32>,
    pub spec_id: i32,
}

impl ContentFile {
    pub fn new(
        content: FileContent,
        file_path: impl Into<String>,
        file_format: FileFormat,
        record_count: i64,
        file_size_in_bytes: i64,
    ) -> Self {
        Self {
            content,
            file_path: file_path.into(),
            file_format,
            partition: PartitionData::default(),
            record_count,
            file_size_in_bytes,
            column_sizes: None,
            value_counts: None,
            null_value_counts: None,
            nan_value_counts: None,
            lower_bounds: None,
            upper_bounds: None,
            split_offsets: None,
            equality_ids: None,
            sort_order_id: None,
            spec_id: 0,
        }
    }

    /// A parquet data file, the common case
    pub fn data(file_path: impl Into<String>, record_count: i64, file_size_in_bytes: i64) -> Self {
        Self::new(
            FileContent::Data,
            file_path,
            FileFormat::Parquet,
            record_count,
            file_size_in_bytes,
        )
    }

    #[must_use]
    pub fn with_partition(mut self, spec_id: i32, partition: PartitionData) -> Self {
        self.spec_id = spec_id;
        self.partition = partition;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub status: ManifestEntryStatus,
    pub snapshot_id: Option<i64>,
    pub sequence_number: Option<i64>,
    pub file: ContentFile,
}

impl ManifestEntry {
    pub fn added(file: ContentFile) -> Self {
        Self {
            status: ManifestEntryStatus::Added,
            snapshot_id: None,
            sequence_number: None,
            file,
        }
    }

    pub fn file(&self) -> &ContentFile {
        &self.file
    }

    pub fn is_alive(&self) -> bool {
        self.status != ManifestEntryStatus::Deleted
    }
}

/// The entries of one manifest file. Every entry was written with the manifest's spec.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub spec_id: i32,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(spec_id: i32, entries: impl IntoIterator<Item = ManifestEntry>) -> Self {
        Self {
            spec_id,
            entries: entries.into_iter().collect(),
        }
    }
}
