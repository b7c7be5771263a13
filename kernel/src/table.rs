//! The table-handle capability the kernel resolves against, the schema resolution strategies and
//! an in-memory handle built from a table's metadata file.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::partition::{PartitionSpec, PartitionSpecRef};
use crate::schema::{Schema, SchemaRef};
use crate::snapshot::{Snapshot, SnapshotRef};
use crate::utils::{require, try_parse_local_path};
use crate::{Error, IcebergResult, NO_SNAPSHOT_ID};

/// Minimal file access the kernel needs: probing whether an auxiliary file exists, and its size.
pub trait FileIo: Debug + Send + Sync {
    /// The length in bytes of the file at `location`, or `None` if there is no such file.
    fn file_length(&self, location: &str) -> IcebergResult<Option<u64>>;
}

/// [`FileIo`] over the local filesystem. Accepts plain paths and `file://` urls.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileIo;

impl FileIo for LocalFileIo {
    fn file_length(&self, location: &str) -> IcebergResult<Option<u64>> {
        let path = try_parse_local_path(location)?;
        match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read-only access to a table's persistent state. Implementations may block on storage; the
/// kernel calls each method at most once per resolution.
pub trait TableHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Root location of the table's data and metadata
    fn location(&self) -> &str;

    /// Location of the metadata file this handle was loaded from
    fn metadata_location(&self) -> &str;

    fn current_snapshot(&self) -> IcebergResult<Option<SnapshotRef>>;

    fn snapshot(&self, snapshot_id: i64) -> IcebergResult<Option<SnapshotRef>>;

    fn current_schema(&self) -> IcebergResult<SchemaRef>;

    fn schema_by_id(&self, schema_id: i32) -> IcebergResult<Option<SchemaRef>>;

    /// Every schema in the table's history, keyed by schema id
    fn schemas(&self) -> IcebergResult<BTreeMap<i32, SchemaRef>>;

    /// The spec new data is written with
    fn default_spec(&self) -> IcebergResult<PartitionSpecRef>;

    /// Every spec in the table's history, keyed by spec id
    fn specs(&self) -> IcebergResult<BTreeMap<i32, PartitionSpecRef>>;

    fn io(&self) -> Arc<dyn FileIo>;

    /// The schema `snapshot` was written with. Tables without a snapshot, and snapshots that
    /// predate schema ids, use the current schema.
    fn schema_as_of(&self, snapshot: Option<&Snapshot>) -> IcebergResult<SchemaRef> {
        match snapshot.and_then(|s| s.schema_id) {
            Some(schema_id) => match self.schema_by_id(schema_id)? {
                Some(schema) => Ok(schema),
                None => Err(Error::schema(format!(
                    "Schema {schema_id} of table {} does not exist",
                    self.name()
                ))),
            },
            None => self.current_schema(),
        }
    }

    /// A schema `spec` can be bound to: the current schema if it still has every source column
    /// of the spec, otherwise the newest schema in the table's history that does.
    fn spec_schema(&self, spec: &PartitionSpec) -> IcebergResult<SchemaRef> {
        let current = self.current_schema()?;
        if spec.is_compatible_with(&current) {
            return Ok(current);
        }
        let schemas = self.schemas()?;
        let schema = schemas
            .into_values()
            .rev()
            .find(|schema| spec.is_compatible_with(schema))
            .ok_or_else(|| {
                Error::schema(format!(
                    "No schema of table {} has the source columns of partition spec {}",
                    self.name(),
                    spec.spec_id()
                ))
            })?;
        debug!(
            table = self.name(),
            spec_id = spec.spec_id(),
            schema_id = schema.schema_id(),
            "binding partition spec to a historical schema"
        );
        Ok(schema)
    }
}

/// Picks the schema a resolution works against, given the resolved snapshot.
pub trait SchemaResolver: Send + Sync {
    fn resolve(
        &self,
        table: &dyn TableHandle,
        snapshot: Option<&Snapshot>,
    ) -> IcebergResult<SchemaRef>;
}

/// The schema the snapshot was written with
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotSchema;

impl SchemaResolver for SnapshotSchema {
    fn resolve(
        &self,
        table: &dyn TableHandle,
        snapshot: Option<&Snapshot>,
    ) -> IcebergResult<SchemaRef> {
        table.schema_as_of(snapshot)
    }
}

/// The table's current schema, whatever snapshot was resolved
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentSchema;

impl SchemaResolver for CurrentSchema {
    fn resolve(
        &self,
        table: &dyn TableHandle,
        _snapshot: Option<&Snapshot>,
    ) -> IcebergResult<SchemaRef> {
        table.current_schema()
    }
}

/// An in-memory [`TableHandle`] over fully loaded table metadata.
#[derive(Debug, Clone)]
pub struct TableMetadata {
    name: String,
    location: String,
    metadata_location: String,
    current_snapshot_id: Option<i64>,
    snapshots: BTreeMap<i64, SnapshotRef>,
    schemas: BTreeMap<i32, SchemaRef>,
    current_schema_id: i32,
    specs: BTreeMap<i32, PartitionSpecRef>,
    default_spec_id: i32,
    io: Arc<dyn FileIo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SerdeTableMetadata {
    location: String,
    #[serde(default)]
    current_snapshot_id: Option<i64>,
    #[serde(default)]
    snapshots: Vec<Snapshot>,
    schemas: Vec<Schema>,
    current_schema_id: i32,
    #[serde(default)]
    partition_specs: Vec<PartitionSpec>,
    #[serde(default)]
    default_spec_id: i32,
}

impl TableMetadata {
    pub fn builder(name: impl Into<String>, location: impl Into<String>) -> TableMetadataBuilder {
        TableMetadataBuilder::new(name, location)
    }

    /// Load a handle from the JSON content of a table metadata file.
    pub fn from_json(
        name: impl Into<String>,
        metadata_location: impl Into<String>,
        json: &str,
        io: Arc<dyn FileIo>,
    ) -> IcebergResult<Self> {
        let metadata: SerdeTableMetadata = serde_json::from_str(json)?;
        let mut builder = TableMetadataBuilder::new(name, metadata.location)
            .with_metadata_location(metadata_location)
            .with_file_io(io);
        for schema in metadata.schemas {
            let is_current = schema.schema_id() == metadata.current_schema_id;
            builder = builder.with_schema(schema, is_current);
        }
        for spec in metadata.partition_specs {
            let is_default = spec.spec_id() == metadata.default_spec_id;
            builder = builder.with_spec(spec, is_default);
        }
        // -1 is written for tables that have never been committed to
        let current = metadata
            .current_snapshot_id
            .filter(|id| *id != NO_SNAPSHOT_ID);
        for snapshot in metadata.snapshots {
            let is_current = Some(snapshot.snapshot_id) == current;
            builder = builder.with_snapshot(snapshot, is_current);
        }
        require!(
            current.is_none() || builder.current_snapshot_id.is_some(),
            Error::MissingSnapshot(current.unwrap_or(NO_SNAPSHOT_ID))
        );
        builder.build()
    }
}

impl TableHandle for TableMetadata {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn metadata_location(&self) -> &str {
        &self.metadata_location
    }

    fn current_snapshot(&self) -> IcebergResult<Option<SnapshotRef>> {
        Ok(self
            .current_snapshot_id
            .and_then(|id| self.snapshots.get(&id).cloned()))
    }

    fn snapshot(&self, snapshot_id: i64) -> IcebergResult<Option<SnapshotRef>> {
        Ok(self.snapshots.get(&snapshot_id).cloned())
    }

    fn current_schema(&self) -> IcebergResult<SchemaRef> {
        self.schemas
            .get(&self.current_schema_id)
            .cloned()
            .ok_or_else(|| Error::internal_error("current schema missing from table metadata"))
    }

    fn schema_by_id(&self, schema_id: i32) -> IcebergResult<Option<SchemaRef>> {
        Ok(self.schemas.get(&schema_id).cloned())
    }

    fn schemas(&self) -> IcebergResult<BTreeMap<i32, SchemaRef>> {
        Ok(self.schemas.clone())
    }

    fn default_spec(&self) -> IcebergResult<PartitionSpecRef> {
        self.specs
            .get(&self.default_spec_id)
            .cloned()
            .ok_or(Error::MissingPartitionSpec(self.default_spec_id))
    }

    fn specs(&self) -> IcebergResult<BTreeMap<i32, PartitionSpecRef>> {
        Ok(self.specs.clone())
    }

    fn io(&self) -> Arc<dyn FileIo> {
        self.io.clone()
    }
}

/// Assembles a [`TableMetadata`] piece by piece. The first schema and spec added become current
/// unless a later one is explicitly marked as such.
#[derive(Debug)]
pub struct TableMetadataBuilder {
    name: String,
    location: String,
    metadata_location: Option<String>,
    current_snapshot_id: Option<i64>,
    snapshots: BTreeMap<i64, SnapshotRef>,
    schemas: BTreeMap<i32, SchemaRef>,
    current_schema_id: Option<i32>,
    specs: BTreeMap<i32, PartitionSpecRef>,
    default_spec_id: Option<i32>,
    io: Arc<dyn FileIo>,
}

impl TableMetadataBuilder {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            metadata_location: None,
            current_snapshot_id: None,
            snapshots: BTreeMap::new(),
            schemas: BTreeMap::new(),
            current_schema_id: None,
            specs: BTreeMap::new(),
            default_spec_id: None,
            io: Arc::new(LocalFileIo),
        }
    }

    pub fn with_metadata_location(mut self, metadata_location: impl Into<String>) -> Self {
        self.metadata_location = Some(metadata_location.into());
        self
    }

    pub fn with_schema(mut self, schema: Schema, current: bool) -> Self {
        if current || self.current_schema_id.is_none() {
            self.current_schema_id = Some(schema.schema_id());
        }
        self.schemas.insert(schema.schema_id(), Arc::new(schema));
        self
    }

    pub fn with_spec(mut self, spec: PartitionSpec, default: bool) -> Self {
        if default || self.default_spec_id.is_none() {
            self.default_spec_id = Some(spec.spec_id());
        }
        self.specs.insert(spec.spec_id(), Arc::new(spec));
        self
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot, current: bool) -> Self {
        if current {
            self.current_snapshot_id = Some(snapshot.snapshot_id);
        }
        self.snapshots
            .insert(snapshot.snapshot_id, Arc::new(snapshot));
        self
    }

    pub fn with_file_io(mut self, io: Arc<dyn FileIo>) -> Self {
        self.io = io;
        self
    }

    pub fn build(mut self) -> IcebergResult<TableMetadata> {
        let Some(current_schema_id) = self.current_schema_id else {
            return Err(Error::schema(format!("Table {} has no schema", self.name)));
        };
        if self.specs.is_empty() {
            self.specs
                .insert(0, Arc::new(PartitionSpec::unpartitioned(0)));
        }
        let default_spec_id = self.default_spec_id.unwrap_or(0);
        require!(
            self.specs.contains_key(&default_spec_id),
            Error::MissingPartitionSpec(default_spec_id)
        );
        let location = self.location.trim_end_matches('/').to_string();
        let metadata_location = self
            .metadata_location
            .unwrap_or_else(|| format!("{location}/metadata/v1.metadata.json"));
        debug!(
            table = %self.name,
            %metadata_location,
            snapshots = self.snapshots.len(),
            schemas = self.schemas.len(),
            specs = self.specs.len(),
            "built table metadata"
        );
        Ok(TableMetadata {
            name: self.name,
            location,
            metadata_location,
            current_snapshot_id: self.current_snapshot_id,
            snapshots: self.snapshots,
            schemas: self.schemas,
            current_schema_id,
            specs: self.specs,
            default_spec_id,
            io: self.io,
        })
    }
}
