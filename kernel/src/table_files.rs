//! The table-files introspection scan: one row per live data or delete file across a set of
//! manifests, in batches of bounded size.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::arrow::datatypes::SchemaRef as ArrowSchemaRef;
use crate::arrow::record_batch::RecordBatch;
use crate::engine::buffer::BufferProvider;
use crate::manifest::Manifest;
use crate::partition::PartitionSpecRef;
use crate::projection::{EntryState, ManifestProjectionEngine};
use crate::schema::SchemaRef;
use crate::table::TableHandle;
use crate::{Error, IcebergResult};

/// Rows per batch unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 4000;

/// A partition spec and the schema its partition type is bound to. `None` if no schema in the
/// table's history has all of the spec's source columns.
#[derive(Debug, Clone)]
struct BoundSpec {
    spec: PartitionSpecRef,
    schema: Option<SchemaRef>,
}

/// Drives a [`ManifestProjectionEngine`] over manifests with a fixed row budget per batch.
#[derive(Debug, Clone)]
pub struct TableFilesScan {
    table_name: String,
    specs: BTreeMap<i32, BoundSpec>,
    schema: SchemaRef,
    output_schema: ArrowSchemaRef,
    provider: Arc<dyn BufferProvider>,
    batch_size: usize,
}

impl TableFilesScan {
    /// Prepare a scan of `table`'s files producing `output_schema`. Statistics are reported for
    /// the columns of the table's current schema; partition values are read with each spec bound
    /// to a schema that still has its source columns.
    pub fn try_new(
        table: &dyn TableHandle,
        output_schema: ArrowSchemaRef,
        provider: Arc<dyn BufferProvider>,
    ) -> IcebergResult<Self> {
        let specs = table
            .specs()?
            .into_iter()
            .map(|(spec_id, spec)| {
                let schema = table.spec_schema(&spec).ok();
                (spec_id, BoundSpec { spec, schema })
            })
            .collect();
        Ok(Self {
            table_name: table.name().to_string(),
            specs,
            schema: table.current_schema()?,
            output_schema,
            provider,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Cap the number of rows per batch. A size of zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Project every live entry of `manifests`, in order. Entries deleted by their manifest's
    /// snapshot are skipped. The engine's buffers are released whether or not the scan succeeds.
    pub fn execute<'a>(
        &self,
        manifests: impl IntoIterator<Item = &'a Manifest>,
    ) -> IcebergResult<Vec<RecordBatch>> {
        let mut engine = ManifestProjectionEngine::try_new(self.provider.clone())?;
        let result = self.project(&mut engine, manifests);
        let closed = engine.close();
        let batches = result?;
        closed?;
        info!(
            table = %self.table_name,
            batches = batches.len(),
            rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
            "table files scan complete"
        );
        Ok(batches)
    }

    fn project<'a>(
        &self,
        engine: &mut ManifestProjectionEngine,
        manifests: impl IntoIterator<Item = &'a Manifest>,
    ) -> IcebergResult<Vec<RecordBatch>> {
        engine.setup(self.output_schema.clone())?;
        let mut batches = vec![];
        let mut rows = 0;
        for manifest in manifests {
            let bound = self
                .specs
                .get(&manifest.spec_id)
                .ok_or(Error::MissingPartitionSpec(manifest.spec_id))?;
            let Some(spec_schema) = bound.schema.as_deref() else {
                return Err(Error::schema(format!(
                    "No schema of table {} has the source columns of partition spec {}",
                    self.table_name, manifest.spec_id
                )));
            };
            engine.initialise(bound.spec.clone(), spec_schema, self.schema.clone())?;
            debug!(
                spec_id = manifest.spec_id,
                entries = manifest.entries.len(),
                "projecting manifest"
            );
            for entry in manifest.entries.iter().filter(|entry| entry.is_alive()) {
                let mut state = EntryState::default();
                while !state.is_done() {
                    if rows == self.batch_size {
                        batches.push(engine.finish()?);
                        rows = 0;
                    }
                    rows += engine.process_entry(&mut state, entry, rows, self.batch_size - rows)?;
                }
                state.close_current_file();
            }
        }
        if rows > 0 {
            batches.push(engine.finish()?);
        }
        Ok(batches)
    }
}
