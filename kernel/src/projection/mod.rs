//! Projection of manifest entries into table-files rows.
//!
//! A [`ManifestProjectionEngine`] is bound once to a caller-declared output schema
//! ([`ManifestProjectionEngine::setup`]), pointed at a manifest's partition spec and the table's
//! schema ([`ManifestProjectionEngine::initialise`]) and then fed one entry at a time. Each call to
//! [`ManifestProjectionEngine::process_entry`] writes at most one row: once an entry has been
//! written its [`EntryState`] is `Processed`, and further calls for it write nothing until the
//! caller closes it. This lets a caller with a bounded row budget re-invoke the engine across
//! budget boundaries without emitting a file twice.
//!
//! ```ignore
//! let mut state = EntryState::default();
//! while !state.is_done() {
//!     if rows == batch_size {
//!         batches.push(engine.finish()?);
//!         rows = 0;
//!     }
//!     rows += engine.process_entry(&mut state, &entry, rows, batch_size - rows)?;
//! }
//! state.close_current_file();
//! ```

use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, trace, warn};

use crate::arrow::array::ArrayRef;
use crate::arrow::datatypes::{Schema as ArrowSchema, SchemaRef as ArrowSchemaRef};
use crate::arrow::record_batch::{RecordBatch, RecordBatchOptions};
use crate::engine::buffer::{BufferProvider, ManagedBuffer};
use crate::engine::vectors::OutputVector;
use crate::manifest::ManifestEntry;
use crate::partition::PartitionSpecRef;
use crate::schema::{Schema, SchemaRef};
use crate::utils::require;
use crate::{Error, IcebergResult};

mod fields;

pub use fields::{ProjectedField, ENTRY_KEY_NAME, ENTRY_VALUE_NAME, LIST_ELEMENT_NAME};
use fields::{Extractor, FieldValue, ProjectionContext};

/// Initial size of the scratch buffer string values are staged through
pub const SCRATCH_BUFFER_SIZE: usize = 4096;

/// Whether the current manifest entry has been written. Owned by the caller, one per entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryState {
    #[default]
    Idle,
    Processed,
}

impl EntryState {
    pub fn is_done(&self) -> bool {
        matches!(self, EntryState::Processed)
    }

    /// Release the current entry so the next one can be processed
    pub fn close_current_file(&mut self) {
        *self = EntryState::Idle;
    }
}

/// One output column bound to the field that populates it
#[derive(Debug)]
struct Binding {
    field: ProjectedField,
    extractor: Extractor,
    vector: OutputVector,
}

/// Writes one row per manifest entry into typed output vectors. Single threaded: run one engine
/// per scan unit.
#[derive(Debug)]
pub struct ManifestProjectionEngine {
    provider: Arc<dyn BufferProvider>,
    scratch: ManagedBuffer,
    output_schema: Option<ArrowSchemaRef>,
    bindings: Vec<Binding>,
    context: Option<ProjectionContext>,
    closed: bool,
}

impl ManifestProjectionEngine {
    /// Create an engine, acquiring its scratch buffer from `provider`.
    pub fn try_new(provider: Arc<dyn BufferProvider>) -> IcebergResult<Self> {
        let scratch = provider.acquire(SCRATCH_BUFFER_SIZE)?;
        Ok(Self {
            provider,
            scratch,
            output_schema: None,
            bindings: vec![],
            context: None,
            closed: false,
        })
    }

    /// Bind every field of `output_schema` to the projected field of the same name. May only be
    /// called once. Unknown names, and fields declared with a type the projection cannot write,
    /// are rejected here rather than on first use.
    pub fn setup(&mut self, output_schema: ArrowSchemaRef) -> IcebergResult<()> {
        require!(
            self.output_schema.is_none(),
            Error::generic("projection engine is already set up")
        );
        let bindings: Vec<Binding> = output_schema
            .fields()
            .iter()
            .map(|declared| {
                let field: ProjectedField = declared
                    .name()
                    .parse()
                    .map_err(|_| Error::invalid_field(declared.name()))?;
                require!(
                    field.accepts(declared.data_type()),
                    Error::invalid_field(format!(
                        "{} declared as {}",
                        declared.name(),
                        declared.data_type()
                    ))
                );
                Ok(Binding {
                    field,
                    extractor: field.extractor(),
                    vector: OutputVector::try_new(declared.data_type())?,
                })
            })
            .try_collect()?;
        debug!(
            fields = %bindings.iter().map(|b| b.field.as_ref()).join(", "),
            "projection engine set up"
        );
        self.bindings = bindings;
        self.output_schema = Some(output_schema);
        Ok(())
    }

    /// Point the engine at the next manifest: the partition spec its entries were written with,
    /// a schema holding that spec's source columns (see [`TableHandle::spec_schema`]) and the
    /// table schema whose columns statistics are reported for.
    ///
    /// [`TableHandle::spec_schema`]: crate::table::TableHandle::spec_schema
    pub fn initialise(
        &mut self,
        spec: PartitionSpecRef,
        spec_schema: &Schema,
        schema: SchemaRef,
    ) -> IcebergResult<()> {
        trace!(
            spec_id = spec.spec_id(),
            spec_schema_id = spec_schema.schema_id(),
            schema_id = schema.schema_id(),
            "initialising projection"
        );
        self.context = Some(ProjectionContext::try_new(spec, spec_schema, schema)?);
        Ok(())
    }

    /// Write the row for `entry` at `row_index`. Returns the number of rows written: 0 if the
    /// entry was already written (`state` is `Processed`) or there is no row budget left, 1
    /// otherwise. On error the vectors may hold a partial row and the batch must be discarded.
    pub fn process_entry(
        &mut self,
        state: &mut EntryState,
        entry: &ManifestEntry,
        row_index: usize,
        remaining_budget: usize,
    ) -> IcebergResult<usize> {
        if state.is_done() || remaining_budget == 0 {
            return Ok(0);
        }
        require!(!self.closed, Error::generic("projection engine is closed"));
        let Some(context) = self.context.as_ref() else {
            return Err(Error::generic(
                "projection engine must be initialised before processing entries",
            ));
        };
        let file = entry.file();
        let values: Vec<FieldValue> = self
            .bindings
            .iter()
            .map(|binding| (binding.extractor)(context, file))
            .try_collect()?;

        let Self {
            provider,
            scratch,
            bindings,
            ..
        } = self;
        let mut writer = ValueWriter {
            provider: &**provider,
            scratch,
        };
        for (binding, value) in bindings.iter_mut().zip(values) {
            writer.write(&mut binding.vector, row_index, value)?;
        }
        *state = EntryState::Processed;
        Ok(1)
    }

    /// Rows written since the last [`finish`](Self::finish)
    pub fn row_count(&self) -> usize {
        self.bindings
            .iter()
            .map(|binding| binding.vector.len())
            .max()
            .unwrap_or(0)
    }

    /// Hand the written rows over as a batch matching the declared output schema, emptying the
    /// vectors for the next batch. Row indexes restart at zero.
    pub fn finish(&mut self) -> IcebergResult<RecordBatch> {
        let Some(schema) = self.output_schema.clone() else {
            return Err(Error::generic("projection engine is not set up"));
        };
        let rows = self.row_count();
        let columns: Vec<ArrayRef> = self
            .bindings
            .iter_mut()
            .map(|binding| {
                binding.vector.pad_to(rows);
                binding.vector.finish()
            })
            .collect();
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
    }

    /// The declared output schema, once set up
    pub fn output_schema(&self) -> Option<&ArrowSchema> {
        self.output_schema.as_deref()
    }

    /// Release the scratch buffer. The provider keeps ownership of anything else it allocated.
    pub fn close(&mut self) -> IcebergResult<()> {
        if self.closed {
            return Ok(());
        }
        self.provider.resize(&mut self.scratch, 0)?;
        self.closed = true;
        debug!("projection engine closed");
        Ok(())
    }
}

impl Drop for ManifestProjectionEngine {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!("failed to release projection scratch buffer: {e}");
            }
        }
    }
}

/// Writes extracted values into vectors, staging string bytes through the scratch buffer.
struct ValueWriter<'a> {
    provider: &'a dyn BufferProvider,
    scratch: &'a mut ManagedBuffer,
}

impl ValueWriter<'_> {
    fn write(
        &mut self,
        vector: &mut OutputVector,
        index: usize,
        value: FieldValue,
    ) -> IcebergResult<()> {
        match value {
            FieldValue::Utf8(None)
            | FieldValue::Binary(None)
            | FieldValue::Int32List(None)
            | FieldValue::Int64List(None)
            | FieldValue::Entries(None) => vector.set_null(index),
            FieldValue::Utf8(Some(s)) => {
                let staged = self.stage(&s)?;
                vector.set_str(index, staged)
            }
            FieldValue::Binary(Some(bytes)) => vector.set_binary(index, &bytes),
            FieldValue::Int32(v) => vector.set_i32(index, v),
            FieldValue::Int64(v) => vector.set_i64(index, v),
            // nulls keep their position so offsets stay aligned across sibling lists
            FieldValue::Int32List(Some(list)) => vector.set_i32_list(index, &list),
            FieldValue::Int64List(Some(list)) => vector.set_i64_list(index, &list),
            FieldValue::Entries(Some(entries)) => vector.set_entries(index, |writer| {
                entries.iter().try_for_each(|(key, value)| {
                    writer.key(self.stage(key)?)?;
                    writer.value(Some(self.stage(value)?))
                })
            }),
        }
    }

    /// Copy `value` into the scratch buffer, growing it to the next power of two if needed.
    fn stage(&mut self, value: &str) -> IcebergResult<&str> {
        let bytes = value.as_bytes();
        if bytes.len() > self.scratch.capacity() {
            let new_size = bytes.len().next_power_of_two();
            trace!(
                from = self.scratch.capacity(),
                to = new_size,
                "growing scratch buffer"
            );
            self.provider.resize(self.scratch, new_size)?;
        }
        let staged = self.scratch.stage(bytes)?;
        std::str::from_utf8(staged)
            .map_err(|e| Error::internal_error(format!("scratch buffer corrupted a string: {e}")))
    }
}
