//! Typed output column vectors written row by row and exported as arrow arrays.
//!
//! Every vector is written in row order: writing at an index past the end fills the gap with
//! nulls, and writing at an index that was already written is an error. The vectors wrap arrow's
//! array builders, so offsets and validity are maintained by arrow itself.

use std::sync::Arc;

use crate::arrow::array::{
    ArrayBuilder, ArrayRef, BinaryBuilder, Int32Builder, Int64Builder, ListBuilder, StringBuilder,
    StructBuilder,
};
use crate::arrow::datatypes::{DataType as ArrowDataType, FieldRef, Int32Type, Int64Type};
use crate::engine::accumulator::Accumulator;
use crate::utils::require;
use crate::{Error, IcebergResult};

/// Appends `key`/`value` entries to the struct list of one row
pub struct EntryWriter<'a> {
    entries: &'a mut StructBuilder,
}

impl EntryWriter<'_> {
    fn child(&mut self, index: usize) -> IcebergResult<&mut StringBuilder> {
        self.entries
            .field_builder::<StringBuilder>(index)
            .ok_or_else(|| Error::internal_error(format!("entry child {index} is not a string")))
    }

    /// Start an entry. It is complete once its value is written.
    pub fn key(&mut self, key: &str) -> IcebergResult<()> {
        self.child(0)?.append_value(key);
        Ok(())
    }

    pub fn value(&mut self, value: Option<&str>) -> IcebergResult<()> {
        let keys = self.child(0)?.len();
        let values = self.child(1)?;
        require!(
            values.len() + 1 == keys,
            Error::internal_error("entry value written without a key")
        );
        values.append_option(value);
        self.entries.append(true);
        Ok(())
    }
}

fn new_entries(field: &FieldRef) -> IcebergResult<ListBuilder<StructBuilder>> {
    let ArrowDataType::Struct(fields) = field.data_type() else {
        return Err(Error::unsupported(format!(
            "list elements of type {} are not supported",
            field.data_type()
        )));
    };
    require!(
        fields.len() == 2
            && fields
                .iter()
                .all(|child| child.data_type() == &ArrowDataType::Utf8),
        Error::unsupported(format!(
            "entry structs need exactly two string children, got {}",
            field.data_type()
        ))
    );
    let children: Vec<Box<dyn ArrayBuilder>> = vec![
        Box::new(StringBuilder::new()),
        Box::new(StringBuilder::new()),
    ];
    Ok(ListBuilder::new(StructBuilder::new(fields.clone(), children)).with_field(field.clone()))
}

/// A named column the projection engine writes into. Built from the arrow type the caller
/// declared for it.
#[derive(Debug)]
pub enum OutputVector {
    Int32(Accumulator<Int32Type>),
    Int64(Accumulator<Int64Type>),
    Utf8(StringBuilder),
    Binary(BinaryBuilder),
    Int32List(ListBuilder<Int32Builder>),
    Int64List(ListBuilder<Int64Builder>),
    /// A list of key/value string structs
    Entries(ListBuilder<StructBuilder>),
}

impl OutputVector {
    /// Create an empty vector for `data_type`. Only the types the projection produces are
    /// supported.
    pub fn try_new(data_type: &ArrowDataType) -> IcebergResult<Self> {
        Ok(match data_type {
            ArrowDataType::Int32 => OutputVector::Int32(Accumulator::new()),
            ArrowDataType::Int64 => OutputVector::Int64(Accumulator::new()),
            ArrowDataType::Utf8 => OutputVector::Utf8(StringBuilder::new()),
            ArrowDataType::Binary => OutputVector::Binary(BinaryBuilder::new()),
            ArrowDataType::List(field) => {
                require!(
                    field.is_nullable() || matches!(field.data_type(), ArrowDataType::Struct(_)),
                    Error::unsupported(format!(
                        "list elements of type {} must be nullable",
                        field.data_type()
                    ))
                );
                match field.data_type() {
                    ArrowDataType::Int32 => OutputVector::Int32List(
                        ListBuilder::new(Int32Builder::new()).with_field(field.clone()),
                    ),
                    ArrowDataType::Int64 => OutputVector::Int64List(
                        ListBuilder::new(Int64Builder::new()).with_field(field.clone()),
                    ),
                    _ => OutputVector::Entries(new_entries(field)?),
                }
            }
            other => {
                return Err(Error::unsupported(format!(
                    "output vectors of type {other} are not supported"
                )))
            }
        })
    }

    pub fn len(&self) -> usize {
        match self {
            OutputVector::Int32(acc) => acc.len(),
            OutputVector::Int64(acc) => acc.len(),
            OutputVector::Utf8(builder) => builder.len(),
            OutputVector::Binary(builder) => builder.len(),
            OutputVector::Int32List(builder) => builder.len(),
            OutputVector::Int64List(builder) => builder.len(),
            OutputVector::Entries(builder) => builder.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            OutputVector::Int32(_) => "int",
            OutputVector::Int64(_) => "bigint",
            OutputVector::Utf8(_) => "varchar",
            OutputVector::Binary(_) => "varbinary",
            OutputVector::Int32List(_) => "list<int>",
            OutputVector::Int64List(_) => "list<bigint>",
            OutputVector::Entries(_) => "list<struct>",
        }
    }

    fn mismatch(&self, written: &str) -> Error {
        Error::internal_error(format!(
            "cannot write a {written} value into a {} vector",
            self.kind()
        ))
    }

    fn check_unwritten(&self, index: usize) -> IcebergResult<()> {
        require!(
            index >= self.len(),
            Error::internal_error(format!(
                "{} vector row {index} was already written (length {})",
                self.kind(),
                self.len()
            ))
        );
        Ok(())
    }

    /// Append nulls until the vector holds `len` rows
    pub fn pad_to(&mut self, len: usize) {
        for _ in self.len()..len {
            match self {
                OutputVector::Int32(acc) => acc.append(None),
                OutputVector::Int64(acc) => acc.append(None),
                OutputVector::Utf8(builder) => builder.append_null(),
                OutputVector::Binary(builder) => builder.append_null(),
                OutputVector::Int32List(builder) => builder.append_null(),
                OutputVector::Int64List(builder) => builder.append_null(),
                OutputVector::Entries(builder) => builder.append_null(),
            }
        }
    }

    /// Check `index` is unwritten and pad the rows before it.
    fn seek(&mut self, index: usize) -> IcebergResult<()> {
        self.check_unwritten(index)?;
        self.pad_to(index);
        Ok(())
    }

    pub fn set_null(&mut self, index: usize) -> IcebergResult<()> {
        self.seek(index)?;
        self.pad_to(index + 1);
        Ok(())
    }

    pub fn set_i32(&mut self, index: usize, value: Option<i32>) -> IcebergResult<()> {
        match self {
            OutputVector::Int32(acc) => acc.set(index, value),
            OutputVector::Int64(acc) => acc.set(index, value.map(i64::from)),
            _ => Err(self.mismatch("int")),
        }
    }

    pub fn set_i64(&mut self, index: usize, value: Option<i64>) -> IcebergResult<()> {
        match self {
            OutputVector::Int64(acc) => acc.set(index, value),
            _ => Err(self.mismatch("bigint")),
        }
    }

    pub fn set_str(&mut self, index: usize, value: &str) -> IcebergResult<()> {
        if !matches!(self, OutputVector::Utf8(_)) {
            return Err(self.mismatch("varchar"));
        }
        self.seek(index)?;
        if let OutputVector::Utf8(builder) = self {
            builder.append_value(value);
        }
        Ok(())
    }

    pub fn set_binary(&mut self, index: usize, value: &[u8]) -> IcebergResult<()> {
        if !matches!(self, OutputVector::Binary(_)) {
            return Err(self.mismatch("varbinary"));
        }
        self.seek(index)?;
        if let OutputVector::Binary(builder) = self {
            builder.append_value(value);
        }
        Ok(())
    }

    /// Write a list of ints at `index`. Null elements keep their position.
    pub fn set_i32_list(&mut self, index: usize, values: &[Option<i32>]) -> IcebergResult<()> {
        if !matches!(self, OutputVector::Int32List(_) | OutputVector::Int64List(_)) {
            return Err(self.mismatch("list<int>"));
        }
        self.seek(index)?;
        match self {
            OutputVector::Int32List(builder) => {
                builder.values().extend(values.iter().copied());
                builder.append(true);
            }
            OutputVector::Int64List(builder) => {
                builder
                    .values()
                    .extend(values.iter().map(|v| v.map(i64::from)));
                builder.append(true);
            }
            _ => {}
        }
        Ok(())
    }

    /// Write a list of bigints at `index`. Null elements keep their position.
    pub fn set_i64_list(&mut self, index: usize, values: &[Option<i64>]) -> IcebergResult<()> {
        if !matches!(self, OutputVector::Int64List(_)) {
            return Err(self.mismatch("list<bigint>"));
        }
        self.seek(index)?;
        if let OutputVector::Int64List(builder) = self {
            builder.values().extend(values.iter().copied());
            builder.append(true);
        }
        Ok(())
    }

    /// Write a list of entries at `index`; `fill` appends them through an [`EntryWriter`].
    pub fn set_entries(
        &mut self,
        index: usize,
        fill: impl FnOnce(&mut EntryWriter<'_>) -> IcebergResult<()>,
    ) -> IcebergResult<()> {
        if !matches!(self, OutputVector::Entries(_)) {
            return Err(self.mismatch("list<struct>"));
        }
        self.seek(index)?;
        if let OutputVector::Entries(builder) = self {
            fill(&mut EntryWriter {
                entries: builder.values(),
            })?;
            builder.append(true);
        }
        Ok(())
    }

    /// Hand the written rows over as an arrow array, leaving the vector empty and reusable.
    pub fn finish(&mut self) -> ArrayRef {
        match self {
            OutputVector::Int32(acc) => Arc::new(acc.finish()),
            OutputVector::Int64(acc) => Arc::new(acc.finish()),
            OutputVector::Utf8(builder) => Arc::new(builder.finish()),
            OutputVector::Binary(builder) => Arc::new(builder.finish()),
            OutputVector::Int32List(builder) => Arc::new(builder.finish()),
            OutputVector::Int64List(builder) => Arc::new(builder.finish()),
            OutputVector::Entries(builder) => Arc::new(builder.finish()),
        }
    }
}
