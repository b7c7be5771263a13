//! The set of per-file fields the projection engine can produce, and how each is extracted from a
//! content file.

use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use itertools::Itertools;
use strum::{AsRefStr, Display as StrumDisplay, EnumIter, EnumString, IntoEnumIterator, VariantNames};

use crate::arrow::datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema};
use crate::expressions::Literal;
use crate::manifest::ContentFile;
use crate::partition::PartitionSpecRef;
use crate::schema::{DataType, Schema, SchemaRef, StructType};
use crate::serde_utils::PartitionInfo;
use crate::{Error, IcebergResult};

/// Element name of list-typed output fields
pub const LIST_ELEMENT_NAME: &str = "$data$";
pub const ENTRY_KEY_NAME: &str = "key";
pub const ENTRY_VALUE_NAME: &str = "value";

/// A field of the table-files output. Parses from the output column name; `datafilePath` is
/// accepted for `file_path`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    StrumDisplay,
    AsRefStr,
    VariantNames,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum ProjectedField {
    Content,
    #[strum(to_string = "file_path", serialize = "datafilePath")]
    FilePath,
    FileFormat,
    /// Partition values rendered as `{name=value, ...}`
    Partition,
    /// Partition values as a self-describing binary blob
    #[strum(to_string = "existingpartitioninfo")]
    ExistingPartitionInfo,
    RecordCount,
    FileSizeInBytes,
    ColumnSizes,
    ValueCounts,
    NullValueCounts,
    NanValueCounts,
    LowerBounds,
    UpperBounds,
    SplitOffsets,
    EqualityIds,
    SortOrderId,
    SpecId,
}

fn entry_struct_type() -> ArrowDataType {
    ArrowDataType::Struct(
        vec![
            Field::new(ENTRY_KEY_NAME, ArrowDataType::Utf8, false),
            Field::new(ENTRY_VALUE_NAME, ArrowDataType::Utf8, true),
        ]
        .into(),
    )
}

fn list_of(element: ArrowDataType, nullable: bool) -> ArrowDataType {
    ArrowDataType::List(Arc::new(Field::new(LIST_ELEMENT_NAME, element, nullable)))
}

impl ProjectedField {
    /// The arrow type this field is produced as by default.
    pub fn data_type(&self) -> ArrowDataType {
        use ProjectedField::*;
        match self {
            Content | FilePath | FileFormat | Partition => ArrowDataType::Utf8,
            ExistingPartitionInfo => ArrowDataType::Binary,
            RecordCount | FileSizeInBytes => ArrowDataType::Int64,
            SortOrderId | SpecId => ArrowDataType::Int32,
            ColumnSizes | ValueCounts | NullValueCounts | NanValueCounts | LowerBounds
            | UpperBounds => list_of(entry_struct_type(), false),
            SplitOffsets => list_of(ArrowDataType::Int64, true),
            EqualityIds => list_of(ArrowDataType::Int32, true),
        }
    }

    pub fn arrow_field(&self) -> Field {
        Field::new(self.to_string(), self.data_type(), true)
    }

    /// Whether values of this field can be written into a vector declared as `declared`.
    /// Integer fields may be widened. List elements must be nullable because list values keep
    /// their null positions. Map-like fields need a list of two-string structs.
    pub fn accepts(&self, declared: &ArrowDataType) -> bool {
        use ProjectedField::*;
        match (self, declared) {
            (SortOrderId | SpecId, ArrowDataType::Int32 | ArrowDataType::Int64) => true,
            (SplitOffsets, ArrowDataType::List(element)) => {
                element.is_nullable() && element.data_type() == &ArrowDataType::Int64
            }
            (EqualityIds, ArrowDataType::List(element)) => {
                element.is_nullable()
                    && matches!(
                        element.data_type(),
                        ArrowDataType::Int32 | ArrowDataType::Int64
                    )
            }
            (
                ColumnSizes | ValueCounts | NullValueCounts | NanValueCounts | LowerBounds
                | UpperBounds,
                ArrowDataType::List(element),
            ) => match element.data_type() {
                ArrowDataType::Struct(fields) => {
                    fields.len() == 2
                        && fields
                            .iter()
                            .all(|f| f.data_type() == &ArrowDataType::Utf8)
                }
                _ => false,
            },
            _ => &self.data_type() == declared,
        }
    }

    /// The full table-files output schema, one column per field in declaration order.
    pub fn table_files_schema() -> ArrowSchema {
        ArrowSchema::new(
            ProjectedField::iter()
                .map(|field| field.arrow_field())
                .collect_vec(),
        )
    }

    pub(crate) fn extractor(&self) -> Extractor {
        use ProjectedField::*;
        match self {
            Content => |_, file| Ok(FieldValue::Utf8(Some(file.content.to_string()))),
            FilePath => |_, file| Ok(FieldValue::Utf8(Some(file.file_path.clone()))),
            FileFormat => |_, file| Ok(FieldValue::Utf8(Some(file.file_format.to_string()))),
            Partition => |ctx, file| ctx.render_partition(file).map(|s| FieldValue::Utf8(Some(s))),
            ExistingPartitionInfo => |ctx, file| {
                let info = PartitionInfo::try_new(
                    ctx.spec.spec_id(),
                    &ctx.partition_type,
                    &file.partition,
                )?;
                Ok(FieldValue::Binary(Some(info.to_bytes()?)))
            },
            RecordCount => |_, file| Ok(FieldValue::Int64(Some(file.record_count))),
            FileSizeInBytes => |_, file| Ok(FieldValue::Int64(Some(file.file_size_in_bytes))),
            ColumnSizes => |ctx, file| Ok(ctx.count_entries(file.column_sizes.as_ref())),
            ValueCounts => |ctx, file| Ok(ctx.count_entries(file.value_counts.as_ref())),
            NullValueCounts => |ctx, file| Ok(ctx.count_entries(file.null_value_counts.as_ref())),
            NanValueCounts => |ctx, file| Ok(ctx.count_entries(file.nan_value_counts.as_ref())),
            LowerBounds => |ctx, file| ctx.bound_entries(file.lower_bounds.as_ref()),
            UpperBounds => |ctx, file| ctx.bound_entries(file.upper_bounds.as_ref()),
            SplitOffsets => |_, file| Ok(FieldValue::Int64List(file.split_offsets.clone())),
            EqualityIds => |_, file| Ok(FieldValue::Int32List(file.equality_ids.clone())),
            SortOrderId => |_, file| Ok(FieldValue::Int32(file.sort_order_id)),
            SpecId => |_, file| Ok(FieldValue::Int32(Some(file.spec_id))),
        }
    }
}

/// A value extracted for one output field of one file, before it is written.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue {
    Utf8(Option<String>),
    Binary(Option<Vec<u8>>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Int32List(Option<Vec<Option<i32>>>),
    Int64List(Option<Vec<Option<i64>>>),
    /// Column id to stringified value, in source order
    Entries(Option<Vec<(String, String)>>),
}

pub(crate) type Extractor = fn(&ProjectionContext, &ContentFile) -> IcebergResult<FieldValue>;

/// What the engine knows about the manifest currently being projected.
#[derive(Debug, Clone)]
pub(crate) struct ProjectionContext {
    pub(crate) spec: PartitionSpecRef,
    pub(crate) partition_type: StructType,
    pub(crate) schema: SchemaRef,
}

impl ProjectionContext {
    /// `spec_schema` is a schema that still has every source column of `spec`; statistics are
    /// reported against `schema`.
    pub(crate) fn try_new(
        spec: PartitionSpecRef,
        spec_schema: &Schema,
        schema: SchemaRef,
    ) -> IcebergResult<Self> {
        let partition_type = spec.partition_type(spec_schema)?;
        Ok(Self {
            spec,
            partition_type,
            schema,
        })
    }

    fn render_partition(&self, file: &ContentFile) -> IcebergResult<String> {
        let values: Vec<String> = self
            .partition_type
            .fields()
            .enumerate()
            .map(|(i, field)| {
                let value = file.partition.get(i, &field.field_type)?;
                Ok(match value {
                    Some(literal) => format!("{}={literal}", field.name),
                    None => format!("{}=null", field.name),
                })
            })
            .collect::<IcebergResult<_>>()?;
        Ok(format!("{{{}}}", values.join(", ")))
    }

    // columns dropped since the file was written are left out
    fn count_entries(&self, map: Option<&IndexMap<i32, i64>>) -> FieldValue {
        FieldValue::Entries(map.map(|map| {
            map.iter()
                .filter(|(id, _)| self.schema.contains_field_id(**id))
                .map(|(id, value)| (id.to_string(), value.to_string()))
                .collect()
        }))
    }

    fn bound_entries(&self, map: Option<&IndexMap<i32, Bytes>>) -> IcebergResult<FieldValue> {
        let Some(map) = map else {
            return Ok(FieldValue::Entries(None));
        };
        let entries = map
            .iter()
            .filter_map(|(id, bytes)| {
                let field_type = self.schema.field_type(*id)?;
                Some(self.decode_bound(*id, field_type, bytes))
            })
            .collect::<IcebergResult<_>>()?;
        Ok(FieldValue::Entries(Some(entries)))
    }

    fn decode_bound(
        &self,
        id: i32,
        field_type: &DataType,
        bytes: &[u8],
    ) -> IcebergResult<(String, String)> {
        let primitive = field_type.as_primitive().ok_or_else(|| {
            Error::invalid_literal(format!("column {id} of type {field_type} cannot carry bounds"))
        })?;
        let literal = Literal::try_from_bytes(bytes, primitive)?;
        Ok((id.to_string(), literal.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("content", ProjectedField::Content)]
    #[case("file_path", ProjectedField::FilePath)]
    #[case("datafilePath", ProjectedField::FilePath)]
    #[case("existingpartitioninfo", ProjectedField::ExistingPartitionInfo)]
    #[case("nan_value_counts", ProjectedField::NanValueCounts)]
    #[case("file_size_in_bytes", ProjectedField::FileSizeInBytes)]
    fn test_parse_field_names(#[case] name: &str, #[case] field: ProjectedField) {
        assert_eq!(name.parse::<ProjectedField>().unwrap(), field);
    }

    #[test]
    fn test_unknown_field_name() {
        assert!("key_metadata".parse::<ProjectedField>().is_err());
        assert_eq!(ProjectedField::FilePath.to_string(), "file_path");
    }

    #[test]
    fn test_table_files_schema() {
        let schema = ProjectedField::table_files_schema();
        assert_eq!(schema.fields().len(), ProjectedField::VARIANTS.len());
        for field in schema.fields() {
            let projected: ProjectedField = field.name().parse().unwrap();
            assert!(projected.accepts(field.data_type()));
        }
    }

    #[rstest]
    #[case(ProjectedField::SpecId, ArrowDataType::Int64, true)]
    #[case(ProjectedField::RecordCount, ArrowDataType::Int32, false)]
    #[case(ProjectedField::FilePath, ArrowDataType::Binary, false)]
    #[case(ProjectedField::EqualityIds, list_of(ArrowDataType::Int64, true), true)]
    #[case(ProjectedField::SplitOffsets, list_of(ArrowDataType::Int32, true), false)]
    #[case(ProjectedField::LowerBounds, list_of(ArrowDataType::Utf8, true), false)]
    #[case(ProjectedField::LowerBounds, list_of(entry_struct_type(), true), true)]
    #[case(ProjectedField::SplitOffsets, list_of(ArrowDataType::Int64, false), false)]
    #[case(ProjectedField::EqualityIds, list_of(ArrowDataType::Int32, false), false)]
    #[case(
        ProjectedField::UpperBounds,
        list_of(
            ArrowDataType::Struct(
                vec![
                    Field::new("key", ArrowDataType::Utf8, false),
                    Field::new("value", ArrowDataType::Utf8, true),
                    Field::new("extra", ArrowDataType::Utf8, true),
                ]
                .into()
            ),
            false
        ),
        false
    )]
    fn test_accepts(
        #[case] field: ProjectedField,
        #[case] declared: ArrowDataType,
        #[case] expected: bool,
    ) {
        assert_eq!(field.accepts(&declared), expected);
    }
}
