//! Conversions from kernel schema types to the arrow column model handed to the planner.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use tracing::warn;

use crate::arrow::datatypes::{
    DataType as ArrowDataType, Field as ArrowField, Schema as ArrowSchema, TimeUnit,
};
use crate::arrow::error::ArrowError;
use crate::partition::PartitionSpec;
use crate::schema::{DataType, ListType, MapType, NestedField, PrimitiveType, Schema, StructType};
use crate::IcebergResult;

pub const LIST_ARRAY_ROOT: &str = "element";
pub const MAP_ROOT_DEFAULT: &str = "key_value";
pub const MAP_KEY_DEFAULT: &str = "key";
pub const MAP_VALUE_DEFAULT: &str = "value";
/// Field metadata key carrying the iceberg field id on converted arrow fields
pub const FIELD_ID_META_KEY: &str = "PARQUET:field_id";

/// Convert a kernel type into an arrow type (automatically implemented for all types that
/// implement [`TryFromKernel`])
pub trait TryIntoArrow<ArrowType> {
    fn try_into_arrow(self) -> Result<ArrowType, ArrowError>;
}

/// Convert a kernel type into an arrow type (a similar [`TryIntoArrow`] trait is automatically
/// implemented for all types that implement [`TryFromKernel`])
pub trait TryFromKernel<KernelType>: Sized {
    fn try_from_kernel(t: KernelType) -> Result<Self, ArrowError>;
}

impl<KernelType, ArrowType> TryIntoArrow<ArrowType> for KernelType
where
    ArrowType: TryFromKernel<KernelType>,
{
    fn try_into_arrow(self) -> Result<ArrowType, ArrowError> {
        ArrowType::try_from_kernel(self)
    }
}

impl TryFromKernel<&Schema> for ArrowSchema {
    fn try_from_kernel(s: &Schema) -> Result<Self, ArrowError> {
        let fields: Vec<ArrowField> = s.fields().map(|f| f.try_into_arrow()).try_collect()?;
        Ok(ArrowSchema::new(fields))
    }
}

impl TryFromKernel<&NestedField> for ArrowField {
    fn try_from_kernel(f: &NestedField) -> Result<Self, ArrowError> {
        let metadata = HashMap::from([(FIELD_ID_META_KEY.to_string(), f.id.to_string())]);
        Ok(
            ArrowField::new(&f.name, (&f.field_type).try_into_arrow()?, !f.required)
                .with_metadata(metadata),
        )
    }
}

impl TryFromKernel<&ListType> for ArrowField {
    fn try_from_kernel(a: &ListType) -> Result<Self, ArrowError> {
        Ok(ArrowField::new(
            LIST_ARRAY_ROOT,
            a.element_type.as_ref().try_into_arrow()?,
            !a.element_required,
        ))
    }
}

impl TryFromKernel<&MapType> for ArrowField {
    fn try_from_kernel(a: &MapType) -> Result<Self, ArrowError> {
        Ok(ArrowField::new(
            MAP_ROOT_DEFAULT,
            ArrowDataType::Struct(
                vec![
                    ArrowField::new(MAP_KEY_DEFAULT, a.key_type.as_ref().try_into_arrow()?, false),
                    ArrowField::new(
                        MAP_VALUE_DEFAULT,
                        a.value_type.as_ref().try_into_arrow()?,
                        !a.value_required,
                    ),
                ]
                .into(),
            ),
            false, // always non-null
        ))
    }
}

impl TryFromKernel<&StructType> for ArrowDataType {
    fn try_from_kernel(s: &StructType) -> Result<Self, ArrowError> {
        Ok(ArrowDataType::Struct(
            s.fields()
                .map(TryIntoArrow::try_into_arrow)
                .collect::<Result<Vec<ArrowField>, ArrowError>>()?
                .into(),
        ))
    }
}

impl TryFromKernel<&DataType> for ArrowDataType {
    fn try_from_kernel(t: &DataType) -> Result<Self, ArrowError> {
        match t {
            DataType::Primitive(p) => match p {
                PrimitiveType::Boolean => Ok(ArrowDataType::Boolean),
                PrimitiveType::Int => Ok(ArrowDataType::Int32),
                PrimitiveType::Long => Ok(ArrowDataType::Int64),
                PrimitiveType::Float => Ok(ArrowDataType::Float32),
                PrimitiveType::Double => Ok(ArrowDataType::Float64),
                PrimitiveType::Decimal { precision, scale } => {
                    Ok(ArrowDataType::Decimal128(*precision, *scale as i8)) // 0..=38
                }
                PrimitiveType::Date => Ok(ArrowDataType::Date32),
                PrimitiveType::Time => Ok(ArrowDataType::Time64(TimeUnit::Microsecond)),
                PrimitiveType::Timestamp => {
                    Ok(ArrowDataType::Timestamp(TimeUnit::Microsecond, None))
                }
                PrimitiveType::TimestampTz => Ok(ArrowDataType::Timestamp(
                    TimeUnit::Microsecond,
                    Some("UTC".into()),
                )),
                PrimitiveType::String => Ok(ArrowDataType::Utf8),
                PrimitiveType::Uuid => Ok(ArrowDataType::FixedSizeBinary(16)),
                PrimitiveType::Fixed(len) => {
                    let len = i32::try_from(*len).map_err(|_| {
                        ArrowError::SchemaError(format!("fixed[{len}] is too wide for arrow"))
                    })?;
                    Ok(ArrowDataType::FixedSizeBinary(len))
                }
                PrimitiveType::Binary => Ok(ArrowDataType::Binary),
            },
            DataType::Struct(s) => s.try_into_arrow(),
            DataType::List(a) => Ok(ArrowDataType::List(Arc::new(a.try_into_arrow()?))),
            DataType::Map(m) => Ok(ArrowDataType::Map(Arc::new(m.try_into_arrow()?), false)),
        }
    }
}

/// Converts a resolved table schema into the arrow schema reported to the planner, and derives
/// the table's partition column names.
#[derive(Debug, Clone)]
pub struct SchemaConverter {
    table_name: String,
    map_type_enabled: bool,
}

impl SchemaConverter {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            map_type_enabled: true,
        }
    }

    /// When map columns are disabled they are dropped from the converted schema.
    pub fn with_map_type_enabled(mut self, enabled: bool) -> Self {
        self.map_type_enabled = enabled;
        self
    }

    pub fn from_iceberg(&self, schema: &Schema) -> IcebergResult<ArrowSchema> {
        if self.map_type_enabled {
            return Ok(schema.try_into_arrow()?);
        }
        let fields: Vec<ArrowField> = self
            .strip_map_fields("", schema.fields())
            .iter()
            .map(TryIntoArrow::try_into_arrow)
            .try_collect()?;
        Ok(ArrowSchema::new(fields))
    }

    /// Names of the source columns of `spec`'s fields, resolved against `schema`, in spec order
    /// and without duplicates. Fields whose source column no longer exists are skipped.
    pub fn partition_columns(&self, spec: &PartitionSpec, schema: &Schema) -> Vec<String> {
        spec.fields()
            .filter_map(|field| schema.column_name(field.source_id))
            .unique()
            .map(String::from)
            .collect()
    }

    fn strip_map_fields<'a>(
        &self,
        prefix: &str,
        fields: impl Iterator<Item = &'a NestedField>,
    ) -> Vec<NestedField> {
        fields
            .filter_map(|field| {
                let path = format!("{prefix}{}", field.name);
                match self.strip_map_type(&path, &field.field_type) {
                    Some(field_type) => Some(NestedField {
                        field_type,
                        ..field.clone()
                    }),
                    None => {
                        warn!(
                            table = %self.table_name,
                            column = %path,
                            "dropping column with map type since map types are disabled"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    fn strip_map_type(&self, path: &str, data_type: &DataType) -> Option<DataType> {
        match data_type {
            DataType::Primitive(_) => Some(data_type.clone()),
            DataType::Map(_) => None,
            DataType::List(list) => {
                let element = self.strip_map_type(path, &list.element_type)?;
                Some(ListType::new(list.element_id, element, list.element_required).into())
            }
            DataType::Struct(st) => {
                let fields = self.strip_map_fields(&format!("{path}."), st.fields());
                (!fields.is_empty()).then(|| StructType::new(fields).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{PartitionField, Transform};

    fn schema_with_map() -> Schema {
        Schema::try_new(
            0,
            [
                NestedField::required(1, "id", DataType::LONG),
                NestedField::optional(
                    2,
                    "props",
                    MapType::new(3, DataType::STRING, 4, DataType::STRING, false),
                ),
                NestedField::optional(
                    5,
                    "nested",
                    StructType::new([
                        NestedField::optional(6, "ts", DataType::TIMESTAMPTZ),
                        NestedField::optional(
                            7,
                            "attrs",
                            MapType::new(8, DataType::STRING, 9, DataType::INT, true),
                        ),
                    ]),
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_convert_field_carries_id_and_nullability() {
        let arrow_schema = SchemaConverter::new("t")
            .from_iceberg(&schema_with_map())
            .unwrap();
        let id = arrow_schema.field_with_name("id").unwrap();
        assert_eq!(id.data_type(), &ArrowDataType::Int64);
        assert!(!id.is_nullable());
        assert_eq!(
            id.metadata().get(FIELD_ID_META_KEY).map(String::as_str),
            Some("1")
        );
        let props = arrow_schema.field_with_name("props").unwrap();
        assert!(matches!(props.data_type(), ArrowDataType::Map(_, false)));
    }

    #[test]
    fn test_maps_dropped_when_disabled() {
        let arrow_schema = SchemaConverter::new("t")
            .with_map_type_enabled(false)
            .from_iceberg(&schema_with_map())
            .unwrap();
        let names: Vec<_> = arrow_schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["id", "nested"]);
        let ArrowDataType::Struct(nested) = arrow_schema.field(1).data_type() else {
            panic!("nested should remain a struct");
        };
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].name(), "ts");
        assert_eq!(
            nested[0].data_type(),
            &ArrowDataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        );
    }

    #[test]
    fn test_partition_columns_skip_dropped_and_duplicates() {
        let schema = schema_with_map();
        let spec = PartitionSpec::new(
            1,
            [
                PartitionField::new(1, 1000, "id_bucket", Transform::Bucket(16)),
                PartitionField::new(6, 1001, "ts_day", Transform::Day),
                PartitionField::new(42, 1002, "dropped", Transform::Identity),
                PartitionField::new(1, 1003, "id", Transform::Identity),
            ],
        );
        let columns = SchemaConverter::new("t").partition_columns(&spec, &schema);
        assert_eq!(columns, vec!["id".to_string(), "nested.ts".to_string()]);
    }
}
