//! Partition specs: the ordered, versioned set of derived fields a table lays its files out by.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::{DataType, NestedField, PrimitiveType, Schema, StructType};
use crate::{Error, IcebergResult};

pub type PartitionSpecRef = Arc<PartitionSpec>;

/// How a partition value is derived from its source column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Transform {
    Identity,
    Bucket(u32),
    Truncate(u32),
    Year,
    Month,
    Day,
    Hour,
    /// Always produces null. Used to retire a partition field without renumbering the rest.
    Void,
}

impl Transform {
    /// The type of the partition values this transform produces from a `source` column.
    pub fn result_type(&self, source: &DataType) -> IcebergResult<DataType> {
        let DataType::Primitive(primitive) = source else {
            return Err(Error::schema(format!(
                "Cannot partition by nested type {source} with transform {self}"
            )));
        };
        Ok(match self {
            Transform::Identity | Transform::Truncate(_) | Transform::Void => source.clone(),
            Transform::Bucket(_) | Transform::Year | Transform::Month | Transform::Hour => {
                DataType::INT
            }
            Transform::Day => match primitive {
                PrimitiveType::Date | PrimitiveType::Timestamp | PrimitiveType::TimestampTz => {
                    DataType::DATE
                }
                other => {
                    return Err(Error::schema(format!(
                        "Cannot apply transform day to type {other}"
                    )))
                }
            },
        })
    }
}

impl Display for Transform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Transform::Identity => write!(f, "identity"),
            Transform::Bucket(n) => write!(f, "bucket[{n}]"),
            Transform::Truncate(w) => write!(f, "truncate[{w}]"),
            Transform::Year => write!(f, "year"),
            Transform::Month => write!(f, "month"),
            Transform::Day => write!(f, "day"),
            Transform::Hour => write!(f, "hour"),
            Transform::Void => write!(f, "void"),
        }
    }
}

impl FromStr for Transform {
    type Err = Error;

    fn from_str(s: &str) -> IcebergResult<Self> {
        let parameterized = |prefix: &str| -> Option<IcebergResult<u32>> {
            let arg = s.strip_prefix(prefix)?.strip_prefix('[')?.strip_suffix(']')?;
            Some(
                arg.trim()
                    .parse()
                    .map_err(|_| Error::schema(format!("Invalid transform argument in '{s}'"))),
            )
        };
        match s {
            "identity" => Ok(Transform::Identity),
            "year" => Ok(Transform::Year),
            "month" => Ok(Transform::Month),
            "day" => Ok(Transform::Day),
            "hour" => Ok(Transform::Hour),
            "void" => Ok(Transform::Void),
            _ => {
                if let Some(n) = parameterized("bucket") {
                    Ok(Transform::Bucket(n?))
                } else if let Some(w) = parameterized("truncate") {
                    Ok(Transform::Truncate(w?))
                } else {
                    Err(Error::schema(format!("Unknown partition transform '{s}'")))
                }
            }
        }
    }
}

impl TryFrom<String> for Transform {
    type Error = Error;

    fn try_from(value: String) -> IcebergResult<Self> {
        value.parse()
    }
}

impl From<Transform> for String {
    fn from(value: Transform) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionField {
    pub source_id: i32,
    pub field_id: i32,
    pub name: String,
    pub transform: Transform,
}

impl PartitionField {
    pub fn new(source_id: i32, field_id: i32, name: impl Into<String>, transform: Transform) -> Self {
        Self {
            source_id,
            field_id,
            name: name.into(),
            transform,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    spec_id: i32,
    fields: Vec<PartitionField>,
}

impl PartitionSpec {
    pub fn new(spec_id: i32, fields: impl IntoIterator<Item = PartitionField>) -> Self {
        Self {
            spec_id,
            fields: fields.into_iter().collect(),
        }
    }

    pub fn unpartitioned(spec_id: i32) -> Self {
        Self::new(spec_id, [])
    }

    pub fn spec_id(&self) -> i32 {
        self.spec_id
    }

    pub fn fields(&self) -> impl ExactSizeIterator<Item = &PartitionField> {
        self.fields.iter()
    }

    /// A spec whose fields are all void partitions nothing.
    pub fn is_unpartitioned(&self) -> bool {
        self.fields
            .iter()
            .all(|field| field.transform == Transform::Void)
    }

    /// True if every source column this spec reads is still present in `schema`.
    pub fn is_compatible_with(&self, schema: &Schema) -> bool {
        self.fields
            .iter()
            .all(|field| schema.contains_field_id(field.source_id))
    }

    /// The struct type of this spec's partition values when bound to `schema`, fields in spec
    /// order. Every partition value may be null.
    pub fn partition_type(&self, schema: &Schema) -> IcebergResult<StructType> {
        let fields: Vec<NestedField> = self
            .fields
            .iter()
            .map(|field| {
                let source = schema.field_type(field.source_id).ok_or_else(|| {
                    Error::schema(format!(
                        "Partition field '{}' of spec {} references unknown column {}",
                        field.name, self.spec_id, field.source_id
                    ))
                })?;
                let result_type = field.transform.result_type(source)?;
                Ok(NestedField::optional(field.field_id, &field.name, result_type))
            })
            .collect::<IcebergResult<_>>()?;
        Ok(StructType::new(fields))
    }
}

/// Keep only the specs that can be bound to `schema`, keyed by spec id. Specs referencing a column
/// that has since been dropped are excluded.
pub fn filter_specs_by_schema<'a>(
    specs: impl IntoIterator<Item = (&'a i32, &'a PartitionSpecRef)>,
    schema: &Schema,
) -> BTreeMap<i32, PartitionSpecRef> {
    specs
        .into_iter()
        .filter(|(spec_id, spec)| {
            let compatible = spec.is_compatible_with(schema);
            if !compatible {
                debug!(
                    spec_id = **spec_id,
                    schema_id = schema.schema_id(),
                    "excluding partition spec that references dropped columns"
                );
            }
            compatible
        })
        .map(|(spec_id, spec)| (*spec_id, spec.clone()))
        .collect()
}
