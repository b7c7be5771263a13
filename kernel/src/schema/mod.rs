//! Definitions and functions to create and manipulate iceberg table schemas.
//!
//! Fields are identified by a stable integer id rather than by name or position, which is what
//! lets a schema evolve between snapshots. A [`Schema`] indexes every id it contains (including
//! list elements, map keys and map values) when it is constructed, so lookups by id are cheap.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::utils::require;
use crate::{Error, IcebergResult};

pub mod arrow_conversion;

pub type SchemaRef = Arc<Schema>;

/// Largest precision a decimal may declare
pub const MAX_DECIMAL_PRECISION: u8 = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PrimitiveType {
    Boolean,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    Float,
    Double,
    Decimal {
        precision: u8,
        scale: u8,
    },
    /// days since the epoch
    Date,
    /// microseconds since midnight
    Time,
    /// microseconds since the epoch, without a zone
    Timestamp,
    /// microseconds since the epoch, adjusted to UTC
    TimestampTz,
    String,
    Uuid,
    /// fixed length byte array
    Fixed(u64),
    Binary,
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Int => write!(f, "int"),
            Self::Long => write!(f, "long"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision}, {scale})"),
            Self::Date => write!(f, "date"),
            Self::Time => write!(f, "time"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::TimestampTz => write!(f, "timestamptz"),
            Self::String => write!(f, "string"),
            Self::Uuid => write!(f, "uuid"),
            Self::Fixed(len) => write!(f, "fixed[{len}]"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for PrimitiveType {
    type Err = Error;

    fn from_str(s: &str) -> IcebergResult<Self> {
        let ty = match s.trim() {
            "boolean" => Self::Boolean,
            "int" => Self::Int,
            "long" => Self::Long,
            "float" => Self::Float,
            "double" => Self::Double,
            "date" => Self::Date,
            "time" => Self::Time,
            "timestamp" => Self::Timestamp,
            "timestamptz" => Self::TimestampTz,
            "string" => Self::String,
            "uuid" => Self::Uuid,
            "binary" => Self::Binary,
            other => {
                if let Some(args) = other
                    .strip_prefix("decimal(")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    parse_decimal(args)?
                } else if let Some(len) = other
                    .strip_prefix("fixed[")
                    .and_then(|rest| rest.strip_suffix(']'))
                {
                    let len = len
                        .trim()
                        .parse()
                        .map_err(|_| Error::schema(format!("Invalid fixed type: {other}")))?;
                    Self::Fixed(len)
                } else {
                    return Err(Error::schema(format!("Unknown primitive type: {other}")));
                }
            }
        };
        Ok(ty)
    }
}

fn parse_decimal(args: &str) -> IcebergResult<PrimitiveType> {
    let invalid = || Error::schema(format!("Invalid decimal type: decimal({args})"));
    let (precision, scale) = args.split_once(',').ok_or_else(invalid)?;
    let precision: u8 = precision.trim().parse().map_err(|_| invalid())?;
    let scale: u8 = scale.trim().parse().map_err(|_| invalid())?;
    require!(
        precision > 0 && precision <= MAX_DECIMAL_PRECISION && scale <= precision,
        invalid()
    );
    Ok(PrimitiveType::Decimal { precision, scale })
}

impl TryFrom<String> for PrimitiveType {
    type Error = Error;

    fn try_from(value: String) -> IcebergResult<Self> {
        value.parse()
    }
}

impl From<PrimitiveType> for String {
    fn from(value: PrimitiveType) -> Self {
        value.to_string()
    }
}

/// The type of a schema field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SerdeDataType", from = "SerdeDataType")]
pub enum DataType {
    Primitive(PrimitiveType),
    Struct(StructType),
    List(ListType),
    Map(MapType),
}

impl DataType {
    pub const BOOLEAN: Self = DataType::Primitive(PrimitiveType::Boolean);
    pub const INT: Self = DataType::Primitive(PrimitiveType::Int);
    pub const LONG: Self = DataType::Primitive(PrimitiveType::Long);
    pub const FLOAT: Self = DataType::Primitive(PrimitiveType::Float);
    pub const DOUBLE: Self = DataType::Primitive(PrimitiveType::Double);
    pub const DATE: Self = DataType::Primitive(PrimitiveType::Date);
    pub const TIME: Self = DataType::Primitive(PrimitiveType::Time);
    pub const TIMESTAMP: Self = DataType::Primitive(PrimitiveType::Timestamp);
    pub const TIMESTAMPTZ: Self = DataType::Primitive(PrimitiveType::TimestampTz);
    pub const STRING: Self = DataType::Primitive(PrimitiveType::String);
    pub const UUID: Self = DataType::Primitive(PrimitiveType::Uuid);
    pub const BINARY: Self = DataType::Primitive(PrimitiveType::Binary);

    pub fn decimal(precision: u8, scale: u8) -> IcebergResult<Self> {
        parse_decimal(&format!("{precision}, {scale}")).map(Self::Primitive)
    }

    pub fn fixed(len: u64) -> Self {
        Self::Primitive(PrimitiveType::Fixed(len))
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveType> {
        match self {
            Self::Primitive(primitive) => Some(primitive),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive(_))
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(primitive) => write!(f, "{primitive}"),
            Self::Struct(st) => write!(
                f,
                "struct<{}>",
                st.fields()
                    .map(|field| format!("{}: {}", field.name, field.field_type))
                    .join(", ")
            ),
            Self::List(list) => write!(f, "list<{}>", list.element_type),
            Self::Map(map) => write!(f, "map<{}, {}>", map.key_type, map.value_type),
        }
    }
}

impl From<PrimitiveType> for DataType {
    fn from(primitive: PrimitiveType) -> Self {
        Self::Primitive(primitive)
    }
}

impl From<StructType> for DataType {
    fn from(st: StructType) -> Self {
        Self::Struct(st)
    }
}

impl From<ListType> for DataType {
    fn from(list: ListType) -> Self {
        Self::List(list)
    }
}

impl From<MapType> for DataType {
    fn from(map: MapType) -> Self {
        Self::Map(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructType {
    fields: Vec<NestedField>,
}

impl StructType {
    pub fn new(fields: impl IntoIterator<Item = NestedField>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn fields(&self) -> impl ExactSizeIterator<Item = &NestedField> {
        self.fields.iter()
    }

    pub fn field(&self, name: &str) -> Option<&NestedField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListType {
    pub element_id: i32,
    pub element_required: bool,
    pub element_type: Box<DataType>,
}

impl ListType {
    pub fn new(element_id: i32, element_type: impl Into<DataType>, element_required: bool) -> Self {
        Self {
            element_id,
            element_required,
            element_type: Box::new(element_type.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapType {
    pub key_id: i32,
    pub key_type: Box<DataType>,
    pub value_id: i32,
    pub value_required: bool,
    pub value_type: Box<DataType>,
}

impl MapType {
    pub fn new(
        key_id: i32,
        key_type: impl Into<DataType>,
        value_id: i32,
        value_type: impl Into<DataType>,
        value_required: bool,
    ) -> Self {
        Self {
            key_id,
            key_type: Box::new(key_type.into()),
            value_id,
            value_required,
            value_type: Box::new(value_type.into()),
        }
    }
}

/// A named, typed and uniquely identified field of a struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedField {
    pub id: i32,
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl NestedField {
    pub fn new(id: i32, name: impl Into<String>, field_type: impl Into<DataType>, required: bool) -> Self {
        Self {
            id,
            name: name.into(),
            required,
            field_type: field_type.into(),
            doc: None,
        }
    }

    pub fn required(id: i32, name: impl Into<String>, field_type: impl Into<DataType>) -> Self {
        Self::new(id, name, field_type, true)
    }

    pub fn optional(id: i32, name: impl Into<String>, field_type: impl Into<DataType>) -> Self {
        Self::new(id, name, field_type, false)
    }

    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

// The wire shape of a type: primitives are bare strings, nested types are objects tagged by `type`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SerdeDataType {
    Primitive(PrimitiveType),
    Nested(SerdeNestedType),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SerdeNestedType {
    Struct {
        fields: Vec<NestedField>,
    },
    List {
        #[serde(rename = "element-id")]
        element_id: i32,
        element: Box<DataType>,
        #[serde(rename = "element-required")]
        element_required: bool,
    },
    Map {
        #[serde(rename = "key-id")]
        key_id: i32,
        key: Box<DataType>,
        #[serde(rename = "value-id")]
        value_id: i32,
        value: Box<DataType>,
        #[serde(rename = "value-required")]
        value_required: bool,
    },
}

impl From<DataType> for SerdeDataType {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Primitive(primitive) => Self::Primitive(primitive),
            DataType::Struct(st) => Self::Nested(SerdeNestedType::Struct { fields: st.fields }),
            DataType::List(list) => Self::Nested(SerdeNestedType::List {
                element_id: list.element_id,
                element: list.element_type,
                element_required: list.element_required,
            }),
            DataType::Map(map) => Self::Nested(SerdeNestedType::Map {
                key_id: map.key_id,
                key: map.key_type,
                value_id: map.value_id,
                value: map.value_type,
                value_required: map.value_required,
            }),
        }
    }
}

impl From<SerdeDataType> for DataType {
    fn from(serde_type: SerdeDataType) -> Self {
        match serde_type {
            SerdeDataType::Primitive(primitive) => Self::Primitive(primitive),
            SerdeDataType::Nested(SerdeNestedType::Struct { fields }) => {
                Self::Struct(StructType { fields })
            }
            SerdeDataType::Nested(SerdeNestedType::List {
                element_id,
                element,
                element_required,
            }) => Self::List(ListType {
                element_id,
                element_required,
                element_type: element,
            }),
            SerdeDataType::Nested(SerdeNestedType::Map {
                key_id,
                key,
                value_id,
                value,
                value_required,
            }) => Self::Map(MapType {
                key_id,
                key_type: key,
                value_id,
                value_required,
                value_type: value,
            }),
        }
    }
}

/// The schema of a table at some point in its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SerdeSchema", try_from = "SerdeSchema")]
pub struct Schema {
    schema_id: i32,
    fields: Vec<NestedField>,
    identifier_field_ids: Vec<i32>,
    id_to_type: HashMap<i32, DataType>,
    id_to_name: HashMap<i32, String>,
    name_to_id: IndexMap<String, i32>,
}

impl Schema {
    /// Create a schema, indexing every field id it contains. Fails if an id is used twice.
    pub fn try_new(
        schema_id: i32,
        fields: impl IntoIterator<Item = NestedField>,
    ) -> IcebergResult<Self> {
        let fields: Vec<_> = fields.into_iter().collect();
        let mut index = SchemaIndex::default();
        index.index_fields(None, &fields)?;
        Ok(Self {
            schema_id,
            fields,
            identifier_field_ids: vec![],
            id_to_type: index.id_to_type,
            id_to_name: index.id_to_name,
            name_to_id: index.name_to_id,
        })
    }

    pub fn with_identifier_field_ids(
        mut self,
        ids: impl IntoIterator<Item = i32>,
    ) -> IcebergResult<Self> {
        let ids: Vec<_> = ids.into_iter().collect();
        if let Some(unknown) = ids.iter().find(|id| !self.contains_field_id(**id)) {
            return Err(Error::schema(format!(
                "Identifier field {unknown} is not part of schema {}",
                self.schema_id
            )));
        }
        self.identifier_field_ids = ids;
        Ok(self)
    }

    pub fn schema_id(&self) -> i32 {
        self.schema_id
    }

    /// Top level fields, in declaration order
    pub fn fields(&self) -> impl ExactSizeIterator<Item = &NestedField> {
        self.fields.iter()
    }

    pub fn identifier_field_ids(&self) -> &[i32] {
        &self.identifier_field_ids
    }

    /// Every field id in this schema, nested ids included
    pub fn field_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.id_to_type.keys().copied()
    }

    pub fn contains_field_id(&self, id: i32) -> bool {
        self.id_to_type.contains_key(&id)
    }

    pub fn field_type(&self, id: i32) -> Option<&DataType> {
        self.id_to_type.get(&id)
    }

    /// The full dotted name of the field with the given id
    pub fn column_name(&self, id: i32) -> Option<&str> {
        self.id_to_name.get(&id).map(String::as_str)
    }

    pub fn field_id_by_name(&self, name: &str) -> Option<i32> {
        self.name_to_id.get(name).copied()
    }

    /// Full dotted field names mapped to their ids, in schema traversal order
    pub fn name_to_id(&self) -> &IndexMap<String, i32> {
        &self.name_to_id
    }

    pub fn as_struct(&self) -> StructType {
        StructType::new(self.fields.iter().cloned())
    }
}

#[derive(Default)]
struct SchemaIndex {
    id_to_type: HashMap<i32, DataType>,
    id_to_name: HashMap<i32, String>,
    name_to_id: IndexMap<String, i32>,
}

impl SchemaIndex {
    fn insert(&mut self, id: i32, name: String, data_type: &DataType) -> IcebergResult<()> {
        require!(
            !self.id_to_type.contains_key(&id),
            Error::schema(format!("Duplicate field id {id} at {name}"))
        );
        self.id_to_type.insert(id, data_type.clone());
        self.id_to_name.insert(id, name.clone());
        self.name_to_id.insert(name, id);
        Ok(())
    }

    fn index_fields(&mut self, prefix: Option<&str>, fields: &[NestedField]) -> IcebergResult<()> {
        for field in fields {
            let name = match prefix {
                Some(prefix) => format!("{prefix}.{}", field.name),
                None => field.name.clone(),
            };
            self.insert(field.id, name.clone(), &field.field_type)?;
            self.index_type(&name, &field.field_type)?;
        }
        Ok(())
    }

    fn index_type(&mut self, name: &str, data_type: &DataType) -> IcebergResult<()> {
        match data_type {
            DataType::Primitive(_) => Ok(()),
            DataType::Struct(st) => self.index_fields(Some(name), &st.fields),
            DataType::List(list) => {
                let element_name = format!("{name}.element");
                self.insert(list.element_id, element_name.clone(), &list.element_type)?;
                self.index_type(&element_name, &list.element_type)
            }
            DataType::Map(map) => {
                let key_name = format!("{name}.key");
                self.insert(map.key_id, key_name.clone(), &map.key_type)?;
                self.index_type(&key_name, &map.key_type)?;
                let value_name = format!("{name}.value");
                self.insert(map.value_id, value_name.clone(), &map.value_type)?;
                self.index_type(&value_name, &map.value_type)
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SerdeSchema {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    schema_id: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifier_field_ids: Vec<i32>,
    fields: Vec<NestedField>,
}

impl From<Schema> for SerdeSchema {
    fn from(schema: Schema) -> Self {
        Self {
            kind: "struct".to_string(),
            schema_id: schema.schema_id,
            identifier_field_ids: schema.identifier_field_ids,
            fields: schema.fields,
        }
    }
}

impl TryFrom<SerdeSchema> for Schema {
    type Error = Error;

    fn try_from(serde_schema: SerdeSchema) -> IcebergResult<Self> {
        require!(
            serde_schema.kind == "struct",
            Error::schema(format!(
                "Schema must be a struct, found '{}'",
                serde_schema.kind
            ))
        );
        Schema::try_new(serde_schema.schema_id, serde_schema.fields)?
            .with_identifier_field_ids(serde_schema.identifier_field_ids)
    }
}
