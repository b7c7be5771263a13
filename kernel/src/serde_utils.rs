//! Transportable encodings of partition specs, schemas and per-file partition info, as handed to
//! the planner and to downstream scan stages.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expressions::PartitionData;
use crate::partition::{PartitionSpec, PartitionSpecRef};
use crate::schema::{Schema, StructType};
use crate::utils::require;
use crate::{Error, IcebergResult};

/// Encode specs as a JSON object keyed by spec id.
pub fn serialize_partition_specs(specs: &BTreeMap<i32, PartitionSpecRef>) -> IcebergResult<Vec<u8>> {
    let specs: BTreeMap<i32, &PartitionSpec> =
        specs.iter().map(|(id, spec)| (*id, spec.as_ref())).collect();
    Ok(serde_json::to_vec(&specs)?)
}

pub fn deserialize_partition_specs(bytes: &[u8]) -> IcebergResult<BTreeMap<i32, PartitionSpecRef>> {
    let specs: BTreeMap<i32, PartitionSpec> = serde_json::from_slice(bytes)?;
    specs
        .into_iter()
        .map(|(id, spec)| {
            require!(
                id == spec.spec_id(),
                Error::generic(format!(
                    "Partition spec {} is keyed by mismatched id {id}",
                    spec.spec_id()
                ))
            );
            Ok((id, Arc::new(spec)))
        })
        .collect()
}

pub fn serialize_schema(schema: &Schema) -> IcebergResult<String> {
    Ok(serde_json::to_string(schema)?)
}

pub fn deserialize_schema(json: &str) -> IcebergResult<Schema> {
    Ok(serde_json::from_str(json)?)
}

/// The partition a file was written to, self-describing enough to be interpreted without its
/// spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionInfo {
    pub spec_id: i32,
    pub fields: Vec<PartitionInfoField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionInfoField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub value: Value,
}

impl PartitionInfo {
    /// Pair each field of `partition_type` with the value at the same position in `data`.
    pub fn try_new(
        spec_id: i32,
        partition_type: &StructType,
        data: &PartitionData,
    ) -> IcebergResult<Self> {
        let fields = partition_type
            .fields()
            .enumerate()
            .map(|(i, field)| {
                let value = data
                    .get(i, &field.field_type)?
                    .map_or(Value::Null, |literal| literal.to_json());
                Ok(PartitionInfoField {
                    name: field.name.clone(),
                    field_type: field.field_type.to_string(),
                    value,
                })
            })
            .collect::<IcebergResult<_>>()?;
        Ok(Self { spec_id, fields })
    }

    pub fn to_bytes(&self) -> IcebergResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> IcebergResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::expressions::Literal;
    use crate::partition::{PartitionField, Transform};
    use crate::schema::{DataType, NestedField};

    #[test]
    fn test_partition_specs_json_map() {
        let specs: BTreeMap<i32, PartitionSpecRef> = [
            (0, Arc::new(PartitionSpec::unpartitioned(0))),
            (
                1,
                Arc::new(PartitionSpec::new(
                    1,
                    [PartitionField::new(2, 1000, "region", Transform::Identity)],
                )),
            ),
        ]
        .into();
        let bytes = serialize_partition_specs(&specs).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({
                "0": {"spec-id": 0, "fields": []},
                "1": {"spec-id": 1, "fields": [
                    {"source-id": 2, "field-id": 1000, "name": "region", "transform": "identity"}
                ]}
            })
        );
        assert_eq!(deserialize_partition_specs(&bytes).unwrap(), specs);
    }

    #[test]
    fn test_mismatched_spec_key() {
        let bytes = br#"{"4": {"spec-id": 0, "fields": []}}"#;
        assert!(deserialize_partition_specs(bytes).is_err());
    }

    #[test]
    fn test_schema_text() {
        let schema = Schema::try_new(2, [NestedField::required(1, "id", DataType::LONG)]).unwrap();
        let text = serialize_schema(&schema).unwrap();
        assert_eq!(
            text,
            r#"{"type":"struct","schema-id":2,"fields":[{"id":1,"name":"id","required":true,"type":"long"}]}"#
        );
        assert_eq!(deserialize_schema(&text).unwrap(), schema);
    }

    #[test]
    fn test_partition_info() {
        let partition_type = StructType::new([
            NestedField::optional(1000, "region", DataType::STRING),
            NestedField::optional(1001, "day", DataType::DATE),
        ]);
        let data = PartitionData::new([Some(Literal::String("eu".into())), None]);
        let info = PartitionInfo::try_new(3, &partition_type, &data).unwrap();
        let bytes = info.to_bytes().unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&bytes).unwrap(),
            json!({
                "spec-id": 3,
                "fields": [
                    {"name": "region", "type": "string", "value": "eu"},
                    {"name": "day", "type": "date", "value": null}
                ]
            })
        );
        assert_eq!(PartitionInfo::from_bytes(&bytes).unwrap(), info);
    }
}
