//! Scalar values carried by manifests: decoded statistic bounds and partition values.

use std::fmt::{Display, Formatter};

use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use crate::schema::{DataType, PrimitiveType};
use crate::utils::{require, to_hex};
use crate::{Error, IcebergResult};

/// A single typed value. Temporal values keep their storage encoding: days since epoch for dates,
/// microseconds for times and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal { unscaled: i128, scale: u8 },
    Date(i32),
    Time(i64),
    Timestamp(i64),
    TimestampTz(i64),
    String(String),
    Uuid(Uuid),
    Fixed(Bytes),
    Binary(Bytes),
}

fn le_bytes<const N: usize>(bytes: &[u8], ty: &PrimitiveType) -> IcebergResult<[u8; N]> {
    bytes.try_into().map_err(|_| {
        Error::invalid_literal(format!(
            "expected {N} bytes for a {ty} value, found {}",
            bytes.len()
        ))
    })
}

impl Literal {
    /// Decode a value from the single-value binary form manifests use for column bounds.
    ///
    /// Numbers are little-endian; an `int`-sized value is accepted for `long` and a `float`-sized
    /// value for `double`, since files written before a type promotion keep the narrower
    /// encoding. Decimals are the big-endian two's complement of the unscaled value and uuids are
    /// 16 big-endian bytes.
    pub fn try_from_bytes(bytes: &[u8], ty: &PrimitiveType) -> IcebergResult<Self> {
        let literal = match ty {
            PrimitiveType::Boolean => {
                let [byte] = le_bytes::<1>(bytes, ty)?;
                Literal::Boolean(byte != 0)
            }
            PrimitiveType::Int => Literal::Int(i32::from_le_bytes(le_bytes(bytes, ty)?)),
            PrimitiveType::Long if bytes.len() == 4 => {
                Literal::Long(i32::from_le_bytes(le_bytes(bytes, ty)?).into())
            }
            PrimitiveType::Long => Literal::Long(i64::from_le_bytes(le_bytes(bytes, ty)?)),
            PrimitiveType::Float => Literal::Float(f32::from_le_bytes(le_bytes(bytes, ty)?)),
            PrimitiveType::Double if bytes.len() == 4 => {
                Literal::Double(f32::from_le_bytes(le_bytes(bytes, ty)?).into())
            }
            PrimitiveType::Double => Literal::Double(f64::from_le_bytes(le_bytes(bytes, ty)?)),
            PrimitiveType::Decimal { scale, .. } => {
                require!(
                    !bytes.is_empty() && bytes.len() <= 16,
                    Error::invalid_literal(format!(
                        "expected 1 to 16 bytes for a {ty} value, found {}",
                        bytes.len()
                    ))
                );
                let fill = if bytes[0] & 0x80 != 0 { 0xff } else { 0x00 };
                let mut buf = [fill; 16];
                buf[16 - bytes.len()..].copy_from_slice(bytes);
                Literal::Decimal {
                    unscaled: i128::from_be_bytes(buf),
                    scale: *scale,
                }
            }
            PrimitiveType::Date => Literal::Date(i32::from_le_bytes(le_bytes(bytes, ty)?)),
            PrimitiveType::Time => Literal::Time(i64::from_le_bytes(le_bytes(bytes, ty)?)),
            PrimitiveType::Timestamp => {
                Literal::Timestamp(i64::from_le_bytes(le_bytes(bytes, ty)?))
            }
            PrimitiveType::TimestampTz => {
                Literal::TimestampTz(i64::from_le_bytes(le_bytes(bytes, ty)?))
            }
            PrimitiveType::String => Literal::String(
                std::str::from_utf8(bytes)
                    .map_err(|e| Error::invalid_literal(format!("invalid utf-8 string: {e}")))?
                    .to_string(),
            ),
            PrimitiveType::Uuid => Literal::Uuid(Uuid::from_bytes(le_bytes(bytes, ty)?)),
            PrimitiveType::Fixed(_) => Literal::Fixed(Bytes::copy_from_slice(bytes)),
            PrimitiveType::Binary => Literal::Binary(Bytes::copy_from_slice(bytes)),
        };
        Ok(literal)
    }

    /// Whether this value can stand for a value of `ty`. Decimals must agree on scale.
    pub fn matches_type(&self, ty: &PrimitiveType) -> bool {
        matches!(
            (self, ty),
            (Literal::Boolean(_), PrimitiveType::Boolean)
                | (Literal::Int(_), PrimitiveType::Int)
                | (Literal::Long(_), PrimitiveType::Long)
                | (Literal::Float(_), PrimitiveType::Float)
                | (Literal::Double(_), PrimitiveType::Double)
                | (Literal::Date(_), PrimitiveType::Date)
                | (Literal::Time(_), PrimitiveType::Time)
                | (Literal::Timestamp(_), PrimitiveType::Timestamp)
                | (Literal::TimestampTz(_), PrimitiveType::TimestampTz)
                | (Literal::String(_), PrimitiveType::String)
                | (Literal::Uuid(_), PrimitiveType::Uuid)
                | (Literal::Fixed(_), PrimitiveType::Fixed(_))
                | (Literal::Binary(_), PrimitiveType::Binary)
        ) || matches!(
            (self, ty),
            (Literal::Decimal { scale, .. }, PrimitiveType::Decimal { scale: s, .. }) if scale == s
        )
    }

    /// This value as a value of `ty`, widening it when `ty` is a promotion of the value's own
    /// type (int to long, float to double). `None` if it cannot stand for a value of `ty`.
    pub fn promote(&self, ty: &PrimitiveType) -> Option<Literal> {
        match (self, ty) {
            (Literal::Int(v), PrimitiveType::Long) => Some(Literal::Long(i64::from(*v))),
            (Literal::Float(v), PrimitiveType::Double) => Some(Literal::Double(f64::from(*v))),
            _ => self.matches_type(ty).then(|| self.clone()),
        }
    }

    /// A JSON rendering of this value. Numbers stay numbers; decimals, uuids and bytes become
    /// strings.
    pub fn to_json(&self) -> Value {
        match self {
            Literal::Boolean(b) => Value::from(*b),
            Literal::Int(v) | Literal::Date(v) => Value::from(*v),
            Literal::Long(v)
            | Literal::Time(v)
            | Literal::Timestamp(v)
            | Literal::TimestampTz(v) => Value::from(*v),
            Literal::Float(v) => Value::from(*v),
            Literal::Double(v) => Value::from(*v),
            Literal::String(s) => Value::from(s.as_str()),
            Literal::Decimal { .. } | Literal::Uuid(_) | Literal::Fixed(_) | Literal::Binary(_) => {
                Value::from(self.to_string())
            }
        }
    }
}

fn fmt_decimal(f: &mut Formatter<'_>, unscaled: i128, scale: u8) -> std::fmt::Result {
    if scale == 0 {
        return write!(f, "{unscaled}");
    }
    let scale = usize::from(scale);
    let digits = format!("{:0>width$}", unscaled.unsigned_abs(), width = scale + 1);
    let (int, frac) = digits.split_at(digits.len() - scale);
    let sign = if unscaled < 0 { "-" } else { "" };
    write!(f, "{sign}{int}.{frac}")
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Int(v) | Literal::Date(v) => write!(f, "{v}"),
            Literal::Long(v)
            | Literal::Time(v)
            | Literal::Timestamp(v)
            | Literal::TimestampTz(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Double(v) => write!(f, "{v}"),
            Literal::Decimal { unscaled, scale } => fmt_decimal(f, *unscaled, *scale),
            Literal::String(s) => write!(f, "{s}"),
            Literal::Uuid(u) => write!(f, "{u}"),
            Literal::Fixed(b) | Literal::Binary(b) => write!(f, "{}", to_hex(b)),
        }
    }
}

/// The partition values recorded for one content file, positionally aligned with the fields of
/// the partition spec the file was written with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionData {
    values: Vec<Option<Literal>>,
}

impl PartitionData {
    pub fn new(values: impl IntoIterator<Item = Option<Literal>>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read the value at `index` as a value of `ty`, widening values written before the column
    /// was promoted. A null is `Ok(None)`; a value of some other type, or a position past the end
    /// of the record, is an error.
    pub fn get(&self, index: usize, ty: &DataType) -> IcebergResult<Option<Literal>> {
        let value = self.values.get(index).ok_or_else(|| {
            Error::invalid_literal(format!(
                "partition record has {} values, cannot read position {index}",
                self.values.len()
            ))
        })?;
        let Some(literal) = value else {
            return Ok(None);
        };
        ty.as_primitive()
            .and_then(|primitive| literal.promote(primitive))
            .map(Some)
            .ok_or_else(|| {
                Error::invalid_literal(format!(
                    "partition value {literal} at position {index} is not of type {ty}"
                ))
            })
    }
}
