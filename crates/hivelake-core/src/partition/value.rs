//! Typed partition values and their canonical text form.

use std::fmt;

use arrow::{
    array::{Array, ArrayRef, AsArray},
    datatypes::{
        Date32Type, Float32Type, Float64Type, Int32Type, Int64Type, TimestampMicrosecondType,
    },
};
use chrono::{NaiveDate, NaiveDateTime};

use crate::schema::ColumnType;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single partition key value.
///
/// Derived keys (year, month, day) always produce `Int32`.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionValue {
    /// Boolean value.
    Boolean(bool),
    /// 32-bit integer value.
    Int32(i32),
    /// 64-bit integer value.
    Int64(i64),
    /// 32-bit float value.
    Float32(f32),
    /// 64-bit float value.
    Float64(f64),
    /// String value.
    String(String),
    /// Date value.
    Date(NaiveDate),
    /// Naive timestamp value.
    Datetime(NaiveDateTime),
}

impl PartitionValue {
    /// The column type this value belongs to.
    pub fn column_type(&self) -> ColumnType {
        match self {
            PartitionValue::Boolean(_) => ColumnType::Boolean,
            PartitionValue::Int32(_) => ColumnType::Int32,
            PartitionValue::Int64(_) => ColumnType::Int64,
            PartitionValue::Float32(_) => ColumnType::Float32,
            PartitionValue::Float64(_) => ColumnType::Float64,
            PartitionValue::String(_) => ColumnType::String,
            PartitionValue::Date(_) => ColumnType::Date,
            PartitionValue::Datetime(_) => ColumnType::Datetime,
        }
    }

    /// Parse the canonical text form of a value of type `column_type`.
    ///
    /// Returns `None` if `s` is not a valid rendering.
    pub fn parse(s: &str, column_type: ColumnType) -> Option<Self> {
        let v = match column_type {
            ColumnType::Boolean => match s {
                "true" => PartitionValue::Boolean(true),
                "false" => PartitionValue::Boolean(false),
                _ => return None,
            },
            ColumnType::Int32 => PartitionValue::Int32(s.parse().ok()?),
            ColumnType::Int64 => PartitionValue::Int64(s.parse().ok()?),
            ColumnType::Float32 => PartitionValue::Float32(s.parse().ok()?),
            ColumnType::Float64 => PartitionValue::Float64(s.parse().ok()?),
            ColumnType::String => PartitionValue::String(s.to_string()),
            ColumnType::Date => {
                PartitionValue::Date(NaiveDate::parse_from_str(s, DATE_FORMAT).ok()?)
            }
            ColumnType::Datetime => {
                PartitionValue::Datetime(NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok()?)
            }
        };
        Some(v)
    }

    /// Read row `row` of `array`, which must store `column_type`.
    ///
    /// Returns `Ok(None)` for a null slot. `Err` carries a short reason when
    /// the array type does not match or the value is out of range.
    pub(crate) fn from_array(
        array: &ArrayRef,
        row: usize,
        column_type: ColumnType,
    ) -> Result<Option<Self>, String> {
        if array.is_null(row) {
            return Ok(None);
        }

        let mismatch = || format!("array of type {} does not hold {column_type}", array.data_type());

        let v = match column_type {
            ColumnType::Boolean => {
                PartitionValue::Boolean(array.as_boolean_opt().ok_or_else(mismatch)?.value(row))
            }
            ColumnType::Int32 => PartitionValue::Int32(
                array
                    .as_primitive_opt::<Int32Type>()
                    .ok_or_else(mismatch)?
                    .value(row),
            ),
            ColumnType::Int64 => PartitionValue::Int64(
                array
                    .as_primitive_opt::<Int64Type>()
                    .ok_or_else(mismatch)?
                    .value(row),
            ),
            ColumnType::Float32 => PartitionValue::Float32(
                array
                    .as_primitive_opt::<Float32Type>()
                    .ok_or_else(mismatch)?
                    .value(row),
            ),
            ColumnType::Float64 => PartitionValue::Float64(
                array
                    .as_primitive_opt::<Float64Type>()
                    .ok_or_else(mismatch)?
                    .value(row),
            ),
            ColumnType::String => PartitionValue::String(
                array
                    .as_string_opt::<i32>()
                    .ok_or_else(mismatch)?
                    .value(row)
                    .to_string(),
            ),
            ColumnType::Date => {
                let days = array
                    .as_primitive_opt::<Date32Type>()
                    .ok_or_else(mismatch)?;
                PartitionValue::Date(
                    days.value_as_date(row)
                        .ok_or_else(|| format!("date {} out of range", days.value(row)))?,
                )
            }
            ColumnType::Datetime => {
                let micros = array
                    .as_primitive_opt::<TimestampMicrosecondType>()
                    .ok_or_else(mismatch)?;
                PartitionValue::Datetime(
                    micros
                        .value_as_datetime(row)
                        .ok_or_else(|| format!("timestamp {} out of range", micros.value(row)))?,
                )
            }
        };
        Ok(Some(v))
    }
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionValue::Boolean(v) => write!(f, "{v}"),
            PartitionValue::Int32(v) => write!(f, "{v}"),
            PartitionValue::Int64(v) => write!(f, "{v}"),
            PartitionValue::Float32(v) => write!(f, "{v}"),
            PartitionValue::Float64(v) => write!(f, "{v}"),
            PartitionValue::String(v) => f.write_str(v),
            PartitionValue::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            PartitionValue::Datetime(v) => write!(f, "{}", v.format(DATETIME_FORMAT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Date32Array, StringArray, TimestampMicrosecondArray};
    use std::sync::Arc;

    #[test]
    fn text_form_round_trips() {
        let values = [
            PartitionValue::Boolean(true),
            PartitionValue::Int32(-7),
            PartitionValue::Int64(1 << 40),
            PartitionValue::Float32(0.1),
            PartitionValue::Float64(150.0),
            PartitionValue::String("AAPL".to_string()),
            PartitionValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            PartitionValue::Datetime(
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_micro_opt(3, 4, 5, 120)
                    .unwrap(),
            ),
        ];
        for v in values {
            let text = v.to_string();
            assert_eq!(PartitionValue::parse(&text, v.column_type()), Some(v));
        }
    }

    #[test]
    fn canonical_renderings() {
        assert_eq!(PartitionValue::Float64(150.0).to_string(), "150");
        assert_eq!(
            PartitionValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).to_string(),
            "2024-01-01"
        );
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(PartitionValue::Datetime(ts).to_string(), "2024-01-01 09:30:00");
    }

    #[test]
    fn parse_rejects_malformed_text() {
        assert_eq!(PartitionValue::parse("yes", ColumnType::Boolean), None);
        assert_eq!(PartitionValue::parse("1.5", ColumnType::Int64), None);
        assert_eq!(PartitionValue::parse("2024-13-01", ColumnType::Date), None);
    }

    #[test]
    fn reads_values_and_nulls_from_arrays() {
        let dates: ArrayRef = Arc::new(Date32Array::from(vec![Some(19723), None]));
        assert_eq!(
            PartitionValue::from_array(&dates, 0, ColumnType::Date).unwrap(),
            Some(PartitionValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()))
        );
        assert_eq!(
            PartitionValue::from_array(&dates, 1, ColumnType::Date).unwrap(),
            None
        );

        let ts: ArrayRef = Arc::new(TimestampMicrosecondArray::from(vec![1_000_000]));
        assert!(matches!(
            PartitionValue::from_array(&ts, 0, ColumnType::Datetime).unwrap(),
            Some(PartitionValue::Datetime(_))
        ));

        let strings: ArrayRef = Arc::new(StringArray::from(vec!["x"]));
        assert!(PartitionValue::from_array(&strings, 0, ColumnType::Int64).is_err());
    }
}
