//! Column types and ordered table schemas.
//!
//! Column types are a closed set with a fixed persisted name per variant, so
//! a metadata document can never smuggle in a type the engine does not know
//! how to store. A [`TableSchema`] keeps column order: order is irrelevant
//! for compatibility, but it is the order of stored and returned columns.

use std::{collections::HashSet, fmt, str::FromStr, sync::Arc};

use arrow::{
    array::RecordBatch,
    datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit},
    error::ArrowError,
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
};
use snafu::prelude::*;

/// Errors raised while defining a schema.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaDefinitionError {
    /// A schema must declare at least one column.
    #[snafu(display("Schema must contain at least one column"))]
    EmptySchema,

    /// The same column name was declared twice.
    #[snafu(display("Duplicate column {column}"))]
    DuplicateColumn {
        /// The repeated column name.
        column: String,
    },

    /// A persisted type name is not one of the supported types.
    #[snafu(display(
        "Unknown column type {type_name:?} (expected one of Boolean, Int32, Int64, Float32, Float64, String, Date, Datetime)"
    ))]
    UnknownType {
        /// The unrecognized type name.
        type_name: String,
    },

    /// An Arrow type has no corresponding column type.
    #[snafu(display("Column {column} has unsupported Arrow type {data_type}"))]
    UnsupportedArrowType {
        /// Column carrying the unsupported type.
        column: String,
        /// The Arrow type that was found.
        data_type: DataType,
    },
}

/// Errors raised when a row batch does not match a table schema.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaValidationError {
    /// The rows are missing a column the schema requires.
    #[snafu(display("Missing column {column}"))]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// The rows carry a column the schema does not define.
    #[snafu(display("Extra column {column} not present in table schema"))]
    ExtraColumn {
        /// Name of the extra column.
        column: String,
    },

    /// The column exists but with a different type.
    #[snafu(display("Type mismatch for column {column}: expected {expected}, got {actual}"))]
    TypeMismatch {
        /// Name of the mistyped column.
        column: String,
        /// Type declared in the table schema.
        expected: ColumnType,
        /// Arrow type found in the rows.
        actual: DataType,
    },
}

/// A column type supported by hivelake tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Boolean values.
    Boolean,
    /// 32-bit signed integers.
    Int32,
    /// 64-bit signed integers.
    Int64,
    /// 32-bit floats.
    Float32,
    /// 64-bit floats.
    Float64,
    /// UTF-8 strings.
    String,
    /// Calendar dates (days since epoch).
    Date,
    /// Naive timestamps with microsecond precision.
    Datetime,
}

impl ColumnType {
    /// Every column type, in declaration order.
    pub const ALL: [ColumnType; 8] = [
        ColumnType::Boolean,
        ColumnType::Int32,
        ColumnType::Int64,
        ColumnType::Float32,
        ColumnType::Float64,
        ColumnType::String,
        ColumnType::Date,
        ColumnType::Datetime,
    ];

    /// The persisted name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "Boolean",
            ColumnType::Int32 => "Int32",
            ColumnType::Int64 => "Int64",
            ColumnType::Float32 => "Float32",
            ColumnType::Float64 => "Float64",
            ColumnType::String => "String",
            ColumnType::Date => "Date",
            ColumnType::Datetime => "Datetime",
        }
    }

    /// The Arrow type used to store this column.
    pub fn to_arrow(&self) -> DataType {
        match self {
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Int32 => DataType::Int32,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float32 => DataType::Float32,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::String => DataType::Utf8,
            ColumnType::Date => DataType::Date32,
            ColumnType::Datetime => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }

    /// The column type stored as `data_type`, if any.
    pub fn from_arrow(data_type: &DataType) -> Option<Self> {
        ColumnType::ALL
            .into_iter()
            .find(|t| &t.to_arrow() == data_type)
    }

    /// True for `Date` and `Datetime`, the types derived partition keys accept.
    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::Datetime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = SchemaDefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColumnType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .context(UnknownTypeSnafu { type_name: s })
    }
}

impl Serialize for ColumnType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// One named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
}

/// Ordered, duplicate-free, non-empty list of columns.
///
/// Serialized as a JSON object whose key order is the column order:
/// `{"date": "Date", "ticker": "String", "price": "Float64"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<Column>,
}

impl TableSchema {
    /// Build a schema from `(name, type)` pairs in column order.
    pub fn new<I, S>(columns: I) -> Result<Self, SchemaDefinitionError>
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        let columns: Vec<Column> = columns
            .into_iter()
            .map(|(name, column_type)| Column {
                name: name.into(),
                column_type,
            })
            .collect();

        ensure!(!columns.is_empty(), EmptySchemaSnafu);

        let mut seen = HashSet::with_capacity(columns.len());
        for c in &columns {
            ensure!(
                seen.insert(c.name.as_str()),
                DuplicateColumnSnafu {
                    column: c.name.clone()
                }
            );
        }

        Ok(Self { columns })
    }

    /// Derive a schema from an Arrow schema.
    pub fn from_arrow_schema(schema: &Schema) -> Result<Self, SchemaDefinitionError> {
        let mut columns = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let column_type =
                ColumnType::from_arrow(field.data_type()).context(UnsupportedArrowTypeSnafu {
                    column: field.name().clone(),
                    data_type: field.data_type().clone(),
                })?;
            columns.push((field.name().clone(), column_type));
        }
        Self::new(columns)
    }

    /// Columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false; schemas are never empty.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Type of `name`, if the column exists.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type)
    }

    /// Same column names with the same type per name; order is ignored.
    pub fn is_compatible_with(&self, other: &TableSchema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .all(|c| other.column_type(&c.name) == Some(c.column_type))
    }

    /// Canonical Arrow schema: columns in order, every field nullable.
    pub fn to_arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(&c.name, c.column_type.to_arrow(), true))
            .collect();
        Arc::new(Schema::new(fields))
    }

    /// Check that `schema` has exactly this schema's columns and types.
    ///
    /// Column order is not checked. Missing columns are reported first (in
    /// schema order), then type mismatches, then extra columns.
    pub fn validate_arrow_schema(&self, schema: &Schema) -> Result<(), SchemaValidationError> {
        for c in &self.columns {
            let field = schema
                .field_with_name(&c.name)
                .ok()
                .context(MissingColumnSnafu {
                    column: c.name.clone(),
                })?;

            let expected = c.column_type.to_arrow();
            ensure!(
                field.data_type() == &expected,
                TypeMismatchSnafu {
                    column: c.name.clone(),
                    expected: c.column_type,
                    actual: field.data_type().clone(),
                }
            );
        }

        for field in schema.fields() {
            ensure!(
                self.column_type(field.name()).is_some(),
                ExtraColumnSnafu {
                    column: field.name().clone(),
                }
            );
        }

        Ok(())
    }

    /// Rebuild `batch` with columns in schema order under the canonical
    /// Arrow schema.
    ///
    /// The batch must already satisfy [`validate_arrow_schema`](Self::validate_arrow_schema).
    pub fn conform_batch(&self, batch: &RecordBatch) -> Result<RecordBatch, ArrowError> {
        let mut arrays = Vec::with_capacity(self.columns.len());
        for c in &self.columns {
            let array = batch.column_by_name(&c.name).ok_or_else(|| {
                ArrowError::SchemaError(format!("batch is missing column {}", c.name))
            })?;
            arrays.push(Arc::clone(array));
        }
        RecordBatch::try_new(self.to_arrow_schema(), arrays)
    }
}

impl Serialize for TableSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for c in &self.columns {
            map.serialize_entry(&c.name, &c.column_type)?;
        }
        map.end()
    }
}

struct TableSchemaVisitor;

impl<'de> Visitor<'de> for TableSchemaVisitor {
    type Value = TableSchema;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of column name to column type")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut columns = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, column_type)) = access.next_entry::<String, ColumnType>()? {
            columns.push((name, column_type));
        }
        TableSchema::new(columns).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for TableSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TableSchemaVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray};

    fn prices_schema() -> TableSchema {
        TableSchema::new([
            ("date", ColumnType::Date),
            ("ticker", ColumnType::String),
            ("price", ColumnType::Float64),
        ])
        .unwrap()
    }

    #[test]
    fn type_names_round_trip_through_from_str() {
        for t in ColumnType::ALL {
            assert_eq!(t.as_str().parse::<ColumnType>().unwrap(), t);
        }
        assert!(matches!(
            "Decimal".parse::<ColumnType>(),
            Err(SchemaDefinitionError::UnknownType { .. })
        ));
    }

    #[test]
    fn rejects_empty_and_duplicate_schemas() {
        let empty: Vec<(String, ColumnType)> = Vec::new();
        assert!(matches!(
            TableSchema::new(empty),
            Err(SchemaDefinitionError::EmptySchema)
        ));

        let err = TableSchema::new([("a", ColumnType::Int64), ("a", ColumnType::String)])
            .expect_err("duplicate column should fail");
        assert!(matches!(err, SchemaDefinitionError::DuplicateColumn { column } if column == "a"));
    }

    #[test]
    fn json_preserves_column_order() {
        let schema = TableSchema::new([
            ("zeta", ColumnType::Int32),
            ("alpha", ColumnType::Datetime),
            ("mid", ColumnType::Boolean),
        ])
        .unwrap();

        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(json, r#"{"zeta":"Int32","alpha":"Datetime","mid":"Boolean"}"#);

        let back: TableSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn json_with_unknown_type_is_rejected() {
        let err = serde_json::from_str::<TableSchema>(r#"{"a":"Decimal"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn compatibility_ignores_order() {
        let a = prices_schema();
        let b = TableSchema::new([
            ("price", ColumnType::Float64),
            ("date", ColumnType::Date),
            ("ticker", ColumnType::String),
        ])
        .unwrap();
        assert!(a.is_compatible_with(&b));

        let c = TableSchema::new([
            ("price", ColumnType::Float32),
            ("date", ColumnType::Date),
            ("ticker", ColumnType::String),
        ])
        .unwrap();
        assert!(!a.is_compatible_with(&c));
    }

    #[test]
    fn validate_reports_missing_mismatch_and_extra() {
        let schema = prices_schema();

        let missing = Schema::new(vec![
            Field::new("date", DataType::Date32, true),
            Field::new("price", DataType::Float64, true),
        ]);
        let err = schema.validate_arrow_schema(&missing).unwrap_err();
        assert!(matches!(err, SchemaValidationError::MissingColumn { ref column } if column == "ticker"));
        assert!(err.to_string().contains("Missing column"));

        let mismatch = Schema::new(vec![
            Field::new("date", DataType::Date32, true),
            Field::new("ticker", DataType::Utf8, true),
            Field::new("price", DataType::Utf8, true),
        ]);
        let err = schema.validate_arrow_schema(&mismatch).unwrap_err();
        match err {
            SchemaValidationError::TypeMismatch {
                column,
                expected,
                actual,
            } => {
                assert_eq!(column, "price");
                assert_eq!(expected, ColumnType::Float64);
                assert_eq!(actual, DataType::Utf8);
            }
            other => panic!("unexpected error: {other}"),
        }

        let extra = Schema::new(vec![
            Field::new("date", DataType::Date32, true),
            Field::new("ticker", DataType::Utf8, true),
            Field::new("price", DataType::Float64, true),
            Field::new("volume", DataType::Int64, true),
        ]);
        let err = schema.validate_arrow_schema(&extra).unwrap_err();
        assert!(matches!(err, SchemaValidationError::ExtraColumn { column } if column == "volume"));
    }

    #[test]
    fn conform_batch_reorders_columns() {
        let schema = TableSchema::new([("ticker", ColumnType::String), ("price", ColumnType::Float64)])
            .unwrap();
        let input_schema = Arc::new(Schema::new(vec![
            Field::new("price", DataType::Float64, false),
            Field::new("ticker", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            input_schema,
            vec![
                Arc::new(Float64Array::from(vec![1.5])),
                Arc::new(StringArray::from(vec!["AAPL"])),
            ],
        )
        .unwrap();

        schema.validate_arrow_schema(&batch.schema()).unwrap();
        let out = schema.conform_batch(&batch).unwrap();
        assert_eq!(out.schema(), schema.to_arrow_schema());
        assert_eq!(out.schema().field(0).name(), "ticker");
        assert!(out.schema().field(0).is_nullable());
    }
}
