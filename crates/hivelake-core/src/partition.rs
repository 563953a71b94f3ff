//! Partition key specs and the partition codec.
//!
//! A table is partitioned by an ordered list of [`PartitionKeySpec`]s. Each
//! spec is either a direct reference to a schema column or one of a closed set
//! of derivations (year, month, day) from a `Date`/`Datetime` column. Specs
//! map every row to a [`PartitionPath`] (encoding) and every well-formed
//! partition directory back to typed key values (decoding).
//!
//! Encoding is total for valid rows: the only failure is a null (or missing)
//! source value, which is rejected rather than bucketed. Decoding is lenient:
//! directories that do not fit the current specs are reported as `None` so
//! callers can skip them.

pub mod path;
pub mod value;

use std::{collections::BTreeMap, collections::HashSet, path::Path};

use arrow::array::RecordBatch;
use chrono::{Datelike, Duration, NaiveDate};
use snafu::prelude::*;

use crate::schema::{ColumnType, TableSchema};

pub use path::{PartitionPath, PartitionSegment};
pub use value::PartitionValue;

/// Errors raised while resolving or evaluating partition keys.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PartitionKeyError {
    /// The spec references a column the schema does not define.
    #[snafu(display("Partition key {key} references unknown column {column}"))]
    UnknownColumn {
        /// Partition key name.
        key: String,
        /// The missing source column.
        column: String,
    },

    /// A derived key was declared on a column that is not `Date`/`Datetime`.
    #[snafu(display(
        "Partition key {key} derives from column {column} of type {column_type}; only Date and Datetime columns support derived keys"
    ))]
    NonTemporalSource {
        /// Partition key name.
        key: String,
        /// Source column.
        column: String,
        /// Actual type of the source column.
        column_type: ColumnType,
    },

    /// A derived key name equals a schema column name.
    #[snafu(display("Derived partition key {key} collides with a schema column of the same name"))]
    KeyCollision {
        /// The colliding key name.
        key: String,
    },

    /// The same key name appears twice in one table's specs.
    #[snafu(display("Duplicate partition key {key}"))]
    DuplicateKey {
        /// The repeated key name.
        key: String,
    },

    /// A persisted key name resolves to no column or derivation.
    #[snafu(display("Partition key {key} does not resolve against the table schema"))]
    UnresolvableKey {
        /// The persisted key name.
        key: String,
    },

    /// The rows do not carry the source column of a key.
    #[snafu(display("Rows are missing column {column} required by partition key {key}"))]
    MissingSourceColumn {
        /// Partition key name.
        key: String,
        /// The missing source column.
        column: String,
    },

    /// A source value is null; nulls are not bucketed.
    #[snafu(display("Partition key {key} has a null value in column {column} at row {row}"))]
    NullValue {
        /// Partition key name.
        key: String,
        /// Source column holding the null.
        column: String,
        /// Row index within the batch.
        row: usize,
    },

    /// A source value could not be read or derived.
    #[snafu(display("Cannot compute partition key {key} from column {column}: {reason}"))]
    InvalidValue {
        /// Partition key name.
        key: String,
        /// Source column.
        column: String,
        /// Why the value could not be computed.
        reason: String,
    },
}

/// How one level of partition directories is derived from a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionKeySpec {
    /// The value of a schema column, used as-is.
    Column(String),
    /// Calendar year of a `Date`/`Datetime` column; key name `<column>_year`.
    Year(String),
    /// Month (1-12) of a `Date`/`Datetime` column; key name `<column>_month`.
    Month(String),
    /// Day of month (1-31) of a `Date`/`Datetime` column; key name `<column>_day`.
    Day(String),
}

impl PartitionKeySpec {
    /// Partition on a column's value.
    pub fn column(name: impl Into<String>) -> Self {
        PartitionKeySpec::Column(name.into())
    }

    /// Partition on the year of a date column.
    pub fn year(source: impl Into<String>) -> Self {
        PartitionKeySpec::Year(source.into())
    }

    /// Partition on the month of a date column.
    pub fn month(source: impl Into<String>) -> Self {
        PartitionKeySpec::Month(source.into())
    }

    /// Partition on the day of a date column.
    pub fn day(source: impl Into<String>) -> Self {
        PartitionKeySpec::Day(source.into())
    }

    /// The schema column this key reads.
    pub fn source_column(&self) -> &str {
        match self {
            PartitionKeySpec::Column(c)
            | PartitionKeySpec::Year(c)
            | PartitionKeySpec::Month(c)
            | PartitionKeySpec::Day(c) => c,
        }
    }

    /// Directory key name, as persisted in the metadata document.
    pub fn key_name(&self) -> String {
        match self {
            PartitionKeySpec::Column(c) => c.clone(),
            PartitionKeySpec::Year(c) => format!("{c}_year"),
            PartitionKeySpec::Month(c) => format!("{c}_month"),
            PartitionKeySpec::Day(c) => format!("{c}_day"),
        }
    }

    /// True for year/month/day keys.
    pub fn is_derived(&self) -> bool {
        !matches!(self, PartitionKeySpec::Column(_))
    }

    /// Type of the values this key produces under `schema`.
    pub fn value_type(&self, schema: &TableSchema) -> Option<ColumnType> {
        match self {
            PartitionKeySpec::Column(c) => schema.column_type(c),
            _ => Some(ColumnType::Int32),
        }
    }

    /// Resolve a persisted key name against `schema`.
    ///
    /// A name equal to a schema column is a direct reference; otherwise a
    /// `_year`, `_month` or `_day` suffix on a temporal column names a derivation.
    pub fn resolve(key_name: &str, schema: &TableSchema) -> Result<Self, PartitionKeyError> {
        if schema.column_type(key_name).is_some() {
            return Ok(PartitionKeySpec::Column(key_name.to_string()));
        }

        let derived = [
            ("_year", PartitionKeySpec::Year as fn(String) -> PartitionKeySpec),
            ("_month", PartitionKeySpec::Month),
            ("_day", PartitionKeySpec::Day),
        ];
        for (suffix, make) in derived {
            if let Some(source) = key_name.strip_suffix(suffix)
                && schema.column_type(source).is_some_and(|t| t.is_temporal())
            {
                return Ok(make(source.to_string()));
            }
        }

        UnresolvableKeySnafu { key: key_name }.fail()
    }

    /// Compute this key's value for `row` of `batch`.
    pub fn evaluate(
        &self,
        schema: &TableSchema,
        batch: &RecordBatch,
        row: usize,
    ) -> Result<PartitionValue, PartitionKeyError> {
        let column = self.source_column();
        let key = self.key_name();

        let column_type = schema.column_type(column).context(UnknownColumnSnafu {
            key: key.clone(),
            column,
        })?;
        let array = batch
            .column_by_name(column)
            .context(MissingSourceColumnSnafu {
                key: key.clone(),
                column,
            })?;

        let value = PartitionValue::from_array(array, row, column_type)
            .map_err(|reason| PartitionKeyError::InvalidValue {
                key: key.clone(),
                column: column.to_string(),
                reason,
            })?
            .context(NullValueSnafu {
                key: key.clone(),
                column,
                row,
            })?;

        if !self.is_derived() {
            return Ok(value);
        }

        let date = match &value {
            PartitionValue::Date(d) => *d,
            PartitionValue::Datetime(ts) => ts.date(),
            other => {
                return NonTemporalSourceSnafu {
                    key,
                    column,
                    column_type: other.column_type(),
                }
                .fail();
            }
        };

        let part = match self {
            PartitionKeySpec::Year(_) => date.year(),
            PartitionKeySpec::Month(_) => date.month() as i32,
            PartitionKeySpec::Day(_) => date.day() as i32,
            PartitionKeySpec::Column(_) => return Ok(value),
        };
        Ok(PartitionValue::Int32(part))
    }
}

/// Check a full list of specs against `schema`.
///
/// Every source column must exist, derived keys need a temporal source and
/// must not shadow a schema column, and key names must be unique.
pub fn validate_specs(
    specs: &[PartitionKeySpec],
    schema: &TableSchema,
) -> Result<(), PartitionKeyError> {
    let mut seen = HashSet::with_capacity(specs.len());

    for spec in specs {
        let key = spec.key_name();
        let column = spec.source_column();

        let column_type = schema.column_type(column).context(UnknownColumnSnafu {
            key: key.clone(),
            column,
        })?;

        if spec.is_derived() {
            ensure!(
                column_type.is_temporal(),
                NonTemporalSourceSnafu {
                    key: key.clone(),
                    column,
                    column_type,
                }
            );
            ensure!(
                schema.column_type(&key).is_none(),
                KeyCollisionSnafu { key: key.clone() }
            );
        }

        ensure!(seen.insert(key.clone()), DuplicateKeySnafu { key });
    }

    Ok(())
}

/// Encode one row into its partition path.
pub fn encode_row(
    schema: &TableSchema,
    specs: &[PartitionKeySpec],
    batch: &RecordBatch,
    row: usize,
) -> Result<PartitionPath, PartitionKeyError> {
    let mut segments = Vec::with_capacity(specs.len());
    for spec in specs {
        let value = spec.evaluate(schema, batch, row)?;
        segments.push(PartitionSegment {
            key: spec.key_name(),
            value: value.to_string(),
        });
    }
    Ok(PartitionPath::new(segments))
}

/// Group the rows of `batch` by partition path.
///
/// Returns 64-bit row indices per path, ordered by path. Fails on the first row
/// whose partition key cannot be computed.
pub fn group_rows(
    schema: &TableSchema,
    specs: &[PartitionKeySpec],
    batch: &RecordBatch,
) -> Result<BTreeMap<PartitionPath, Vec<u64>>, PartitionKeyError> {
    let mut groups: BTreeMap<PartitionPath, Vec<u64>> = BTreeMap::new();
    if specs.is_empty() {
        if batch.num_rows() > 0 {
            groups.insert(PartitionPath::default(), (0..batch.num_rows() as u64).collect());
        }
        return Ok(groups);
    }

    for row in 0..batch.num_rows() {
        let path = encode_row(schema, specs, batch, row)?;
        groups.entry(path).or_default().push(row as u64);
    }
    Ok(groups)
}

/// A partition directory decoded against the current specs.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPartition {
    /// The partition path the directory represents.
    pub path: PartitionPath,
    /// One typed value per spec, in spec order.
    pub values: Vec<(PartitionKeySpec, PartitionValue)>,
}

impl DecodedPartition {
    /// Value of a direct partition key on `column`, if the table has one.
    pub fn column_value(&self, column: &str) -> Option<&PartitionValue> {
        self.values.iter().find_map(|(spec, v)| match spec {
            PartitionKeySpec::Column(c) if c == column => Some(v),
            _ => None,
        })
    }

    fn derived(&self, column: &str, pick: fn(&PartitionKeySpec) -> bool) -> Option<i32> {
        self.values.iter().find_map(|(spec, v)| match v {
            PartitionValue::Int32(n) if pick(spec) && spec.source_column() == column => Some(*n),
            _ => None,
        })
    }

    /// Inclusive range of `column` values this directory can hold, derived
    /// from year/month/day keys on that column.
    ///
    /// A year alone bounds a whole year, year and month a month, year, month
    /// and day a single day. Without a year key there is no range.
    pub fn source_range(
        &self,
        column: &str,
        column_type: ColumnType,
    ) -> Option<(PartitionValue, PartitionValue)> {
        if !column_type.is_temporal() {
            return None;
        }

        let year = self.derived(column, |s| matches!(s, PartitionKeySpec::Year(_)))?;
        let month = self.derived(column, |s| matches!(s, PartitionKeySpec::Month(_)));
        let day = self.derived(column, |s| matches!(s, PartitionKeySpec::Day(_)));

        let (first, last) = match (month, day) {
            (None, _) => (
                NaiveDate::from_ymd_opt(year, 1, 1)?,
                NaiveDate::from_ymd_opt(year, 12, 31)?,
            ),
            (Some(m), None) => {
                let m = u32::try_from(m).ok()?;
                let first = NaiveDate::from_ymd_opt(year, m, 1)?;
                let next = if m == 12 {
                    NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(year, m + 1, 1)?
                };
                (first, next.pred_opt()?)
            }
            (Some(m), Some(d)) => {
                let day = NaiveDate::from_ymd_opt(year, u32::try_from(m).ok()?, u32::try_from(d).ok()?)?;
                (day, day)
            }
        };

        match column_type {
            ColumnType::Date => Some((PartitionValue::Date(first), PartitionValue::Date(last))),
            _ => {
                let start = first.and_hms_opt(0, 0, 0)?;
                let end = last.and_hms_opt(0, 0, 0)?
                    .checked_add_signed(Duration::days(1))?
                    .checked_sub_signed(Duration::microseconds(1))?;
                Some((PartitionValue::Datetime(start), PartitionValue::Datetime(end)))
            }
        }
    }
}

/// Decode a directory path (relative to the table directory) against `specs`.
///
/// Returns `None` when the number of segments or their key names disagree
/// with `specs`, a segment is malformed, or a value does not parse as its
/// key's type.
pub fn decode(
    schema: &TableSchema,
    specs: &[PartitionKeySpec],
    rel_dir: &Path,
) -> Option<DecodedPartition> {
    let names: Vec<&str> = rel_dir
        .iter()
        .map(|c| c.to_str())
        .collect::<Option<Vec<_>>>()?;
    if names.len() != specs.len() {
        return None;
    }

    let mut segments = Vec::with_capacity(specs.len());
    let mut values = Vec::with_capacity(specs.len());
    for (name, spec) in names.into_iter().zip(specs) {
        let segment = PartitionSegment::parse_dir_name(name)?;
        if segment.key != spec.key_name() {
            return None;
        }
        let value = PartitionValue::parse(&segment.value, spec.value_type(schema)?)?;
        values.push((spec.clone(), value));
        segments.push(segment);
    }

    Some(DecodedPartition {
        path: PartitionPath::new(segments),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{date, prices_batch, prices_schema};
    use std::path::PathBuf;

    fn prices_specs() -> Vec<PartitionKeySpec> {
        vec![
            PartitionKeySpec::year("date"),
            PartitionKeySpec::column("ticker"),
        ]
    }

    #[test]
    fn key_names_follow_derivation_suffixes() {
        assert_eq!(PartitionKeySpec::column("ticker").key_name(), "ticker");
        assert_eq!(PartitionKeySpec::year("date").key_name(), "date_year");
        assert_eq!(PartitionKeySpec::month("date").key_name(), "date_month");
        assert_eq!(PartitionKeySpec::day("date").key_name(), "date_day");
    }

    #[test]
    fn resolve_inverts_key_name() {
        let schema = prices_schema();
        for spec in [
            PartitionKeySpec::column("ticker"),
            PartitionKeySpec::year("date"),
            PartitionKeySpec::month("date"),
            PartitionKeySpec::day("date"),
        ] {
            assert_eq!(PartitionKeySpec::resolve(&spec.key_name(), &schema).unwrap(), spec);
        }
        assert!(matches!(
            PartitionKeySpec::resolve("price_year", &schema),
            Err(PartitionKeyError::UnresolvableKey { .. })
        ));
        assert!(PartitionKeySpec::resolve("volume", &schema).is_err());
    }

    #[test]
    fn validate_specs_rejects_bad_keys() {
        let schema = prices_schema();
        validate_specs(&prices_specs(), &schema).unwrap();

        assert!(matches!(
            validate_specs(&[PartitionKeySpec::column("volume")], &schema),
            Err(PartitionKeyError::UnknownColumn { .. })
        ));
        assert!(matches!(
            validate_specs(&[PartitionKeySpec::year("ticker")], &schema),
            Err(PartitionKeyError::NonTemporalSource { .. })
        ));
        assert!(matches!(
            validate_specs(
                &[PartitionKeySpec::column("ticker"), PartitionKeySpec::column("ticker")],
                &schema
            ),
            Err(PartitionKeyError::DuplicateKey { .. })
        ));

        let shadowing = TableSchema::new([
            ("date", ColumnType::Date),
            ("date_year", ColumnType::Int32),
        ])
        .unwrap();
        assert!(matches!(
            validate_specs(&[PartitionKeySpec::year("date")], &shadowing),
            Err(PartitionKeyError::KeyCollision { .. })
        ));
    }

    #[test]
    fn encoding_is_deterministic_and_decodes_back() {
        let schema = prices_schema();
        let specs = prices_specs();
        let batch = prices_batch(&[(date(2024, 1, 1), "AAPL", 150.0)]);

        let a = encode_row(&schema, &specs, &batch, 0).unwrap();
        let b = encode_row(&schema, &specs, &batch, 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_rel_path(), PathBuf::from("date_year=2024/ticker=AAPL"));

        let decoded = decode(&schema, &specs, &a.to_rel_path()).unwrap();
        assert_eq!(decoded.path, a);
        assert_eq!(
            decoded.values,
            vec![
                (PartitionKeySpec::year("date"), PartitionValue::Int32(2024)),
                (
                    PartitionKeySpec::column("ticker"),
                    PartitionValue::String("AAPL".to_string())
                ),
            ]
        );
    }

    #[test]
    fn null_partition_values_are_rejected() {
        let schema = prices_schema();
        let batch = crate::test_util::prices_batch_nullable(&[(None, Some("AAPL"), Some(1.0))]);
        let err = encode_row(&schema, &prices_specs(), &batch, 0).unwrap_err();
        assert!(matches!(err, PartitionKeyError::NullValue { row: 0, .. }));
    }

    #[test]
    fn group_rows_splits_by_partition() {
        let schema = prices_schema();
        let batch = prices_batch(&[
            (date(2024, 1, 1), "AAPL", 150.0),
            (date(2023, 6, 1), "AAPL", 120.0),
            (date(2024, 1, 2), "MSFT", 300.0),
            (date(2024, 3, 2), "AAPL", 155.0),
        ]);

        let groups = group_rows(&schema, &prices_specs(), &batch).unwrap();
        let summary: Vec<(String, Vec<u64>)> = groups
            .into_iter()
            .map(|(p, rows)| (p.to_string(), rows))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("date_year=2023/ticker=AAPL".to_string(), vec![1]),
                ("date_year=2024/ticker=AAPL".to_string(), vec![0, 3]),
                ("date_year=2024/ticker=MSFT".to_string(), vec![2]),
            ]
        );
    }

    #[test]
    fn decode_skips_mismatched_directories() {
        let schema = prices_schema();
        let specs = prices_specs();
        for stray in [
            "date_year=2024",
            "ticker=AAPL/date_year=2024",
            "date_year=abc/ticker=AAPL",
            "date_year=2024/ticker=AAPL/extra=1",
            "date_year=2024/ticker%=AAPL",
        ] {
            assert!(decode(&schema, &specs, Path::new(stray)).is_none(), "{stray}");
        }
    }

    #[test]
    fn source_ranges_follow_derived_keys() {
        let schema = TableSchema::new([("ts", ColumnType::Datetime), ("d", ColumnType::Date)]).unwrap();
        let specs = vec![
            PartitionKeySpec::year("d"),
            PartitionKeySpec::month("d"),
            PartitionKeySpec::year("ts"),
        ];
        let decoded = decode(&schema, &specs, Path::new("d_year=2024/d_month=2/ts_year=2023")).unwrap();

        assert_eq!(
            decoded.source_range("d", ColumnType::Date),
            Some((
                PartitionValue::Date(date(2024, 2, 1)),
                PartitionValue::Date(date(2024, 2, 29))
            ))
        );

        let (lo, hi) = decoded.source_range("ts", ColumnType::Datetime).unwrap();
        assert_eq!(
            lo,
            PartitionValue::Datetime(date(2023, 1, 1).and_hms_opt(0, 0, 0).unwrap())
        );
        assert_eq!(
            hi,
            PartitionValue::Datetime(date(2023, 12, 31).and_hms_micro_opt(23, 59, 59, 999_999).unwrap())
        );

        let month_only = decode(
            &schema,
            &[PartitionKeySpec::month("d")],
            Path::new("d_month=2"),
        )
        .unwrap();
        assert_eq!(month_only.source_range("d", ColumnType::Date), None);
    }
}
