//! Parquet encoding and decoding of table row batches.

use std::path::Path;

use arrow::array::RecordBatch;
use bytes::Bytes;
use parquet::arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder};
use snafu::prelude::*;

use crate::{
    error::{ArrowSnafu, ParquetSnafu, SchemaValidationSnafu, TableResult},
    options::WriteOptions,
    schema::TableSchema,
};

/// Encode `batches` as one Parquet file under the table's canonical schema.
///
/// Every batch must already be conformed to `schema`
/// (see [`TableSchema::conform_batch`]).
pub fn encode_batches(
    schema: &TableSchema,
    batches: &[RecordBatch],
    options: &WriteOptions,
    rel_path: &Path,
) -> TableResult<Vec<u8>> {
    let path = rel_path.display().to_string();
    let props = options.writer_properties();

    let mut writer = ArrowWriter::try_new(Vec::new(), schema.to_arrow_schema(), Some(props))
        .context(ParquetSnafu { path: path.clone() })?;
    for batch in batches {
        writer
            .write(batch)
            .context(ParquetSnafu { path: path.clone() })?;
    }
    writer.into_inner().context(ParquetSnafu { path })
}

/// Decode a Parquet file into batches conformed to `schema`.
///
/// A file whose columns or types disagree with the table schema is reported
/// as a schema validation failure for `table_name`.
pub fn decode_batches(
    table_name: &str,
    schema: &TableSchema,
    data: Vec<u8>,
    rel_path: &Path,
) -> TableResult<Vec<RecordBatch>> {
    let path = rel_path.display().to_string();

    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))
        .context(ParquetSnafu { path: path.clone() })?;
    schema
        .validate_arrow_schema(builder.schema())
        .context(SchemaValidationSnafu { table_name })?;

    let reader = builder.build().context(ParquetSnafu { path })?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.context(ArrowSnafu)?;
        if batch.num_rows() == 0 {
            continue;
        }
        out.push(schema.conform_batch(&batch).context(ArrowSnafu)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableError;
    use crate::schema::ColumnType;
    use crate::test_util::{date, prices_batch, prices_schema};
    use arrow::array::{Int64Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::basic::Compression;
    use std::sync::Arc;

    #[test]
    fn encoded_file_decodes_to_same_rows() {
        let schema = prices_schema();
        let batch = prices_batch(&[
            (date(2024, 1, 1), "AAPL", 150.0),
            (date(2024, 1, 2), "AAPL", 151.0),
        ]);
        let opts = WriteOptions::default().with_compression(Compression::UNCOMPRESSED);

        let bytes = encode_batches(&schema, &[batch.clone()], &opts, Path::new("f.parquet")).unwrap();
        let back = decode_batches("prices", &schema, bytes, Path::new("f.parquet")).unwrap();

        assert_eq!(back.len(), 1);
        assert_eq!(back[0], batch);
    }

    #[test]
    fn foreign_file_schema_is_rejected() {
        let schema = prices_schema();
        let other = TableSchema::new([("n", ColumnType::Int64)]).unwrap();
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)])),
            vec![Arc::new(Int64Array::from(vec![1, 2]))],
        )
        .unwrap();

        let bytes =
            encode_batches(&other, &[batch], &WriteOptions::default(), Path::new("x.parquet"))
                .unwrap();
        let err = decode_batches("prices", &schema, bytes, Path::new("x.parquet")).unwrap_err();
        assert!(matches!(err, TableError::SchemaValidation { .. }));
    }

    #[test]
    fn garbage_bytes_are_a_parquet_error() {
        let err = decode_batches(
            "prices",
            &prices_schema(),
            b"not parquet".to_vec(),
            Path::new("bad.parquet"),
        )
        .unwrap_err();
        assert!(matches!(err, TableError::Parquet { .. }));
    }
}
