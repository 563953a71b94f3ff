use std::sync::Arc;

use arrow::array::{Date32Array, Float64Array, RecordBatch, StringArray};
use chrono::NaiveDate;

use crate::{
    partition::PartitionKeySpec,
    schema::{ColumnType, TableSchema},
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn days_since_epoch(d: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
    (d - epoch).num_days() as i32
}

/// `date: Date, ticker: String, price: Float64`
pub fn prices_schema() -> TableSchema {
    TableSchema::new([
        ("date", ColumnType::Date),
        ("ticker", ColumnType::String),
        ("price", ColumnType::Float64),
    ])
    .expect("valid schema")
}

/// `[year(date), ticker]`
pub fn prices_specs() -> Vec<PartitionKeySpec> {
    vec![
        PartitionKeySpec::year("date"),
        PartitionKeySpec::column("ticker"),
    ]
}

pub fn prices_batch(rows: &[(NaiveDate, &str, f64)]) -> RecordBatch {
    let nullable: Vec<_> = rows
        .iter()
        .map(|(d, t, p)| (Some(*d), Some(*t), Some(*p)))
        .collect();
    prices_batch_nullable(&nullable)
}

pub fn prices_batch_nullable(rows: &[(Option<NaiveDate>, Option<&str>, Option<f64>)]) -> RecordBatch {
    let dates = Date32Array::from(
        rows.iter()
            .map(|(d, _, _)| d.map(days_since_epoch))
            .collect::<Vec<_>>(),
    );
    let tickers = StringArray::from(rows.iter().map(|(_, t, _)| *t).collect::<Vec<_>>());
    let prices = Float64Array::from(rows.iter().map(|(_, _, p)| *p).collect::<Vec<_>>());

    RecordBatch::try_new(
        prices_schema().to_arrow_schema(),
        vec![Arc::new(dates), Arc::new(tickers), Arc::new(prices)],
    )
    .expect("valid batch")
}

/// Collect `(date, ticker, price)` rows from batches, sorted.
pub fn price_rows(batches: &[RecordBatch]) -> Vec<(NaiveDate, String, f64)> {
    use arrow::array::AsArray;
    use arrow::datatypes::{Date32Type, Float64Type};

    let mut out = Vec::new();
    for b in batches {
        let dates = b.column(0).as_primitive::<Date32Type>();
        let tickers = b.column(1).as_string::<i32>();
        let prices = b.column(2).as_primitive::<Float64Type>();
        for i in 0..b.num_rows() {
            out.push((
                dates.value_as_date(i).expect("date"),
                tickers.value(i).to_string(),
                prices.value(i),
            ));
        }
    }
    out.sort_by(|a, b| a.partial_cmp(b).expect("comparable rows"));
    out
}
