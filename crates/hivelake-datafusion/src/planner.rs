//! Resolve a [`TableQuery`] into rows.
//!
//! The base table's partitions are listed and pruned against the filters that
//! precede the first join, the survivors are read into an in-memory table, and
//! then every stage is applied in the order it was appended. Join right-hand
//! sides are resolved by the same routine, recursively.

use std::{collections::HashSet, sync::Arc};

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use datafusion::{
    common::{Column, JoinType},
    dataframe::DataFrame,
    catalog::memory::MemTable,
    execution::context::SessionContext,
    logical_expr::when,
    prelude::Expr,
};
use futures::future::{BoxFuture, FutureExt};
use hivelake_core::{
    MetadataStore, TableMetadata,
    scan::{list_partitions, read_partition},
};
use log::debug;
use snafu::prelude::*;

use crate::{
    error::{DatabaseResult, EngineSnafu, InvalidJoinSnafu, PredicateSnafu},
    pruning::prune_partitions,
    query::{JoinKeys, JoinKind, QueryStage, TableQuery},
    rowset::RowSet,
};

const LEFT_ALIAS: &str = "lhs";
const RIGHT_ALIAS: &str = "rhs";

/// Run `query` to completion and collect its rows.
pub(crate) async fn execute(store: &MetadataStore, query: &TableQuery) -> DatabaseResult<RowSet> {
    let ctx = SessionContext::new();
    let df = resolve(&ctx, store, query).await?;
    let schema = df.schema().inner().clone();
    let batches = df.collect().await.context(EngineSnafu)?;
    Ok(RowSet { schema, batches })
}

/// An in-memory table over `batches`, as a DataFrame.
pub(crate) fn mem_frame(
    ctx: &SessionContext,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
) -> DatabaseResult<DataFrame> {
    let table = MemTable::try_new(schema, vec![batches]).context(EngineSnafu)?;
    ctx.read_table(Arc::new(table)).context(EngineSnafu)
}

/// Read the partitions of a table that survive pruning against `filters`.
async fn scan_table(
    ctx: &SessionContext,
    store: &MetadataStore,
    meta: &TableMetadata,
    filters: &[&Expr],
) -> DatabaseResult<DataFrame> {
    let location = store.location();
    let dirs = list_partitions(location, meta).await?;

    let mut batches = Vec::new();
    for (dir, _) in prune_partitions(meta.schema(), dirs, filters) {
        batches.extend(read_partition(location, meta, &dir).await?);
    }
    debug!(
        "scanned {} batches from table {}",
        batches.len(),
        meta.table_name()
    );
    mem_frame(ctx, meta.schema().to_arrow_schema(), batches)
}

fn resolve<'a>(
    ctx: &'a SessionContext,
    store: &'a MetadataStore,
    query: &'a TableQuery,
) -> BoxFuture<'a, DatabaseResult<DataFrame>> {
    async move {
        let table = query.table.as_str();
        let meta = store.load(table).await?;
        let mut df = scan_table(ctx, store, &meta, &query.pre_join_filters()).await?;

        for stage in &query.stages {
            df = match stage {
                QueryStage::Select(columns) => {
                    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                    df.select_columns(&columns).context(EngineSnafu)?
                }
                QueryStage::Filter(predicate) => df
                    .filter(predicate.clone())
                    .context(PredicateSnafu { table })?,
                QueryStage::Join { other, keys, kind } => {
                    let right = resolve(ctx, store, other).await?;
                    join(table, df, right, keys, *kind)?
                }
                QueryStage::Sort(keys) => {
                    let sort = keys
                        .iter()
                        .map(|k| Expr::Column(Column::from_name(&k.column)).sort(!k.descending, false))
                        .collect();
                    df.sort(sort).context(EngineSnafu)?
                }
            };
        }
        Ok(df)
    }
    .boxed()
}

fn join_type(kind: JoinKind) -> JoinType {
    match kind {
        JoinKind::Inner => JoinType::Inner,
        JoinKind::Left => JoinType::Left,
        JoinKind::Right => JoinType::Right,
        JoinKind::Full => JoinType::Full,
        JoinKind::Semi => JoinType::LeftSemi,
        JoinKind::Anti => JoinType::LeftAnti,
    }
}

fn qualified(relation: &str, name: &str) -> Expr {
    Expr::Column(Column::new(Some(relation), name))
}

fn field_names(df: &DataFrame) -> Vec<String> {
    df.schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

fn join(
    table: &str,
    left: DataFrame,
    right: DataFrame,
    keys: &JoinKeys,
    kind: JoinKind,
) -> DatabaseResult<DataFrame> {
    ensure!(
        !keys.left.is_empty(),
        InvalidJoinSnafu {
            table,
            reason: "no join keys given",
        }
    );
    ensure!(
        keys.left.len() == keys.right.len(),
        InvalidJoinSnafu {
            table,
            reason: format!(
                "{} left keys but {} right keys",
                keys.left.len(),
                keys.right.len()
            ),
        }
    );

    let left_names = field_names(&left);
    let right_names = field_names(&right);
    for (side, key_names, names) in [
        ("left", &keys.left, &left_names),
        ("right", &keys.right, &right_names),
    ] {
        if let Some(missing) = key_names.iter().find(|k| !names.contains(*k)) {
            return InvalidJoinSnafu {
                table,
                reason: format!("{side} key column {missing:?} not found"),
            }
            .fail();
        }
    }

    let on: Vec<Expr> = keys
        .left
        .iter()
        .zip(&keys.right)
        .map(|(l, r)| qualified(LEFT_ALIAS, l).eq(qualified(RIGHT_ALIAS, r)))
        .collect();

    let joined = left
        .alias(LEFT_ALIAS)
        .context(EngineSnafu)?
        .join_on(right.alias(RIGHT_ALIAS).context(EngineSnafu)?, join_type(kind), on)
        .context(EngineSnafu)?;

    let projection = join_projection(table, &left_names, &right_names, keys, kind)?;
    joined.select(projection).context(EngineSnafu)
}

/// Output columns of a join: left columns first, then right columns.
///
/// Key pairs sharing a name come out once. Other right columns whose names
/// clash with a left column get a `_right` suffix; a suffixed name that is
/// itself taken is an invalid join. Semi and anti joins return left columns
/// only.
fn join_projection(
    table: &str,
    left_names: &[String],
    right_names: &[String],
    keys: &JoinKeys,
    kind: JoinKind,
) -> DatabaseResult<Vec<Expr>> {
    let shared_keys: HashSet<&str> = keys
        .left
        .iter()
        .zip(&keys.right)
        .filter(|(l, r)| l == r)
        .map(|(l, _)| l.as_str())
        .collect();

    let mut exprs = Vec::with_capacity(left_names.len() + right_names.len());
    for name in left_names {
        let lhs = qualified(LEFT_ALIAS, name);
        // Unmatched right rows carry a null left key.
        let expr = if matches!(kind, JoinKind::Right | JoinKind::Full)
            && shared_keys.contains(name.as_str())
        {
            when(lhs.clone().is_not_null(), lhs)
                .otherwise(qualified(RIGHT_ALIAS, name))
                .context(EngineSnafu)?
        } else {
            lhs
        };
        exprs.push(expr.alias(name));
    }

    if matches!(kind, JoinKind::Semi | JoinKind::Anti) {
        return Ok(exprs);
    }

    for name in right_names {
        if shared_keys.contains(name.as_str()) {
            continue;
        }
        let out = if left_names.contains(name) {
            let suffixed = format!("{name}_right");
            ensure!(
                !left_names.contains(&suffixed) && !right_names.contains(&suffixed),
                InvalidJoinSnafu {
                    table,
                    reason: format!("output column {suffixed:?} for right column {name:?} already exists"),
                }
            );
            suffixed
        } else {
            name.clone()
        };
        exprs.push(qualified(RIGHT_ALIAS, name).alias(out));
    }
    Ok(exprs)
}
