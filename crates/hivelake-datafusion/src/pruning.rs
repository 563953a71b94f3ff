//! Partition pruning over filter predicates.
//!
//! Each partition directory bounds the values some columns can take: a direct
//! key pins its column to a single value, and year/month/day keys pin their
//! source column to a closed date range. A predicate is evaluated against
//! those bounds with three-valued logic:
//!
//! - `AlwaysFalse`: no row in the partition can satisfy it; the partition is
//!   skipped.
//! - `MaybeTrue`: some rows might; the partition is read.
//! - `AlwaysTrue`: every row does; the partition is read (delete can drop it
//!   wholesale).
//!
//! Anything the analyser does not understand is `MaybeTrue`, so pruning never
//! excludes a partition that could hold matching rows.

use std::{cmp::Ordering, collections::HashMap};

use datafusion::{
    logical_expr::{
        Between, BinaryExpr, Operator, expr::InList,
        type_coercion::binary::comparison_coercion,
    },
    prelude::Expr,
    scalar::ScalarValue,
};
use hivelake_core::{DecodedPartition, PartitionDir, PartitionValue, TableSchema};
use log::debug;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum IntervalTruth {
    AlwaysTrue,
    AlwaysFalse,
    MaybeTrue,
}

impl IntervalTruth {
    pub(crate) fn and(self, rhs: IntervalTruth) -> IntervalTruth {
        use IntervalTruth::*;
        match (self, rhs) {
            (AlwaysFalse, _) | (_, AlwaysFalse) => AlwaysFalse,
            (AlwaysTrue, x) | (x, AlwaysTrue) => x,
            _ => MaybeTrue,
        }
    }

    pub(crate) fn or(self, rhs: IntervalTruth) -> IntervalTruth {
        use IntervalTruth::*;
        match (self, rhs) {
            (AlwaysTrue, _) | (_, AlwaysTrue) => AlwaysTrue,
            (AlwaysFalse, x) | (x, AlwaysFalse) => x,
            _ => MaybeTrue,
        }
    }

    pub(crate) fn not(self) -> IntervalTruth {
        use IntervalTruth::*;
        match self {
            AlwaysTrue => AlwaysFalse,
            AlwaysFalse => AlwaysTrue,
            MaybeTrue => MaybeTrue,
        }
    }
}

pub(crate) fn partition_value_to_scalar(v: &PartitionValue) -> ScalarValue {
    match v {
        PartitionValue::Boolean(b) => ScalarValue::Boolean(Some(*b)),
        PartitionValue::Int32(n) => ScalarValue::Int32(Some(*n)),
        PartitionValue::Int64(n) => ScalarValue::Int64(Some(*n)),
        PartitionValue::Float32(x) => ScalarValue::Float32(Some(*x)),
        PartitionValue::Float64(x) => ScalarValue::Float64(Some(*x)),
        PartitionValue::String(s) => ScalarValue::Utf8(Some(s.clone())),
        PartitionValue::Date(d) => {
            let days = d.signed_duration_since(chrono::NaiveDate::default()).num_days();
            ScalarValue::Date32(Some(days as i32))
        }
        PartitionValue::Datetime(ts) => {
            ScalarValue::TimestampMicrosecond(Some(ts.and_utc().timestamp_micros()), None)
        }
    }
}

/// Inclusive per-column value bounds implied by one partition directory.
#[derive(Debug, Default)]
pub(crate) struct PartitionBounds {
    columns: HashMap<String, (ScalarValue, ScalarValue)>,
}

impl PartitionBounds {
    pub(crate) fn new(schema: &TableSchema, partition: &DecodedPartition) -> Self {
        let mut columns = HashMap::new();
        for c in schema.columns() {
            if let Some(v) = partition.column_value(&c.name) {
                let s = partition_value_to_scalar(v);
                columns.insert(c.name.clone(), (s.clone(), s));
            } else if let Some((lo, hi)) = partition.source_range(&c.name, c.column_type) {
                columns.insert(
                    c.name.clone(),
                    (partition_value_to_scalar(&lo), partition_value_to_scalar(&hi)),
                );
            }
        }
        Self { columns }
    }

    fn get(&self, expr: &Expr) -> Option<&(ScalarValue, ScalarValue)> {
        match unwrap_expr(expr) {
            Expr::Column(c) => self.columns.get(&c.name),
            _ => None,
        }
    }
}

fn unwrap_expr(expr: &Expr) -> &Expr {
    match expr {
        Expr::Alias(a) => unwrap_expr(&a.expr),
        other => other,
    }
}

fn literal(expr: &Expr) -> Option<&ScalarValue> {
    match unwrap_expr(expr) {
        Expr::Literal(v, _) if !v.is_null() => Some(v),
        _ => None,
    }
}

/// Cast `lit` to the type of `like`, only if the cast loses nothing.
///
/// The engine compares mixed operands in their coerced common type (an
/// integer against a string compares as text). Bounds are only usable when
/// that common type is the column's own.
fn coerce_literal(lit: &ScalarValue, like: &ScalarValue) -> Option<ScalarValue> {
    let target = like.data_type();
    let lit_type = lit.data_type();
    if lit_type == target {
        return Some(lit.clone());
    }
    if comparison_coercion(&lit_type, &target).as_ref() != Some(&target) {
        return None;
    }
    let cast = lit.cast_to(&target).ok()?;
    if cast.is_null() {
        return None;
    }
    let back = cast.cast_to(&lit.data_type()).ok()?;
    (back == *lit).then_some(cast)
}

/// Flip comparison direction when operands are swapped.
fn flip_op(op: Operator) -> Option<Operator> {
    match op {
        Operator::Gt => Some(Operator::Lt),
        Operator::GtEq => Some(Operator::LtEq),
        Operator::Lt => Some(Operator::Gt),
        Operator::LtEq => Some(Operator::GtEq),
        Operator::Eq => Some(Operator::Eq),
        Operator::NotEq => Some(Operator::NotEq),
        _ => None,
    }
}

/// Evaluate `column OP v` for every column value in `[lo, hi]`.
pub(crate) fn eval_cmp_on_interval(
    op: Operator,
    v: &ScalarValue,
    lo: &ScalarValue,
    hi: &ScalarValue,
) -> IntervalTruth {
    use IntervalTruth::*;
    let (Some(lo_cmp), Some(hi_cmp)) = (lo.partial_cmp(v), hi.partial_cmp(v)) else {
        return MaybeTrue;
    };

    match op {
        Operator::Lt => {
            if hi_cmp == Ordering::Less {
                AlwaysTrue
            } else if lo_cmp != Ordering::Less {
                AlwaysFalse
            } else {
                MaybeTrue
            }
        }
        Operator::LtEq => {
            if hi_cmp != Ordering::Greater {
                AlwaysTrue
            } else if lo_cmp == Ordering::Greater {
                AlwaysFalse
            } else {
                MaybeTrue
            }
        }
        Operator::Gt => {
            if lo_cmp == Ordering::Greater {
                AlwaysTrue
            } else if hi_cmp != Ordering::Greater {
                AlwaysFalse
            } else {
                MaybeTrue
            }
        }
        Operator::GtEq => {
            if lo_cmp != Ordering::Less {
                AlwaysTrue
            } else if hi_cmp == Ordering::Less {
                AlwaysFalse
            } else {
                MaybeTrue
            }
        }
        Operator::Eq => {
            if lo_cmp == Ordering::Greater || hi_cmp == Ordering::Less {
                AlwaysFalse
            } else if lo_cmp == Ordering::Equal && hi_cmp == Ordering::Equal {
                AlwaysTrue
            } else {
                MaybeTrue
            }
        }
        Operator::NotEq => {
            if lo_cmp == Ordering::Equal && hi_cmp == Ordering::Equal {
                AlwaysFalse
            } else if lo_cmp == Ordering::Greater || hi_cmp == Ordering::Less {
                AlwaysTrue
            } else {
                MaybeTrue
            }
        }
        _ => MaybeTrue,
    }
}

fn eval_cmp(op: Operator, column: &Expr, value: &Expr, bounds: &PartitionBounds) -> IntervalTruth {
    let (Some((lo, hi)), Some(v)) = (bounds.get(column), literal(value)) else {
        return IntervalTruth::MaybeTrue;
    };
    match coerce_literal(v, lo) {
        Some(v) => eval_cmp_on_interval(op, &v, lo, hi),
        None => IntervalTruth::MaybeTrue,
    }
}

fn eval_binary(be: &BinaryExpr, bounds: &PartitionBounds) -> IntervalTruth {
    match be.op {
        Operator::And => eval_predicate(&be.left, bounds).and(eval_predicate(&be.right, bounds)),
        Operator::Or => eval_predicate(&be.left, bounds).or(eval_predicate(&be.right, bounds)),
        op => {
            if bounds.get(&be.left).is_some() {
                eval_cmp(op, &be.left, &be.right, bounds)
            } else if bounds.get(&be.right).is_some() {
                match flip_op(op) {
                    Some(flipped) => eval_cmp(flipped, &be.right, &be.left, bounds),
                    None => IntervalTruth::MaybeTrue,
                }
            } else {
                IntervalTruth::MaybeTrue
            }
        }
    }
}

fn eval_between(b: &Between, bounds: &PartitionBounds) -> IntervalTruth {
    let inner = eval_cmp(Operator::GtEq, &b.expr, &b.low, bounds)
        .and(eval_cmp(Operator::LtEq, &b.expr, &b.high, bounds));
    if b.negated { inner.not() } else { inner }
}

fn eval_in_list(il: &InList, bounds: &PartitionBounds) -> IntervalTruth {
    if bounds.get(&il.expr).is_none() {
        return IntervalTruth::MaybeTrue;
    }
    let any = il
        .list
        .iter()
        .map(|item| eval_cmp(Operator::Eq, &il.expr, item, bounds))
        .fold(IntervalTruth::AlwaysFalse, IntervalTruth::or);
    if il.negated { any.not() } else { any }
}

/// Evaluate `expr` over every row a partition with `bounds` can hold.
pub(crate) fn eval_predicate(expr: &Expr, bounds: &PartitionBounds) -> IntervalTruth {
    use IntervalTruth::*;
    match unwrap_expr(expr) {
        Expr::BinaryExpr(be) => eval_binary(be, bounds),
        Expr::Not(inner) => eval_predicate(inner, bounds).not(),
        Expr::Between(b) => eval_between(b, bounds),
        Expr::InList(il) => eval_in_list(il, bounds),
        // Partition values are never null.
        Expr::IsNull(inner) if bounds.get(inner).is_some() => AlwaysFalse,
        Expr::IsNotNull(inner) if bounds.get(inner).is_some() => AlwaysTrue,
        Expr::Literal(ScalarValue::Boolean(Some(b)), _) => {
            if *b {
                AlwaysTrue
            } else {
                AlwaysFalse
            }
        }
        _ => MaybeTrue,
    }
}

/// Keep partitions that may hold rows satisfying every filter.
///
/// Returns each kept partition with the combined truth of the filters over it.
pub(crate) fn prune_partitions(
    schema: &TableSchema,
    dirs: Vec<PartitionDir>,
    filters: &[&Expr],
) -> Vec<(PartitionDir, IntervalTruth)> {
    if filters.is_empty() {
        return dirs
            .into_iter()
            .map(|d| (d, IntervalTruth::AlwaysTrue))
            .collect();
    }

    let total = dirs.len();
    let kept: Vec<_> = dirs
        .into_iter()
        .filter_map(|dir| {
            let bounds = PartitionBounds::new(schema, &dir.partition);
            let truth = filters
                .iter()
                .map(|f| eval_predicate(f, &bounds))
                .fold(IntervalTruth::AlwaysTrue, IntervalTruth::and);
            (truth != IntervalTruth::AlwaysFalse).then_some((dir, truth))
        })
        .collect();

    debug!("pruning kept {} of {} partitions", kept.len(), total);
    kept
}
