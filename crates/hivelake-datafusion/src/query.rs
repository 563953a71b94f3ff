//! Declarative read descriptions: an ordered list of stages over a base table.
//!
//! A [`TableQuery`] is plain data. Nothing is read or planned until it is
//! handed to `Database::query`, and stages run in exactly the order they
//! were appended.

use datafusion::prelude::Expr;

/// Join flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinKind {
    /// Rows with a match on both sides.
    #[default]
    Inner,
    /// Every left row, with right columns null when unmatched.
    Left,
    /// Every right row, with left columns null when unmatched.
    Right,
    /// Every row from both sides.
    Full,
    /// Left rows that have a match; right columns are not returned.
    Semi,
    /// Left rows that have no match; right columns are not returned.
    Anti,
}

/// Columns to join on, paired left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKeys {
    pub(crate) left: Vec<String>,
    pub(crate) right: Vec<String>,
}

impl JoinKeys {
    /// Join on columns that have the same name on both sides.
    pub fn on<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let left: Vec<String> = columns.into_iter().map(Into::into).collect();
        Self {
            right: left.clone(),
            left,
        }
    }

    /// Join on `(left_column, right_column)` pairs.
    pub fn pairs<I, L, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        let (left, right) = pairs
            .into_iter()
            .map(|(l, r)| (l.into(), r.into()))
            .unzip();
        Self { left, right }
    }

    /// Left-side key columns.
    pub fn left(&self) -> &[String] {
        &self.left
    }

    /// Right-side key columns.
    pub fn right(&self) -> &[String] {
        &self.right
    }
}

impl From<&str> for JoinKeys {
    fn from(column: &str) -> Self {
        JoinKeys::on([column])
    }
}

/// One sort key. Nulls always sort last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Column to sort by.
    pub column: String,
    /// Sort largest first.
    pub descending: bool,
}

impl SortKey {
    /// Ascending sort on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Descending sort on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

impl From<&str> for SortKey {
    fn from(column: &str) -> Self {
        SortKey::asc(column)
    }
}

impl From<String> for SortKey {
    fn from(column: String) -> Self {
        SortKey::asc(column)
    }
}

/// A single query stage.
#[derive(Debug, Clone)]
pub enum QueryStage {
    /// Keep only these columns, in this order.
    Select(Vec<String>),
    /// Keep rows for which the predicate is true.
    Filter(Expr),
    /// Join against another query's result.
    Join {
        /// Right-hand side, resolved as a full query.
        other: Box<TableQuery>,
        /// Key columns.
        keys: JoinKeys,
        /// Join flavour.
        kind: JoinKind,
    },
    /// Order rows by these keys.
    Sort(Vec<SortKey>),
}

/// A read description over a named base table.
#[derive(Debug, Clone)]
pub struct TableQuery {
    pub(crate) table: String,
    pub(crate) stages: Vec<QueryStage>,
}

impl TableQuery {
    /// A query returning every row and column of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            stages: Vec::new(),
        }
    }

    /// Base table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &[QueryStage] {
        &self.stages
    }

    fn push(mut self, stage: QueryStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a projection stage.
    pub fn select<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(QueryStage::Select(
            columns.into_iter().map(Into::into).collect(),
        ))
    }

    /// Append a filter stage.
    pub fn filter(self, predicate: Expr) -> Self {
        self.push(QueryStage::Filter(predicate))
    }

    /// Append a join stage against another query (or a bare table builder).
    pub fn join(self, other: impl Into<TableQuery>, keys: impl Into<JoinKeys>, kind: JoinKind) -> Self {
        self.push(QueryStage::Join {
            other: Box::new(other.into()),
            keys: keys.into(),
            kind,
        })
    }

    /// Append a sort stage.
    pub fn sort<I, K>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<SortKey>,
    {
        self.push(QueryStage::Sort(keys.into_iter().map(Into::into).collect()))
    }

    /// Filter predicates that run before the first join, in order.
    ///
    /// These see only base-table rows, so they are the ones partition
    /// pruning may use.
    pub(crate) fn pre_join_filters(&self) -> Vec<&Expr> {
        self.stages
            .iter()
            .take_while(|s| !matches!(s, QueryStage::Join { .. }))
            .filter_map(|s| match s {
                QueryStage::Filter(e) => Some(e),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::prelude::{col, lit};

    #[test]
    fn stages_keep_append_order() {
        let q = TableQuery::new("prices")
            .filter(col("ticker").eq(lit("AAPL")))
            .select(["date", "price"])
            .sort([SortKey::desc("price")]);

        assert_eq!(q.table(), "prices");
        assert!(matches!(q.stages()[0], QueryStage::Filter(_)));
        assert!(matches!(&q.stages()[1], QueryStage::Select(c) if c == &["date", "price"]));
        assert!(matches!(&q.stages()[2], QueryStage::Sort(k) if k[0].descending));
    }

    #[test]
    fn only_filters_before_first_join_are_prunable() {
        let q = TableQuery::new("a")
            .filter(col("x").eq(lit(1)))
            .sort(["x"])
            .filter(col("y").eq(lit(2)))
            .join(TableQuery::new("b"), "x", JoinKind::Inner)
            .filter(col("z").eq(lit(3)));

        let filters = q.pre_join_filters();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1], &col("y").eq(lit(2)));
    }

    #[test]
    fn join_keys_constructors() {
        let on = JoinKeys::on(["ticker", "date"]);
        assert_eq!(on.left(), on.right());

        let pairs = JoinKeys::pairs([("ticker", "symbol")]);
        assert_eq!(pairs.left(), &["ticker".to_string()]);
        assert_eq!(pairs.right(), &["symbol".to_string()]);
    }
}
