//! Write and DDL descriptions, and the `table(name)` builder.

use arrow::array::RecordBatch;
use datafusion::prelude::Expr;
use hivelake_core::{ExistencePolicy, PartitionKeySpec, TableSchema};

use crate::query::{JoinKeys, JoinKind, SortKey, TableQuery};

/// A write or DDL command against one table.
///
/// Built with [`table`] and executed with `Database::command`.
#[derive(Debug, Clone)]
pub enum TableOperation {
    /// Create the table.
    Create {
        /// Table name.
        table: String,
        /// Column definitions.
        schema: TableSchema,
        /// Partition keys in nesting order.
        partition_keys: Vec<PartitionKeySpec>,
        /// What to do if the table already exists.
        policy: ExistencePolicy,
    },
    /// Append rows.
    Insert {
        /// Table name.
        table: String,
        /// Rows to append.
        batches: Vec<RecordBatch>,
    },
    /// Delete rows matching a predicate.
    Delete {
        /// Table name.
        table: String,
        /// Rows for which this is true are removed.
        predicate: Expr,
    },
    /// Remove the table's data and metadata.
    Drop {
        /// Table name.
        table: String,
    },
}

impl TableOperation {
    /// Name of the table the operation targets.
    pub fn table(&self) -> &str {
        match self {
            TableOperation::Create { table, .. }
            | TableOperation::Insert { table, .. }
            | TableOperation::Delete { table, .. }
            | TableOperation::Drop { table } => table,
        }
    }
}

/// Entry point for describing operations and queries on `name`.
///
/// ```
/// use hivelake_datafusion::{col, lit, table};
///
/// let q = table("stock_prices")
///     .filter(col("ticker").eq(lit("AAPL")))
///     .sort(["date"]);
/// assert_eq!(q.stages().len(), 2);
/// ```
pub fn table(name: impl Into<String>) -> TableBuilder {
    TableBuilder { name: name.into() }
}

/// Builder returned by [`table`].
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
}

impl TableBuilder {
    /// Create the table, failing if it already exists.
    pub fn create(self, schema: TableSchema, partition_keys: Vec<PartitionKeySpec>) -> TableOperation {
        self.create_with_policy(schema, partition_keys, ExistencePolicy::FailIfExists)
    }

    /// Create the table with an explicit existence policy.
    pub fn create_with_policy(
        self,
        schema: TableSchema,
        partition_keys: Vec<PartitionKeySpec>,
        policy: ExistencePolicy,
    ) -> TableOperation {
        TableOperation::Create {
            table: self.name,
            schema,
            partition_keys,
            policy,
        }
    }

    /// Append rows.
    pub fn insert(self, batches: Vec<RecordBatch>) -> TableOperation {
        TableOperation::Insert {
            table: self.name,
            batches,
        }
    }

    /// Delete rows for which `predicate` is true.
    pub fn delete(self, predicate: Expr) -> TableOperation {
        TableOperation::Delete {
            table: self.name,
            predicate,
        }
    }

    /// Drop the table.
    pub fn drop(self) -> TableOperation {
        TableOperation::Drop { table: self.name }
    }

    /// Every row and column of the table.
    pub fn query(self) -> TableQuery {
        TableQuery::new(self.name)
    }

    /// Start a query with a projection.
    pub fn select<I, S>(self, columns: I) -> TableQuery
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query().select(columns)
    }

    /// Start a query with a filter.
    pub fn filter(self, predicate: Expr) -> TableQuery {
        self.query().filter(predicate)
    }

    /// Start a query with a join.
    pub fn join(
        self,
        other: impl Into<TableQuery>,
        keys: impl Into<JoinKeys>,
        kind: JoinKind,
    ) -> TableQuery {
        self.query().join(other, keys, kind)
    }

    /// Start a query with a sort.
    pub fn sort<I, K>(self, keys: I) -> TableQuery
    where
        I: IntoIterator<Item = K>,
        K: Into<SortKey>,
    {
        self.query().sort(keys)
    }
}

impl From<TableBuilder> for TableQuery {
    fn from(builder: TableBuilder) -> Self {
        builder.query()
    }
}
