//! The database handle.
//!
//! A [`Database`] is a root directory plus options. It holds no table state:
//! every call reads the metadata it needs from disk, so two handles on the
//! same directory see each other's changes immediately. Writes are not
//! coordinated; callers must run at most one writer per table at a time.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use arrow::array::RecordBatch;
use datafusion::prelude::Expr;
use hivelake_core::{
    CreateOutcome, DatabaseLocation, ExistencePolicy, InsertSummary, MetadataStore,
    OptimizeSummary, PartitionKeySpec, TableMetadata, TableSchema, optimize, storage, write,
};
use log::info;

use crate::{
    delete::{self, DeleteSummary},
    error::DatabaseResult,
    operation::TableOperation,
    options::DatabaseOptions,
    planner,
    query::TableQuery,
    rowset::RowSet,
};

/// Open (creating if needed) a database rooted at `path` with default options.
pub async fn connect(path: impl Into<PathBuf>) -> DatabaseResult<Database> {
    connect_with_options(path, DatabaseOptions::default()).await
}

/// Open (creating if needed) a database rooted at `path`.
pub async fn connect_with_options(
    path: impl Into<PathBuf>,
    options: DatabaseOptions,
) -> DatabaseResult<Database> {
    let location = DatabaseLocation::local(path);
    storage::create_dir_all(&location, Path::new("")).await?;
    info!("connected to database at {location}");
    Ok(Database {
        store: MetadataStore::new(location),
        options,
    })
}

/// Handle on a hivelake database directory.
#[derive(Debug, Clone)]
pub struct Database {
    store: MetadataStore,
    options: DatabaseOptions,
}

impl Database {
    /// Root location of the database.
    pub fn location(&self) -> &DatabaseLocation {
        self.store.location()
    }

    /// Options this handle was opened with.
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Execute a create, insert, delete or drop.
    pub async fn command(&self, operation: TableOperation) -> DatabaseResult<()> {
        match operation {
            TableOperation::Create {
                table,
                schema,
                partition_keys,
                policy,
            } => {
                self.create(&table, schema, partition_keys, policy).await?;
            }
            TableOperation::Insert { table, batches } => {
                self.insert(&table, &batches).await?;
            }
            TableOperation::Delete { table, predicate } => {
                self.delete(&table, predicate).await?;
            }
            TableOperation::Drop { table } => self.drop_table(&table).await?,
        }
        Ok(())
    }

    /// Create a table.
    pub async fn create(
        &self,
        table_name: &str,
        schema: TableSchema,
        partition_keys: Vec<PartitionKeySpec>,
        policy: ExistencePolicy,
    ) -> DatabaseResult<CreateOutcome> {
        Ok(self
            .store
            .create(table_name, schema, partition_keys, policy)
            .await?)
    }

    /// Run a query and collect its rows.
    pub async fn query(&self, query: impl Into<TableQuery>) -> DatabaseResult<RowSet> {
        planner::execute(&self.store, &query.into()).await
    }

    /// Append rows to a table.
    ///
    /// Every batch must match the table schema exactly (columns in any order).
    /// Nothing is written if any batch or row is invalid.
    pub async fn insert(
        &self,
        table_name: &str,
        batches: &[RecordBatch],
    ) -> DatabaseResult<InsertSummary> {
        Ok(write::insert(&self.store, table_name, batches, self.options.write_options()).await?)
    }

    /// Delete rows for which `predicate` is true.
    pub async fn delete(&self, table_name: &str, predicate: Expr) -> DatabaseResult<DeleteSummary> {
        delete::delete(
            &self.store,
            table_name,
            &predicate,
            self.options.write_options(),
        )
        .await
    }

    /// De-duplicate rows and merge small files in every partition.
    pub async fn optimize(&self, table_name: &str) -> DatabaseResult<OptimizeSummary> {
        Ok(optimize::optimize(&self.store, table_name, self.options.write_options()).await?)
    }

    /// Remove a table's data and metadata.
    pub async fn drop_table(&self, table_name: &str) -> DatabaseResult<()> {
        Ok(self.store.drop(table_name).await?)
    }

    /// Names of all tables, sorted.
    pub async fn list_tables(&self) -> DatabaseResult<Vec<String>> {
        Ok(self.store.list().await?)
    }

    /// Current metadata of a table.
    pub async fn table_metadata(&self, table_name: &str) -> DatabaseResult<TableMetadata> {
        Ok(self.store.load(table_name).await?)
    }

    /// Human-readable summary: the root path, then one line per table.
    pub async fn describe(&self) -> DatabaseResult<String> {
        let mut out = format!("Database({})", self.location());
        for name in self.list_tables().await? {
            let meta = self.table_metadata(&name).await?;
            out.push_str(&format!("\n  {meta}"));
        }
        Ok(out)
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Database({})", self.location())
    }
}
