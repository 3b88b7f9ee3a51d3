//! Blockchain store: block and transaction retrieval plus the append path.

use crate::block::Block;
use crate::config::DatabaseConfig;
use crate::db::block_db;
use crate::db::iterator::DbIterator;
use crate::db::pool::{Db, DbConnection};
use crate::db::query::{self, id_from_sql, HistoryFilter, Query, Window};
use crate::db::transaction_db;
use crate::error::Result;
use crate::transaction::Transaction;
use rusqlite::types::FromSql;
use rusqlite::{params_from_iter, Connection, Row};
use std::sync::Arc;
use tracing::{debug, trace};

pub use crate::db::query::MAX_BLOCKS_AFTER;

/// Supplies the current chain height. Read once per request, never cached
/// across a streaming session.
pub trait HeightSource: Send + Sync {
    fn height(&self) -> Result<i32>;
}

impl<F> HeightSource for F
where
    F: Fn() -> Result<i32> + Send + Sync,
{
    fn height(&self) -> Result<i32> {
        self()
    }
}

/// Height of the highest stored block; 0 for an empty chain.
struct SqlHeight {
    db: Db,
}

impl HeightSource for SqlHeight {
    fn height(&self) -> Result<i32> {
        let conn = self.db.get_connection()?;
        scalar(&conn, &query::chain_height())
    }
}

/// Abstraction for chain-history storage backends.
///
/// Streaming operations return a [`DbIterator`] that holds one connection
/// until it is exhausted or closed. List and scalar operations run to
/// completion and release their connection before returning.
pub trait BlockchainStore: Send + Sync {
    fn height(&self) -> Result<i32>;

    /// Every block, in insertion order.
    fn all_blocks(&self) -> Result<DbIterator<Block>>;

    /// Blocks from `from` to `to` blocks below the current tip, highest
    /// first. A `to` of 0 reaches down to genesis.
    fn blocks_in_range(&self, from: u32, to: u32) -> Result<DbIterator<Block>>;

    /// Blocks generated by `account_id`, newest first. A `timestamp` of 0
    /// disables the timestamp floor.
    fn blocks_by_account(
        &self,
        account_id: u64,
        timestamp: i32,
        window: Window,
    ) -> Result<DbIterator<Block>>;

    /// Ids of up to `limit` blocks stored after `block_id`.
    ///
    /// An unknown `block_id` yields an empty list, the same as the tip does;
    /// use [`has_block`](Self::has_block) to tell them apart.
    fn block_ids_after(&self, block_id: u64, limit: u32) -> Result<Vec<u64>>;

    fn blocks_after(&self, block_id: u64, limit: u32) -> Result<Vec<Block>>;

    fn block(&self, block_id: u64) -> Result<Option<Block>>;

    fn has_block(&self, block_id: u64) -> Result<bool>;

    fn transaction_count(&self) -> Result<u64>;

    /// Every transaction, in insertion order.
    fn all_transactions(&self) -> Result<DbIterator<Transaction>>;

    /// Transactions sent or received by `account_id`, newest first.
    fn transactions_for_account(
        &self,
        account_id: u64,
        filter: &HistoryFilter,
    ) -> Result<DbIterator<Transaction>>;

    /// Persists `block` and its transactions.
    fn append_block(&self, block: &Block) -> Result<bool>;
}

/// SQLite-backed [`BlockchainStore`].
#[derive(Clone)]
pub struct SqlBlockchainStore {
    db: Db,
    height: Arc<dyn HeightSource>,
}

impl SqlBlockchainStore {
    pub fn new(db: Db) -> Self {
        let height = Arc::new(SqlHeight { db: db.clone() });
        Self { db, height }
    }

    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        Ok(Self::new(Db::open(config)?))
    }

    /// Replaces the block-table height lookup, e.g. with the node's in-memory tip.
    pub fn with_height_source(mut self, source: impl HeightSource + 'static) -> Self {
        self.height = Arc::new(source);
        self
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    fn stream_blocks(&self, query: Query) -> Result<DbIterator<Block>> {
        let conn = self.db.get_connection()?;
        self.blocks(conn, query)
    }

    fn stream_transactions(&self, query: Query) -> Result<DbIterator<Transaction>> {
        let conn = self.db.get_connection()?;
        self.transactions(conn, query)
    }

    fn list<T, F>(&self, query: &Query, map: F) -> Result<Vec<T>>
    where
        F: Fn(&Connection, &Row<'_>) -> Result<T>,
    {
        trace!(sql = query.sql(), "list query");
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare_cached(query.sql())?;
        let mut rows = stmt.query(params_from_iter(query.params()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(map(&*conn, row)?);
        }
        Ok(result)
    }
}

/// Caller-built statements for predicates the built-in filters do not cover.
///
/// These skip input validation; the query runs exactly as given.
impl SqlBlockchainStore {
    pub fn connection(&self) -> Result<DbConnection> {
        self.db.get_connection()
    }

    /// Streams `block` rows selected by `query` on `conn`.
    pub fn blocks(&self, conn: DbConnection, query: Query) -> Result<DbIterator<Block>> {
        trace!(sql = query.sql(), "block stream");
        DbIterator::new(conn, query, block_db::load_block)
    }

    /// Streams `"transaction"` rows selected by `query` on `conn`.
    pub fn transactions(&self, conn: DbConnection, query: Query) -> Result<DbIterator<Transaction>> {
        trace!(sql = query.sql(), "transaction stream");
        DbIterator::new(conn, query, transaction_db::load_transaction)
    }
}

impl BlockchainStore for SqlBlockchainStore {
    fn height(&self) -> Result<i32> {
        self.height.height()
    }

    fn all_blocks(&self) -> Result<DbIterator<Block>> {
        self.stream_blocks(query::all_blocks())
    }

    fn blocks_in_range(&self, from: u32, to: u32) -> Result<DbIterator<Block>> {
        let height = self.height()?;
        self.stream_blocks(query::blocks_in_range(height, from, to))
    }

    fn blocks_by_account(
        &self,
        account_id: u64,
        timestamp: i32,
        window: Window,
    ) -> Result<DbIterator<Block>> {
        let min_timestamp = (timestamp > 0).then_some(timestamp);
        self.stream_blocks(query::blocks_by_account(account_id, min_timestamp, window))
    }

    fn block_ids_after(&self, block_id: u64, limit: u32) -> Result<Vec<u64>> {
        let query = query::block_ids_after(block_id, limit)?;
        self.list(&query, load_id)
    }

    fn blocks_after(&self, block_id: u64, limit: u32) -> Result<Vec<Block>> {
        let query = query::blocks_after(block_id, limit)?;
        self.list(&query, block_db::load_block)
    }

    fn block(&self, block_id: u64) -> Result<Option<Block>> {
        let mut blocks = self.list(&query::block_by_id(block_id), block_db::load_block)?;
        Ok(blocks.pop())
    }

    fn has_block(&self, block_id: u64) -> Result<bool> {
        let conn = self.db.get_connection()?;
        scalar(&conn, &query::block_exists(block_id))
    }

    fn transaction_count(&self) -> Result<u64> {
        let conn = self.db.get_connection()?;
        let count: i64 = scalar(&conn, &query::transaction_count())?;
        Ok(count as u64)
    }

    fn all_transactions(&self) -> Result<DbIterator<Transaction>> {
        self.stream_transactions(query::all_transactions())
    }

    fn transactions_for_account(
        &self,
        account_id: u64,
        filter: &HistoryFilter,
    ) -> Result<DbIterator<Transaction>> {
        let height = self.height()?;
        let query = query::transactions_for_account(account_id, filter, height)?;
        self.stream_transactions(query)
    }

    fn append_block(&self, block: &Block) -> Result<bool> {
        let conn = self.db.get_connection()?;
        block_db::save_block(&conn, block)?;
        debug!(block = block.id, height = block.height, "block appended");
        Ok(true)
    }
}

fn load_id(_conn: &Connection, row: &Row<'_>) -> Result<u64> {
    Ok(id_from_sql(row.get(0)?))
}

fn scalar<T: FromSql>(conn: &Connection, query: &Query) -> Result<T> {
    let value = conn.query_row(query.sql(), params_from_iter(query.params()), |row| row.get(0))?;
    Ok(value)
}
