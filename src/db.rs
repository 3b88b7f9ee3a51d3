//! SQL persistence layer.
//!
//! `pool` hands out connections, `query` builds parameterized statements,
//! `iterator` streams mapped rows while holding one connection, and `store`
//! ties them together behind the [`BlockchainStore`] API.

pub mod block_db;
pub mod iterator;
pub mod pool;
pub mod query;
pub mod store;
pub mod transaction_db;

pub use iterator::{DbIterator, RecordMapper};
pub use pool::{Db, DbConnection};
pub use query::{HistoryFilter, Query, Window};
pub use store::{BlockchainStore, HeightSource, SqlBlockchainStore, MAX_BLOCKS_AFTER};
