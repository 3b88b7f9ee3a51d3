//! Connection provider and schema bootstrap.

use crate::config::DatabaseConfig;
use crate::error::Result;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A connection checked out of the pool; dropping it hands it back.
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS block (
    db_id INTEGER PRIMARY KEY AUTOINCREMENT,
    id INTEGER NOT NULL UNIQUE,
    version INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    previous_block_id INTEGER,
    height INTEGER NOT NULL,
    generator_id INTEGER NOT NULL,
    nonce INTEGER NOT NULL,
    total_amount INTEGER NOT NULL,
    total_fee INTEGER NOT NULL,
    payload_hash BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS block_height_idx ON block (height);
CREATE INDEX IF NOT EXISTS block_generator_id_idx ON block (generator_id);
CREATE INDEX IF NOT EXISTS block_timestamp_idx ON block (timestamp);

CREATE TABLE IF NOT EXISTS "transaction" (
    db_id INTEGER PRIMARY KEY AUTOINCREMENT,
    id INTEGER NOT NULL UNIQUE,
    full_hash BLOB NOT NULL,
    type INTEGER NOT NULL,
    subtype INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    deadline INTEGER NOT NULL,
    sender_id INTEGER NOT NULL,
    recipient_id INTEGER,
    amount INTEGER NOT NULL,
    fee INTEGER NOT NULL,
    attachment TEXT,
    block_id INTEGER NOT NULL REFERENCES block (id) ON DELETE CASCADE,
    height INTEGER NOT NULL,
    block_timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS transaction_sender_id_idx ON "transaction" (sender_id);
CREATE INDEX IF NOT EXISTS transaction_recipient_id_idx ON "transaction" (recipient_id);
CREATE INDEX IF NOT EXISTS transaction_block_id_idx ON "transaction" (block_id);
CREATE INDEX IF NOT EXISTS transaction_block_timestamp_idx ON "transaction" (block_timestamp);
"#;

/// Pool of SQLite connections over a single database file.
#[derive(Clone)]
pub struct Db {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl Db {
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let path = PathBuf::from(&config.path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = config.busy_timeout();
        let wal = config.wal;
        let manager = SqliteConnectionManager::file(&path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            if wal {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            Ok(())
        });

        let pool = Pool::builder().max_size(config.pool_size).build(manager)?;

        let db = Db { pool, path };
        db.init_schema()?;
        debug!(path = %db.path.display(), pool_size = config.pool_size, "database opened");
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.get_connection()?;
        Self::create_tables(&conn)
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Checks a connection out of the pool. Fails once the pool's checkout timeout elapses.
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Number of connections currently checked out.
    pub fn connections_in_use(&self) -> u32 {
        let state = self.pool.state();
        state.connections - state.idle_connections
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
