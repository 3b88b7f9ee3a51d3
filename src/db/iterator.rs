//! Streaming cursor over a live query.
//!
//! A [`DbIterator`] owns one pooled connection for as long as it is open.
//! SQLite statements borrow their connection, so the statement and its row
//! cursor live on a worker thread that owns all three; mapped rows are handed
//! over a zero-capacity channel, which keeps the worker at most one row ahead
//! of the caller.
//!
//! Resources are released exactly once, on whichever of these happens first:
//! `has_more()` finding no row, `next()` running past the end, any database
//! or mapping failure, `close()`, or drop.

use crate::db::pool::DbConnection;
use crate::db::query::Query;
use crate::error::{Result, StoreError};
use crossbeam_channel::{bounded, Receiver, Sender};
use rusqlite::{params_from_iter, Connection, Row};
use std::thread::{self, JoinHandle};
use tracing::{trace, warn};

/// Turns one result row into a domain object.
///
/// The connection is the one the row was read from, so a mapper may issue
/// follow-up reads through it. Mappers must not keep the row past the call.
pub trait RecordMapper<T>: Send + 'static {
    fn map(&self, conn: &Connection, row: &Row<'_>) -> Result<T>;
}

impl<T, F> RecordMapper<T> for F
where
    F: Fn(&Connection, &Row<'_>) -> Result<T> + Send + 'static,
{
    fn map(&self, conn: &Connection, row: &Row<'_>) -> Result<T> {
        self(conn, row)
    }
}

/// What the worker reports for each step of the result cursor.
enum Fetch<T> {
    /// A row, or the mapper's failure to convert it.
    Row(Result<T>),
    Done,
    /// Preparing, executing or advancing the statement failed.
    Failed(StoreError),
}

struct Session<T> {
    rows: Receiver<Fetch<T>>,
    worker: JoinHandle<()>,
}

impl<T> Session<T> {
    fn recv(&self) -> Result<Fetch<T>> {
        self.rows
            .recv()
            .map_err(|_| StoreError::Cursor("query worker stopped unexpectedly".to_string()))
    }

    /// Hangs up on the worker and waits until it has dropped rows, statement
    /// and connection.
    fn release(self) {
        let Session { rows, worker } = self;
        drop(rows);
        if worker.join().is_err() {
            warn!("query worker panicked before releasing its connection");
        }
        trace!("cursor released");
    }
}

/// Single-pass, closeable stream of mapped rows.
pub struct DbIterator<T> {
    session: Option<Session<T>>,
    /// The row the next call to `next()` returns.
    pending: Option<Result<T>>,
    iterated: bool,
}

impl<T: Send + 'static> DbIterator<T> {
    /// Executes `query` on `conn` and positions the cursor on the first row.
    ///
    /// Blocks until the first row (or the lack of one) is known. If the query
    /// cannot be executed the connection is returned before the error is.
    pub fn new<M>(conn: DbConnection, query: Query, mapper: M) -> Result<Self>
    where
        M: RecordMapper<T>,
    {
        let (tx, rx) = bounded(0);
        let worker = thread::Builder::new()
            .name("db-cursor".to_string())
            .spawn(move || stream_rows(conn, query, mapper, tx))?;
        let session = Session { rows: rx, worker };

        let pending = match session.recv() {
            Ok(Fetch::Row(row)) => Some(row),
            Ok(Fetch::Done) => None,
            Ok(Fetch::Failed(e)) | Err(e) => {
                session.release();
                return Err(e);
            }
        };

        Ok(Self {
            session: Some(session),
            pending,
            iterated: false,
        })
    }
}

impl<T> DbIterator<T> {
    /// Whether `next()` has a row to return. Releases the cursor when it does not.
    pub fn has_more(&mut self) -> bool {
        if self.pending.is_none() {
            self.close();
        }
        self.pending.is_some()
    }

    /// Returns the current row and advances to the following one.
    ///
    /// Past the end this releases the cursor and returns
    /// [`StoreError::Exhausted`]. A mapping failure is returned by the call
    /// that would have returned its row. A failure stepping to the following
    /// row is returned by this call instead of the current row, which is
    /// dropped. Either way the cursor is released and cannot be resumed.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<T> {
        let current = match self.pending.take() {
            Some(current) => current,
            None => {
                self.close();
                return Err(StoreError::Exhausted);
            }
        };
        let item = match current {
            Ok(item) => item,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };
        if let Err(e) = self.advance() {
            self.close();
            return Err(e);
        }
        Ok(item)
    }

    fn advance(&mut self) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        match session.recv()? {
            Fetch::Row(row) => self.pending = Some(row),
            Fetch::Done => {}
            Fetch::Failed(e) => return Err(e),
        }
        Ok(())
    }

    /// Releases the connection. Safe to call at any point, any number of times.
    pub fn close(&mut self) {
        self.pending = None;
        if let Some(session) = self.session.take() {
            session.release();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    /// Starts the single pass over the remaining rows.
    ///
    /// Fails with [`StoreError::AlreadyIterated`] on a second call.
    pub fn iter(&mut self) -> Result<Iter<'_, T>> {
        if self.iterated {
            return Err(StoreError::AlreadyIterated);
        }
        self.iterated = true;
        Ok(Iter { cursor: self })
    }

    /// Drains the cursor into a vector.
    pub fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for item in self.iter()? {
            items.push(item?);
        }
        Ok(items)
    }
}

impl<T> Drop for DbIterator<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Borrowing iterator returned by [`DbIterator::iter`]; stops after the first error.
pub struct Iter<'a, T> {
    cursor: &'a mut DbIterator<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.cursor.has_more() {
            return None;
        }
        Some(self.cursor.next())
    }
}

fn stream_rows<T, M>(conn: DbConnection, query: Query, mapper: M, tx: Sender<Fetch<T>>)
where
    M: RecordMapper<T>,
{
    let mut stmt = match conn.prepare(query.sql()) {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = tx.send(Fetch::Failed(e.into()));
            return;
        }
    };
    let mut rows = match stmt.query(params_from_iter(query.params())) {
        Ok(rows) => rows,
        Err(e) => {
            let _ = tx.send(Fetch::Failed(e.into()));
            return;
        }
    };

    loop {
        let fetch = match rows.next() {
            Ok(Some(row)) => Fetch::Row(mapper.map(&conn, row)),
            Ok(None) => Fetch::Done,
            Err(e) => Fetch::Failed(e.into()),
        };
        let last = !matches!(fetch, Fetch::Row(Ok(_)));
        // A send error means the caller closed the cursor.
        if tx.send(fetch).is_err() || last {
            break;
        }
    }
}
