//! Parameterized statement construction.
//!
//! Every statement the store runs is assembled here from a list of optional
//! predicates. Each predicate carries its own bound values, so the order of
//! values in [`Query::params`] always matches the order of `?` placeholders
//! in [`Query::sql`].
//!
//! Chain-relative inputs (tip-relative height ranges, confirmation depth) take
//! the current height as an explicit argument; callers read it once per
//! request and pass it in.

use crate::error::{Result, StoreError};
use rusqlite::types::Value;

/// Most successors a single `*_after` request may return.
pub const MAX_BLOCKS_AFTER: u32 = 1440;

/// Ids are unsigned on the chain and stored bit-for-bit as signed integers.
pub fn sql_id(id: u64) -> i64 {
    id as i64
}

pub fn id_from_sql(value: i64) -> u64 {
    value as u64
}

/// SQL text plus the values bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    params: Vec<Value>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Binds the next placeholder.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    fn push_sql(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }
}

/// Result-set window over a most-recent-first ordering.
///
/// `from` and `to` are inclusive row indices; `to == None` leaves the window
/// open-ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    from: u32,
    to: Option<u32>,
}

impl Window {
    pub const ALL: Window = Window { from: 0, to: None };

    pub fn new(from: u32, to: Option<u32>) -> Result<Self> {
        if let Some(to) = to {
            if to < from {
                return Err(StoreError::invalid_input(format!(
                    "Invalid pagination window: to index {to} is before from index {from}"
                )));
            }
        }
        Ok(Self { from, to })
    }

    /// API form: `from` must be non-negative, a negative `to` means unbounded.
    pub fn from_indices(from: i32, to: i32) -> Result<Self> {
        let from = u32::try_from(from).map_err(|_| {
            StoreError::invalid_input(format!("Invalid pagination window: negative from index {from}"))
        })?;
        Window::new(from, u32::try_from(to).ok())
    }

    pub fn first(count: u32) -> Result<Self> {
        if count == 0 {
            return Err(StoreError::invalid_input("Window must cover at least one row"));
        }
        Window::new(0, Some(count - 1))
    }

    /// Number of rows the window covers; `None` when open-ended.
    pub fn limit(&self) -> Option<i64> {
        self.to.map(|to| i64::from(to) - i64::from(self.from) + 1)
    }

    /// Appends the LIMIT/OFFSET tail, or nothing for an unbounded window.
    fn write_into(&self, query: &mut Query) {
        match (self.limit(), self.from) {
            (None, 0) => {}
            (Some(limit), 0) => {
                query.push_sql(" LIMIT ?");
                query.params.push(Value::from(limit));
            }
            (Some(limit), from) => {
                query.push_sql(" LIMIT ? OFFSET ?");
                query.params.push(Value::from(limit));
                query.params.push(Value::from(i64::from(from)));
            }
            // SQLite only accepts OFFSET after a LIMIT.
            (None, from) => {
                query.push_sql(" LIMIT -1 OFFSET ?");
                query.params.push(Value::from(i64::from(from)));
            }
        }
    }
}

/// Filters for an account's transaction history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Blocks required on top of the including block; 0 accepts unconfirmed depth.
    pub confirmations: u32,
    pub tx_type: Option<u8>,
    /// Ignored unless `tx_type` is set.
    pub subtype: Option<u8>,
    pub min_block_timestamp: Option<i32>,
    pub window: Window,
}

impl HistoryFilter {
    /// Builds a filter from API-style sentinels: a negative type or subtype and a
    /// non-positive timestamp mean "absent".
    pub fn from_raw(
        confirmations: i32,
        tx_type: i32,
        subtype: i32,
        block_timestamp: i32,
        from: i32,
        to: i32,
    ) -> Result<Self> {
        let confirmations = u32::try_from(confirmations).map_err(|_| {
            StoreError::invalid_input(format!("Negative number of confirmations {confirmations}"))
        })?;
        Ok(Self {
            confirmations,
            tx_type: optional_byte("type", tx_type)?,
            subtype: optional_byte("subtype", subtype)?,
            min_block_timestamp: (block_timestamp > 0).then_some(block_timestamp),
            window: Window::from_indices(from, to)?,
        })
    }

    /// Highest block height a result may come from, given the chain height at call time.
    pub fn height_ceiling(&self, height: i32) -> Result<Option<i32>> {
        if self.confirmations == 0 {
            return Ok(None);
        }
        let ceiling = i64::from(height) - i64::from(self.confirmations);
        if ceiling < 0 {
            return Err(StoreError::ConfirmationsExceedHeight {
                confirmations: self.confirmations,
                height,
            });
        }
        Ok(Some(ceiling as i32))
    }

    fn effective_subtype(&self) -> Option<u8> {
        self.tx_type.and(self.subtype)
    }
}

fn optional_byte(name: &str, value: i32) -> Result<Option<u8>> {
    if value < 0 {
        return Ok(None);
    }
    u8::try_from(value)
        .map(Some)
        .map_err(|_| StoreError::invalid_input(format!("Transaction {name} {value} out of range")))
}

/// One `AND`-joined fragment and the values it binds.
#[derive(Debug)]
struct Clause {
    fragment: &'static str,
    values: Vec<Value>,
}

/// Ordered predicate list folded into a WHERE body.
#[derive(Debug)]
struct Predicates {
    clauses: Vec<Clause>,
}

impl Predicates {
    fn require(fragment: &'static str, values: Vec<Value>) -> Self {
        Self {
            clauses: vec![Clause { fragment, values }],
        }
    }

    fn and_opt<V: Into<Value>>(mut self, fragment: &'static str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.clauses.push(Clause {
                fragment,
                values: vec![value.into()],
            });
        }
        self
    }

    fn write_into(self, query: &mut Query) {
        for (i, clause) in self.clauses.into_iter().enumerate() {
            if i > 0 {
                query.push_sql(" AND ");
            }
            query.push_sql(clause.fragment);
            query.params.extend(clause.values);
        }
    }
}

pub fn all_blocks() -> Query {
    Query::new("SELECT * FROM block ORDER BY db_id ASC")
}

/// Blocks between `from` and `to` blocks below the tip, highest first.
/// A `to` of zero reaches down to genesis.
pub fn blocks_in_range(height: i32, from: u32, to: u32) -> Query {
    let upper = i64::from(height) - i64::from(from);
    let lower = if to > 0 {
        i64::from(height) - i64::from(to)
    } else {
        0
    };
    Query::new("SELECT * FROM block WHERE height <= ? AND height >= ? ORDER BY height DESC, db_id ASC")
        .bind(upper)
        .bind(lower)
}

pub fn blocks_by_account(account_id: u64, min_timestamp: Option<i32>, window: Window) -> Query {
    let mut query = Query::new("SELECT * FROM block WHERE ");
    Predicates::require("generator_id = ?", vec![Value::from(sql_id(account_id))])
        .and_opt("timestamp >= ?", min_timestamp)
        .write_into(&mut query);
    query.push_sql(" ORDER BY db_id DESC");
    window.write_into(&mut query);
    query
}

pub fn check_successor_limit(limit: u32) -> Result<()> {
    if limit > MAX_BLOCKS_AFTER {
        return Err(StoreError::invalid_input(format!(
            "Can't get more than {MAX_BLOCKS_AFTER} blocks at a time"
        )));
    }
    if limit == 0 {
        return Err(StoreError::invalid_input("Successor limit must be at least 1"));
    }
    Ok(())
}

pub fn block_ids_after(block_id: u64, limit: u32) -> Result<Query> {
    check_successor_limit(limit)?;
    Ok(successors("SELECT id FROM block", block_id, limit))
}

pub fn blocks_after(block_id: u64, limit: u32) -> Result<Query> {
    check_successor_limit(limit)?;
    Ok(successors("SELECT * FROM block", block_id, limit))
}

fn successors(select: &str, block_id: u64, limit: u32) -> Query {
    let mut query = Query::new(select);
    query.push_sql(" WHERE db_id > (SELECT db_id FROM block WHERE id = ?) ORDER BY db_id ASC");
    query.params.push(Value::from(sql_id(block_id)));
    let window = Window {
        from: 0,
        to: Some(limit - 1),
    };
    window.write_into(&mut query);
    query
}

pub fn block_by_id(block_id: u64) -> Query {
    Query::new("SELECT * FROM block WHERE id = ?").bind(sql_id(block_id))
}

pub fn block_exists(block_id: u64) -> Query {
    Query::new("SELECT EXISTS (SELECT 1 FROM block WHERE id = ?)").bind(sql_id(block_id))
}

pub fn chain_height() -> Query {
    Query::new("SELECT COALESCE(MAX(height), 0) FROM block")
}

pub fn transaction_count() -> Query {
    Query::new("SELECT COUNT(*) FROM \"transaction\"")
}

pub fn all_transactions() -> Query {
    Query::new("SELECT * FROM \"transaction\" ORDER BY db_id ASC")
}

pub fn transactions_for_block(block_id: u64) -> Query {
    Query::new("SELECT * FROM \"transaction\" WHERE block_id = ? ORDER BY db_id ASC")
        .bind(sql_id(block_id))
}

/// Transactions received by or sent from `account_id`, newest first.
///
/// The received half excludes self-sends so each transaction matches exactly
/// one half of the `UNION ALL`.
pub fn transactions_for_account(account_id: u64, filter: &HistoryFilter, height: i32) -> Result<Query> {
    let ceiling = filter.height_ceiling(height)?;
    let account = sql_id(account_id);

    let mut query = Query::new("SELECT * FROM \"transaction\" WHERE ");
    history_predicates(
        Predicates::require(
            "recipient_id = ? AND sender_id <> ?",
            vec![Value::from(account), Value::from(account)],
        ),
        filter,
        ceiling,
    )
    .write_into(&mut query);

    query.push_sql(" UNION ALL SELECT * FROM \"transaction\" WHERE ");
    history_predicates(
        Predicates::require("sender_id = ?", vec![Value::from(account)]),
        filter,
        ceiling,
    )
    .write_into(&mut query);

    query.push_sql(" ORDER BY block_timestamp DESC, id DESC");
    filter.window.write_into(&mut query);
    Ok(query)
}

fn history_predicates(identity: Predicates, filter: &HistoryFilter, ceiling: Option<i32>) -> Predicates {
    identity
        .and_opt("block_timestamp >= ?", filter.min_block_timestamp)
        .and_opt("type = ?", filter.tx_type)
        .and_opt("subtype = ?", filter.effective_subtype())
        .and_opt("height <= ?", ceiling)
}
