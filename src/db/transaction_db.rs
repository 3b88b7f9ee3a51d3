//! Row mapping and persistence for transactions.

use crate::block::Sha256Hash;
use crate::db::query::{self, id_from_sql, sql_id};
use crate::error::{Result, StoreError};
use crate::transaction::Transaction;
use rusqlite::{params, params_from_iter, Connection, Row};

/// Record mapper for `"transaction"` rows.
pub fn load_transaction(_conn: &Connection, row: &Row<'_>) -> Result<Transaction> {
    let full_hash: Vec<u8> = row.get("full_hash")?;
    let full_hash: Sha256Hash = full_hash
        .try_into()
        .map_err(|bytes: Vec<u8>| StoreError::validation(format!("full_hash has {} bytes", bytes.len())))?;

    let attachment = match row.get::<_, Option<String>>("attachment")? {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };

    let tx = Transaction {
        id: id_from_sql(row.get("id")?),
        full_hash,
        tx_type: byte_column(row, "type")?,
        subtype: byte_column(row, "subtype")?,
        timestamp: row.get("timestamp")?,
        deadline: row.get("deadline")?,
        sender_id: id_from_sql(row.get("sender_id")?),
        recipient_id: row.get::<_, Option<i64>>("recipient_id")?.map(id_from_sql),
        amount: row.get("amount")?,
        fee: row.get("fee")?,
        attachment,
        block_id: id_from_sql(row.get("block_id")?),
        height: row.get("height")?,
        block_timestamp: row.get("block_timestamp")?,
    };
    tx.validate()?;
    Ok(tx)
}

fn byte_column(row: &Row<'_>, column: &str) -> Result<u8> {
    let value: i64 = row.get(column)?;
    u8::try_from(value)
        .map_err(|_| StoreError::validation(format!("{column} value {value} out of range")))
}

/// Transactions included in `block_id`, in the order they were stored.
pub fn find_block_transactions(conn: &Connection, block_id: u64) -> Result<Vec<Transaction>> {
    let query = query::transactions_for_block(block_id);
    let mut stmt = conn.prepare_cached(query.sql())?;
    let mut rows = stmt.query(params_from_iter(query.params()))?;
    let mut transactions = Vec::new();
    while let Some(row) = rows.next()? {
        transactions.push(load_transaction(conn, row)?);
    }
    Ok(transactions)
}

pub fn save_transactions(conn: &Connection, transactions: &[Transaction]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO \"transaction\" (id, full_hash, type, subtype, timestamp, deadline, sender_id,
             recipient_id, amount, fee, attachment, block_id, height, block_timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )?;
    for tx in transactions {
        let attachment = tx
            .attachment
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        stmt.execute(params![
            sql_id(tx.id),
            tx.full_hash.to_vec(),
            tx.tx_type,
            tx.subtype,
            tx.timestamp,
            tx.deadline,
            sql_id(tx.sender_id),
            tx.recipient_id.map(sql_id),
            tx.amount,
            tx.fee,
            attachment,
            sql_id(tx.block_id),
            tx.height,
            tx.block_timestamp,
        ])?;
    }
    Ok(())
}
