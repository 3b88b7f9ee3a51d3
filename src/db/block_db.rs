//! Row mapping and persistence for blocks.

use crate::block::{Block, Sha256Hash};
use crate::db::query::{id_from_sql, sql_id};
use crate::db::transaction_db;
use crate::error::{Result, StoreError};
use rusqlite::{params, Connection, Row};
use tracing::debug;

/// Record mapper for `block` rows. Loads the block's transactions through `conn`.
pub fn load_block(conn: &Connection, row: &Row<'_>) -> Result<Block> {
    let payload_hash: Vec<u8> = row.get("payload_hash")?;
    let payload_hash: Sha256Hash = payload_hash.try_into().map_err(|bytes: Vec<u8>| {
        StoreError::validation(format!("payload_hash has {} bytes", bytes.len()))
    })?;

    let id = id_from_sql(row.get("id")?);
    let block = Block {
        id,
        version: row.get("version")?,
        timestamp: row.get("timestamp")?,
        previous_block_id: row.get::<_, Option<i64>>("previous_block_id")?.map(id_from_sql),
        height: row.get("height")?,
        generator_id: id_from_sql(row.get("generator_id")?),
        nonce: id_from_sql(row.get("nonce")?),
        total_amount: row.get("total_amount")?,
        total_fee: row.get("total_fee")?,
        payload_hash,
        transactions: transaction_db::find_block_transactions(conn, id)?,
    };
    block.validate()?;
    Ok(block)
}

/// Writes the block row and its transactions atomically.
pub fn save_block(conn: &Connection, block: &Block) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO block (id, version, timestamp, previous_block_id, height, generator_id,
             nonce, total_amount, total_fee, payload_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            sql_id(block.id),
            block.version,
            block.timestamp,
            block.previous_block_id.map(sql_id),
            block.height,
            sql_id(block.generator_id),
            sql_id(block.nonce),
            block.total_amount,
            block.total_fee,
            block.payload_hash.to_vec(),
        ],
    )?;
    transaction_db::save_transactions(&tx, &block.transactions)?;
    tx.commit()?;

    debug!(
        block = block.id,
        height = block.height,
        transactions = block.transactions.len(),
        "block saved"
    );
    Ok(())
}
