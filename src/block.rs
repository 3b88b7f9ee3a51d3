//! Block structure and identity derivation

use crate::error::{Result, StoreError};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type Sha256Hash = [u8; 32];

pub const BLOCK_VERSION: i32 = 3;

/// Chain timestamps count seconds from this Unix time.
pub const EPOCH_BEGINNING: i64 = 1_407_722_400;

pub fn epoch_to_unix(timestamp: i32) -> i64 {
    EPOCH_BEGINNING + i64::from(timestamp)
}

/// Derives the 64-bit identity of an object from its full hash.
pub fn id_from_hash(hash: &Sha256Hash) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(bytes)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: u64,
    pub version: i32,
    pub timestamp: i32,
    pub previous_block_id: Option<u64>,
    pub height: i32,
    pub generator_id: u64,
    pub nonce: u64,
    pub total_amount: i64,
    pub total_fee: i64,
    pub payload_hash: Sha256Hash,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn genesis(generator_id: u64, timestamp: i32) -> Self {
        Self::assemble(None, 0, generator_id, timestamp, 0, Vec::new())
    }

    /// Builds the successor of `previous`, taking ownership of `transactions`.
    pub fn new(
        previous: &Block,
        generator_id: u64,
        timestamp: i32,
        nonce: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self::assemble(
            Some(previous.id),
            previous.height + 1,
            generator_id,
            timestamp,
            nonce,
            transactions,
        )
    }

    fn assemble(
        previous_block_id: Option<u64>,
        height: i32,
        generator_id: u64,
        timestamp: i32,
        nonce: u64,
        mut transactions: Vec<Transaction>,
    ) -> Self {
        let total_amount = transactions.iter().map(|tx| tx.amount).sum();
        let total_fee = transactions.iter().map(|tx| tx.fee).sum();
        let payload_hash = Block::calculate_payload_hash(&transactions);

        let mut block = Block {
            id: 0,
            version: BLOCK_VERSION,
            timestamp,
            previous_block_id,
            height,
            generator_id,
            nonce,
            total_amount,
            total_fee,
            payload_hash,
            transactions: Vec::new(),
        };
        block.id = id_from_hash(&block.hash());

        for tx in transactions.iter_mut() {
            tx.attach(block.id, height, timestamp);
        }
        block.transactions = transactions;
        block
    }

    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.previous_block_id.unwrap_or(0).to_le_bytes());
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.generator_id.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.total_amount.to_le_bytes());
        hasher.update(self.total_fee.to_le_bytes());
        hasher.update(self.payload_hash);
        hasher.finalize().into()
    }

    pub fn calculate_payload_hash(transactions: &[Transaction]) -> Sha256Hash {
        let mut hasher = Sha256::new();
        for tx in transactions {
            hasher.update(tx.full_hash);
        }
        hasher.finalize().into()
    }

    pub fn string_id(&self) -> String {
        self.id.to_string()
    }

    /// Checks that the stored identity and payload still match the block contents.
    pub fn validate(&self) -> Result<()> {
        if self.height < 0 {
            return Err(StoreError::validation(format!(
                "Block {} has negative height {}",
                self.id, self.height
            )));
        }
        let computed_id = id_from_hash(&self.hash());
        if computed_id != self.id {
            return Err(StoreError::validation(format!(
                "Block id mismatch: stored {} computed {}",
                self.id, computed_id
            )));
        }
        if Block::calculate_payload_hash(&self.transactions) != self.payload_hash {
            return Err(StoreError::validation(format!(
                "Payload hash mismatch for block {}",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_chain_links() {
        let genesis = Block::genesis(1, 0);
        let tx = Transaction::payment(7, 8, 100, 1, 10);
        let block = Block::new(&genesis, 2, 60, 42, vec![tx]);

        assert_eq!(genesis.height, 0);
        assert_eq!(block.height, 1);
        assert_eq!(block.previous_block_id, Some(genesis.id));
        assert_eq!(block.total_amount, 100);
        assert_eq!(block.total_fee, 1);
        assert_eq!(block.transactions[0].block_id, block.id);
        assert_eq!(block.transactions[0].block_timestamp, 60);
        assert!(block.validate().is_ok());
    }

    #[test]
    fn test_tampered_block_fails_validation() {
        let genesis = Block::genesis(1, 0);
        let mut block = Block::new(&genesis, 2, 60, 0, Vec::new());
        block.generator_id = 3;
        assert!(matches!(block.validate(), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_id_from_hash_is_little_endian() {
        let mut hash = [0u8; 32];
        hash[0] = 1;
        assert_eq!(id_from_hash(&hash), 1);
    }
}
