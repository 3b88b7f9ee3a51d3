//! Transaction record stored alongside its block

use crate::block::{id_from_hash, Sha256Hash};
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_DEADLINE: i16 = 1440;

/// Transaction type codes. Subtypes are scoped to their type.
pub mod types {
    pub const PAYMENT: u8 = 0;
    pub const MESSAGING: u8 = 1;
    pub const COLORED_COINS: u8 = 2;
    pub const DIGITAL_GOODS: u8 = 3;
    pub const ACCOUNT_CONTROL: u8 = 4;
    pub const MINING: u8 = 20;
    pub const ADVANCED_PAYMENT: u8 = 21;
    pub const AUTOMATED_TRANSACTIONS: u8 = 22;

    pub const SUBTYPE_PAYMENT_ORDINARY: u8 = 0;
    pub const SUBTYPE_MESSAGING_ARBITRARY_MESSAGE: u8 = 0;

    pub fn name(tx_type: u8) -> &'static str {
        match tx_type {
            PAYMENT => "payment",
            MESSAGING => "messaging",
            COLORED_COINS => "colored coins",
            DIGITAL_GOODS => "digital goods",
            ACCOUNT_CONTROL => "account control",
            MINING => "mining",
            ADVANCED_PAYMENT => "advanced payment",
            AUTOMATED_TRANSACTIONS => "automated transactions",
            _ => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub full_hash: Sha256Hash,
    pub tx_type: u8,
    pub subtype: u8,
    pub timestamp: i32,
    pub deadline: i16,
    pub sender_id: u64,
    pub recipient_id: Option<u64>,
    pub amount: i64,
    pub fee: i64,
    pub attachment: Option<serde_json::Value>,
    /// Set when the transaction is included in a block.
    pub block_id: u64,
    pub height: i32,
    pub block_timestamp: i32,
}

impl Transaction {
    pub fn new(
        tx_type: u8,
        subtype: u8,
        sender_id: u64,
        recipient_id: Option<u64>,
        amount: i64,
        fee: i64,
        timestamp: i32,
    ) -> Self {
        let mut tx = Transaction {
            id: 0,
            full_hash: [0; 32],
            tx_type,
            subtype,
            timestamp,
            deadline: DEFAULT_DEADLINE,
            sender_id,
            recipient_id,
            amount,
            fee,
            attachment: None,
            block_id: 0,
            height: 0,
            block_timestamp: 0,
        };
        tx.rehash();
        tx
    }

    pub fn payment(sender_id: u64, recipient_id: u64, amount: i64, fee: i64, timestamp: i32) -> Self {
        Transaction::new(
            types::PAYMENT,
            types::SUBTYPE_PAYMENT_ORDINARY,
            sender_id,
            Some(recipient_id),
            amount,
            fee,
            timestamp,
        )
    }

    pub fn with_attachment(mut self, attachment: serde_json::Value) -> Self {
        self.attachment = Some(attachment);
        self.rehash();
        self
    }

    fn rehash(&mut self) {
        self.full_hash = self.calculate_full_hash();
        self.id = id_from_hash(&self.full_hash);
    }

    /// Hash over the signed fields; block placement is excluded.
    pub fn calculate_full_hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update([self.tx_type, self.subtype]);
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.deadline.to_le_bytes());
        hasher.update(self.sender_id.to_le_bytes());
        hasher.update(self.recipient_id.unwrap_or(0).to_le_bytes());
        hasher.update(self.amount.to_le_bytes());
        hasher.update(self.fee.to_le_bytes());
        if let Some(attachment) = &self.attachment {
            hasher.update(attachment.to_string().as_bytes());
        }
        hasher.finalize().into()
    }

    pub(crate) fn attach(&mut self, block_id: u64, height: i32, block_timestamp: i32) {
        self.block_id = block_id;
        self.height = height;
        self.block_timestamp = block_timestamp;
    }

    pub fn type_name(&self) -> &'static str {
        types::name(self.tx_type)
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.full_hash)
    }

    pub fn validate(&self) -> Result<()> {
        if self.calculate_full_hash() != self.full_hash {
            return Err(StoreError::validation(format!(
                "Full hash mismatch for transaction {}",
                self.id
            )));
        }
        if id_from_hash(&self.full_hash) != self.id {
            return Err(StoreError::validation(format!(
                "Transaction id {} does not match its full hash",
                self.id
            )));
        }
        Ok(())
    }
}
