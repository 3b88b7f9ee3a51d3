//! chainstore - persistent block and transaction storage with streaming
//! chain-history queries
//!
//! # Architecture
//!
//! ## Chain Data
//! - [`block`] - Block structure and identity derivation
//! - [`transaction`] - Transaction record and type codes
//!
//! ## Persistence
//! - [`db`] - Connection pool, query construction, streaming cursors and
//!   the [`BlockchainStore`](db::BlockchainStore) API
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Chain Data
// ============================================================================
pub mod block;
pub mod transaction;

// ============================================================================
// Persistence
// ============================================================================
pub mod db;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use block::Block;
pub use db::{BlockchainStore, DbIterator, HistoryFilter, SqlBlockchainStore, Window};
pub use error::{Result, StoreError};
pub use transaction::Transaction;
