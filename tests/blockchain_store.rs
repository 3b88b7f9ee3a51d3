//! Integration tests for block and transaction retrieval through the store

use chainstore::block::Block;
use chainstore::config::DatabaseConfig;
use chainstore::db::{BlockchainStore, HistoryFilter, Query, SqlBlockchainStore, Window, MAX_BLOCKS_AFTER};
use chainstore::error::StoreError;
use chainstore::transaction::Transaction;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Helper to open a store in a fresh temporary directory
fn open_store() -> Result<(TempDir, SqlBlockchainStore), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let mut config = DatabaseConfig::with_path(dir.path().join("chain.db").to_string_lossy());
    config.pool_size = 4;
    let store = SqlBlockchainStore::open(&config)?;
    Ok((dir, store))
}

/// Appends genesis plus `count` blocks. `generator(h)` picks the generator of height `h`.
fn build_chain(
    store: &SqlBlockchainStore,
    count: i32,
    generator: impl Fn(i32) -> u64,
) -> Result<Vec<Block>, Box<dyn std::error::Error>> {
    let mut blocks = vec![Block::genesis(generator(0), 0)];
    store.append_block(&blocks[0])?;
    for height in 1..=count {
        let block = Block::new(&blocks[blocks.len() - 1], generator(height), height * 60, 0, Vec::new());
        store.append_block(&block)?;
        blocks.push(block);
    }
    Ok(blocks)
}

fn ids(blocks: &[Block]) -> Vec<u64> {
    blocks.iter().map(|b| b.id).collect()
}

#[test]
fn test_append_then_read_tip() -> TestResult {
    let (_dir, store) = open_store()?;
    let genesis = Block::genesis(1, 0);
    let tx = Transaction::payment(11, 22, 500, 1, 30);
    let block = Block::new(&genesis, 2, 60, 7, vec![tx]);

    assert!(store.append_block(&genesis)?);
    assert!(store.append_block(&block)?);
    assert_eq!(store.height()?, 1);

    let mut tip = store.blocks_in_range(0, 0)?;
    assert!(tip.has_more());
    let first = tip.next()?;
    assert_eq!(first, block);
    assert_eq!(first.transactions.len(), 1);
    assert_eq!(first.transactions[0].block_id, block.id);

    let rest = tip.collect_all()?;
    assert_eq!(ids(&rest), vec![genesis.id]);
    assert_eq!(store.db().connections_in_use(), 0);
    Ok(())
}

#[test]
fn test_blocks_in_range_counts_back_from_tip() -> TestResult {
    let (_dir, store) = open_store()?;
    let blocks = build_chain(&store, 10, |_| 1)?;

    let range = store.blocks_in_range(2, 4)?.collect_all()?;
    let heights: Vec<i32> = range.iter().map(|b| b.height).collect();
    assert_eq!(heights, vec![8, 7, 6]);

    let everything = store.blocks_in_range(0, 0)?.collect_all()?;
    assert_eq!(everything.len(), blocks.len());
    assert_eq!(everything[0].height, 10);
    Ok(())
}

#[test]
fn test_blocks_by_account_newest_first() -> TestResult {
    let (_dir, store) = open_store()?;
    let generator = |h: i32| if h == 3 || h == 7 { 42 } else { 1 };
    build_chain(&store, 10, generator)?;

    let found = store.blocks_by_account(42, 0, Window::ALL)?.collect_all()?;
    let heights: Vec<i32> = found.iter().map(|b| b.height).collect();
    assert_eq!(heights, vec![7, 3]);

    let first_only = store.blocks_by_account(42, 0, Window::first(1)?)?.collect_all()?;
    assert_eq!(first_only.len(), 1);
    assert_eq!(first_only[0].height, 7);

    // Block at height 3 has timestamp 180, height 7 has 420.
    let recent = store.blocks_by_account(42, 300, Window::ALL)?.collect_all()?;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].height, 7);

    let skipped = store.blocks_by_account(42, 0, Window::new(1, None)?)?.collect_all()?;
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].height, 3);
    Ok(())
}

#[test]
fn test_history_sent_and_received_without_duplicates() -> TestResult {
    let (_dir, store) = open_store()?;
    let alice = 100;
    let bob = 200;

    let genesis = Block::genesis(1, 0);
    store.append_block(&genesis)?;

    let received = Transaction::payment(bob, alice, 10, 1, 50);
    let b1 = Block::new(&genesis, 1, 60, 0, vec![received.clone()]);
    store.append_block(&b1)?;

    let sent = Transaction::payment(alice, bob, 20, 1, 110);
    let b2 = Block::new(&b1, 1, 120, 0, vec![sent.clone()]);
    store.append_block(&b2)?;

    let to_self = Transaction::payment(alice, alice, 30, 1, 170);
    let b3 = Block::new(&b2, 1, 180, 0, vec![to_self.clone()]);
    store.append_block(&b3)?;

    let unrelated = Transaction::payment(bob, 300, 40, 1, 230);
    let b4 = Block::new(&b3, 1, 240, 0, vec![unrelated]);
    store.append_block(&b4)?;

    let history = store
        .transactions_for_account(alice, &HistoryFilter::default())?
        .collect_all()?;
    let history_ids: Vec<u64> = history.iter().map(|tx| tx.id).collect();
    assert_eq!(history_ids, vec![to_self.id, sent.id, received.id]);
    assert_eq!(history[0].block_id, b3.id);
    assert_eq!(history[0].height, 3);
    assert_eq!(store.db().connections_in_use(), 0);
    Ok(())
}

#[test]
fn test_history_filters() -> TestResult {
    let (_dir, store) = open_store()?;
    let alice = 100;

    let genesis = Block::genesis(1, 0);
    store.append_block(&genesis)?;
    let mut previous = genesis;
    let mut sent = Vec::new();
    for height in 1..=5 {
        let tx = Transaction::payment(alice, 200, i64::from(height), 1, height * 60 - 10);
        let block = Block::new(&previous, 1, height * 60, 0, vec![tx.clone()]);
        store.append_block(&block)?;
        sent.push(tx);
        previous = block;
    }

    // Two confirmations at height 5 leave heights 1 to 3.
    let filter = HistoryFilter {
        confirmations: 2,
        ..HistoryFilter::default()
    };
    let confirmed = store.transactions_for_account(alice, &filter)?.collect_all()?;
    let heights: Vec<i32> = confirmed.iter().map(|tx| tx.height).collect();
    assert_eq!(heights, vec![3, 2, 1]);

    let filter = HistoryFilter::from_raw(0, -1, -1, 180, 0, -1)?;
    let recent = store.transactions_for_account(alice, &filter)?.collect_all()?;
    assert_eq!(recent.len(), 3);

    let filter = HistoryFilter::from_raw(0, -1, -1, 0, 1, 2)?;
    let page = store.transactions_for_account(alice, &filter)?.collect_all()?;
    let heights: Vec<i32> = page.iter().map(|tx| tx.height).collect();
    assert_eq!(heights, vec![4, 3]);

    let filter = HistoryFilter::from_raw(0, 1, -1, 0, 0, -1)?;
    assert!(store.transactions_for_account(alice, &filter)?.collect_all()?.is_empty());
    let filter = HistoryFilter::from_raw(0, 0, 0, 0, 0, -1)?;
    assert_eq!(store.transactions_for_account(alice, &filter)?.collect_all()?.len(), 5);
    Ok(())
}

#[test]
fn test_confirmations_beyond_height_rejected() -> TestResult {
    let (_dir, store) = open_store()?;
    build_chain(&store, 50, |_| 1)?;

    let filter = HistoryFilter {
        confirmations: 100,
        ..HistoryFilter::default()
    };
    match store.transactions_for_account(1, &filter) {
        Err(StoreError::ConfirmationsExceedHeight { confirmations, height }) => {
            assert_eq!(confirmations, 100);
            assert_eq!(height, 50);
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("expected confirmations to be rejected"),
    }
    assert_eq!(store.db().connections_in_use(), 0);

    let err = HistoryFilter::from_raw(-1, -1, -1, 0, 0, -1).unwrap_err();
    assert!(err.is_input_error());
    Ok(())
}

#[test]
fn test_successors_capped() -> TestResult {
    let (_dir, store) = open_store()?;
    let blocks = build_chain(&store, 5, |_| 1)?;

    let err = store.blocks_after(blocks[0].id, MAX_BLOCKS_AFTER + 1).unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
    assert!(store.block_ids_after(blocks[0].id, 0).is_err());

    let after = store.blocks_after(blocks[2].id, 2)?;
    assert_eq!(ids(&after), ids(&blocks[3..5]));

    let after_ids = store.block_ids_after(blocks[2].id, MAX_BLOCKS_AFTER)?;
    assert_eq!(after_ids, ids(&blocks[3..]));
    Ok(())
}

#[test]
fn test_unknown_block_and_tip_both_have_no_successors() -> TestResult {
    let (_dir, store) = open_store()?;
    let blocks = build_chain(&store, 3, |_| 1)?;
    let tip = &blocks[3];

    assert!(store.block_ids_after(tip.id, 10)?.is_empty());
    assert!(store.block_ids_after(999, 10)?.is_empty());
    assert!(store.has_block(tip.id)?);
    assert!(!store.has_block(999)?);

    assert_eq!(store.block(tip.id)?, Some(tip.clone()));
    assert_eq!(store.block(999)?, None);
    Ok(())
}

#[test]
fn test_second_iteration_rejected() -> TestResult {
    let (_dir, store) = open_store()?;
    build_chain(&store, 3, |_| 1)?;

    let mut blocks = store.all_blocks()?;
    let heights: Vec<i32> = blocks.iter()?.map(|b| b.map(|b| b.height)).collect::<Result<_, _>>()?;
    assert_eq!(heights, vec![0, 1, 2, 3]);
    assert!(matches!(blocks.iter(), Err(StoreError::AlreadyIterated)));
    Ok(())
}

#[test]
fn test_close_early_releases_connection() -> TestResult {
    let (_dir, store) = open_store()?;
    build_chain(&store, 5, |_| 1)?;

    let mut blocks = store.all_blocks()?;
    assert_eq!(blocks.next()?.height, 0);
    assert_eq!(store.db().connections_in_use(), 1);

    blocks.close();
    assert_eq!(store.db().connections_in_use(), 0);
    assert!(!blocks.has_more());
    blocks.close();
    assert!(blocks.is_closed());

    {
        let mut dropped = store.all_transactions()?;
        assert!(!dropped.is_closed());
    }
    assert_eq!(store.db().connections_in_use(), 0);
    Ok(())
}

#[test]
fn test_empty_result_releases_connection() -> TestResult {
    let (_dir, store) = open_store()?;
    build_chain(&store, 2, |_| 1)?;

    let mut none = store.blocks_by_account(77, 0, Window::ALL)?;
    assert!(!none.has_more());
    assert_eq!(store.db().connections_in_use(), 0);
    assert!(matches!(none.next(), Err(StoreError::Exhausted)));
    Ok(())
}

#[test]
fn test_corrupted_row_fails_and_releases() -> TestResult {
    let (_dir, store) = open_store()?;
    build_chain(&store, 4, |_| 1)?;

    {
        let conn = store.connection()?;
        conn.execute("UPDATE block SET payload_hash = X'00' WHERE height = 2", [])?;
    }

    let mut blocks = store.blocks_in_range(0, 0)?;
    assert_eq!(blocks.next()?.height, 4);
    assert_eq!(blocks.next()?.height, 3);
    assert!(matches!(blocks.next(), Err(StoreError::Validation(_))));
    assert!(blocks.is_closed());
    assert_eq!(store.db().connections_in_use(), 0);
    Ok(())
}

#[test]
fn test_transaction_count_and_listing() -> TestResult {
    let (_dir, store) = open_store()?;
    let genesis = Block::genesis(1, 0);
    store.append_block(&genesis)?;
    let txs = vec![
        Transaction::payment(1, 2, 5, 1, 10),
        Transaction::payment(2, 3, 6, 1, 11),
        Transaction::payment(3, 1, 7, 1, 12),
    ];
    let block = Block::new(&genesis, 1, 60, 0, txs.clone());
    store.append_block(&block)?;

    assert_eq!(store.transaction_count()?, 3);
    let listed = store.all_transactions()?.collect_all()?;
    let listed_ids: Vec<u64> = listed.iter().map(|tx| tx.id).collect();
    let expected: Vec<u64> = txs.iter().map(|tx| tx.id).collect();
    assert_eq!(listed_ids, expected);
    Ok(())
}

#[test]
fn test_duplicate_block_rolls_back() -> TestResult {
    let (_dir, store) = open_store()?;
    let genesis = Block::genesis(1, 0);
    store.append_block(&genesis)?;
    let block = Block::new(&genesis, 1, 60, 0, vec![Transaction::payment(1, 2, 5, 1, 10)]);
    store.append_block(&block)?;

    assert!(store.append_block(&block).is_err());
    assert_eq!(store.transaction_count()?, 1);
    assert_eq!(store.all_blocks()?.collect_all()?.len(), 2);
    Ok(())
}

#[test]
fn test_caller_built_query() -> TestResult {
    let (_dir, store) = open_store()?;
    build_chain(&store, 6, |_| 1)?;

    let query = Query::new("SELECT * FROM block WHERE height % 2 = ? ORDER BY height ASC").bind(1i64);
    let odd = store.blocks(store.connection()?, query)?.collect_all()?;
    let heights: Vec<i32> = odd.iter().map(|b| b.height).collect();
    assert_eq!(heights, vec![1, 3, 5]);
    assert_eq!(store.db().connections_in_use(), 0);
    Ok(())
}

#[test]
fn test_injected_height_drives_range() -> TestResult {
    let (_dir, store) = open_store()?;
    build_chain(&store, 10, |_| 1)?;

    let store = store.with_height_source(|| -> chainstore::Result<i32> { Ok(5) });
    let heights: Vec<i32> = store
        .blocks_in_range(0, 2)?
        .collect_all()?
        .iter()
        .map(|b| b.height)
        .collect();
    assert_eq!(heights, vec![5, 4, 3]);
    Ok(())
}
