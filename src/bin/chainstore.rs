#![forbid(unsafe_code)]
//! Query blocks and transaction history from the chain store

use chainstore::block::{epoch_to_unix, Block};
use chainstore::config::{load_config, DEFAULT_CONFIG_FILE};
use chainstore::db::{BlockchainStore, DbIterator, HistoryFilter, SqlBlockchainStore, Window};
use chainstore::transaction::Transaction;
use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Database file, overriding database.path from the configuration
    #[arg(long)]
    db: Option<String>,
    /// Print one JSON document per line instead of a table
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints the current chain height
    Height,
    /// Prints the number of stored transactions
    Count,
    /// Lists blocks counted back from the tip, highest first
    Blocks {
        #[arg(long, default_value_t = 0)]
        from: u32,
        /// 0 reaches down to genesis
        #[arg(long, default_value_t = 0)]
        to: u32,
    },
    /// Lists blocks generated by an account, newest first
    AccountBlocks {
        account: u64,
        #[arg(long, default_value_t = 0)]
        timestamp: i32,
        #[arg(long, default_value_t = 0)]
        from: i32,
        /// Negative for no upper bound
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        to: i32,
    },
    /// Lists blocks stored after the given block
    After {
        block_id: u64,
        #[arg(long, default_value_t = 100)]
        limit: u32,
        #[arg(long)]
        ids_only: bool,
    },
    /// Shows the transactions sent or received by an account, newest first
    History {
        account: u64,
        #[arg(long, default_value_t = 0)]
        confirmations: i32,
        #[arg(long = "type", default_value_t = -1, allow_negative_numbers = true)]
        tx_type: i32,
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        subtype: i32,
        #[arg(long, default_value_t = 0)]
        timestamp: i32,
        #[arg(long, default_value_t = 0)]
        from: i32,
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        to: i32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(path) = &cli.db {
        config.database.path = path.clone();
    }
    let store = SqlBlockchainStore::open(&config.database)?;

    match cli.command {
        Commands::Height => println!("{}", store.height()?),
        Commands::Count => println!("{}", store.transaction_count()?),
        Commands::Blocks { from, to } => {
            print_blocks(store.blocks_in_range(from, to)?, cli.json)?;
        }
        Commands::AccountBlocks {
            account,
            timestamp,
            from,
            to,
        } => {
            let window = Window::from_indices(from, to)?;
            print_blocks(store.blocks_by_account(account, timestamp, window)?, cli.json)?;
        }
        Commands::After {
            block_id,
            limit,
            ids_only,
        } => {
            if ids_only {
                let ids = store.block_ids_after(block_id, limit)?;
                if is_unknown_block(&store, block_id, ids.is_empty())? {
                    report_missing_block(block_id);
                }
                for id in ids {
                    println!("{}", id);
                }
            } else {
                let blocks = store.blocks_after(block_id, limit)?;
                if is_unknown_block(&store, block_id, blocks.is_empty())? {
                    report_missing_block(block_id);
                }
                print_block_list(&blocks, cli.json)?;
            }
        }
        Commands::History {
            account,
            confirmations,
            tx_type,
            subtype,
            timestamp,
            from,
            to,
        } => {
            let filter = HistoryFilter::from_raw(confirmations, tx_type, subtype, timestamp, from, to)?;
            let transactions = store.transactions_for_account(account, &filter)?;
            print_history(account, transactions, cli.json)?;
        }
    }

    Ok(())
}

/// An empty successor list means either an unknown id or the tip.
fn is_unknown_block(
    store: &impl BlockchainStore,
    block_id: u64,
    no_successors: bool,
) -> chainstore::Result<bool> {
    Ok(no_successors && !store.has_block(block_id)?)
}

fn report_missing_block(block_id: u64) {
    eprintln!("{}", format!("Block {} not found", block_id).red());
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).fg(TableColor::Cyan).add_attribute(Attribute::Bold))
        .collect()
}

fn new_table(titles: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(titles));
    table
}

const BLOCK_COLUMNS: &[&str] = &["Height", "Id", "Generator", "Txs", "Amount", "Fee", "Date"];

fn block_row(block: &Block) -> Vec<Cell> {
    vec![
        Cell::new(format!("#{}", block.height)).fg(TableColor::White),
        Cell::new(block.string_id()).fg(TableColor::Yellow),
        Cell::new(block.generator_id).fg(TableColor::White),
        Cell::new(block.transactions.len()).fg(TableColor::White),
        Cell::new(block.total_amount).fg(TableColor::Green),
        Cell::new(block.total_fee).fg(TableColor::Grey),
        Cell::new(format_timestamp_short(block.timestamp)).fg(TableColor::Grey),
    ]
}

fn print_blocks(mut blocks: DbIterator<Block>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut table = new_table(BLOCK_COLUMNS);
    let mut count = 0;
    for block in blocks.iter()? {
        let block = block?;
        if json {
            println!("{}", serde_json::to_string(&block)?);
        } else {
            table.add_row(block_row(&block));
        }
        count += 1;
    }
    finish_table(table, count, json, "No blocks found");
    Ok(())
}

fn print_block_list(blocks: &[Block], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut table = new_table(BLOCK_COLUMNS);
    for block in blocks {
        if json {
            println!("{}", serde_json::to_string(block)?);
        } else {
            table.add_row(block_row(block));
        }
    }
    finish_table(table, blocks.len(), json, "No blocks found");
    Ok(())
}

fn print_history(
    account: u64,
    mut transactions: DbIterator<Transaction>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut table = new_table(&["Block", "Id", "Hash", "Type", "Direction", "Counterparty", "Amount", "Date"]);
    let mut count = 0;
    for tx in transactions.iter()? {
        let tx = tx?;
        count += 1;
        if json {
            println!("{}", serde_json::to_string(&tx)?);
            continue;
        }

        let (direction, counterparty, color) = if tx.sender_id == account {
            match tx.recipient_id {
                Some(recipient) if recipient == account => ("Self", String::new(), TableColor::Yellow),
                Some(recipient) => ("Sent", recipient.to_string(), TableColor::Red),
                None => ("Sent", String::new(), TableColor::Red),
            }
        } else {
            ("Received", tx.sender_id.to_string(), TableColor::Green)
        };

        table.add_row(vec![
            Cell::new(format!("#{}", tx.height)).fg(TableColor::White),
            Cell::new(tx.id).fg(TableColor::Yellow),
            Cell::new(short_hash(&tx)).fg(TableColor::Grey),
            Cell::new(tx.type_name()).fg(TableColor::White),
            Cell::new(direction).fg(color),
            Cell::new(counterparty).fg(TableColor::White),
            Cell::new(tx.amount).fg(color),
            Cell::new(format_timestamp_short(tx.block_timestamp)).fg(TableColor::Grey),
        ]);
    }
    finish_table(table, count, json, "No transactions found");
    Ok(())
}

fn short_hash(tx: &Transaction) -> String {
    let mut hash = tx.hash_str();
    hash.truncate(16);
    hash
}

fn finish_table(table: Table, rows: usize, json: bool, empty_message: &str) {
    if json {
        return;
    }
    if rows == 0 {
        println!("{}", empty_message.yellow());
        return;
    }
    println!("{}", table);
    println!("{}", format!("{} row(s)", rows).bright_blue());
}

fn format_timestamp_short(timestamp: i32) -> String {
    use chrono::DateTime;

    if let Some(dt) = DateTime::from_timestamp(epoch_to_unix(timestamp), 0) {
        dt.format("%Y-%m-%d %H:%M").to_string()
    } else {
        "Invalid".to_string()
    }
}
