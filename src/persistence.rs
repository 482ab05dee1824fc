//! Storage backends for explorer data

use crate::config::DatabaseConfig;
use crate::error::{Result, StoreError};
use crate::model::{Account, Block, Transaction};
use crate::pagination::PageRequest;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Everything the HTTP layer needs from storage. Implementations provide their
/// own synchronisation; handlers call them concurrently.
///
/// Paged queries return the requested slice together with the number of
/// matching records across all pages.
pub trait Persistence: Send + Sync {
    /// The block at `height` and the current chain tip height.
    fn query_one_block(&self, height: i64) -> Result<(Block, i64)>;
    fn query_blocks(&self, page: &PageRequest) -> Result<(Vec<Block>, u64)>;
    fn add_block(&self, block: &Block) -> Result<()>;
    fn query_one_transaction(&self, hash: &str) -> Result<Transaction>;
    fn add_transaction(&self, tx: &Transaction) -> Result<()>;
    fn query_transactions_by_height(&self, height: i64) -> Result<Vec<Transaction>>;
    fn query_transactions(&self, page: &PageRequest) -> Result<(Vec<Transaction>, u64)>;
    fn query_transactions_by_account_name(
        &self,
        name: &str,
        page: &PageRequest,
    ) -> Result<(Vec<Transaction>, u64)>;
    fn query_accounts(&self, page: &PageRequest) -> Result<(Vec<Account>, u64)>;
    fn query_one_account(&self, name: &str) -> Result<Account>;
}

/// Converts a page into SQL `LIMIT`/`OFFSET` values, `None` when the offset
/// cannot be represented (such a page is always past the end).
fn limit_offset(page: &PageRequest) -> Option<(i64, i64)> {
    let offset = i64::try_from(page.offset()?).ok()?;
    let limit = i64::try_from(page.size()).unwrap_or(i64::MAX);
    Some((limit, offset))
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<Block> {
    Ok(Block {
        height: row.get(0)?,
        time_stamp: row.get(1)?,
        count_txs: row.get(2)?,
        hash: row.get(3)?,
        prev_hash: row.get(4)?,
        merkle_hash: row.get(5)?,
        state_hash: row.get(6)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        tx_type: row.get(0)?,
        time_stamp: row.get(1)?,
        block_height: row.get(2)?,
        hash: row.get(3)?,
        permission: row.get(4)?,
        tx_from: row.get(5)?,
        address: row.get(6)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let tx_count: i64 = row.get(3)?;
    Ok(Account {
        name: row.get(0)?,
        created_height: row.get(1)?,
        created_at: row.get(2)?,
        tx_count: tx_count as u64,
    })
}

const BLOCK_COLUMNS: &str =
    "height, time_stamp, count_txs, hash, prev_hash, merkle_hash, state_hash";
const TX_COLUMNS: &str = "tx_type, time_stamp, block_height, hash, permission, tx_from, address";
const ACCOUNT_SELECT: &str = "SELECT a.name, a.created_height, a.created_at,
        (SELECT COUNT(*) FROM transactions t WHERE t.tx_from = a.name OR t.address = a.name)
     FROM accounts a";

/// SQLite-backed store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the database at `path`; `":memory:"` gives a private
    /// in-process database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blocks (
                height INTEGER PRIMARY KEY,
                time_stamp INTEGER NOT NULL,
                count_txs INTEGER NOT NULL,
                hash TEXT NOT NULL,
                prev_hash TEXT NOT NULL,
                merkle_hash TEXT NOT NULL,
                state_hash TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_type INTEGER NOT NULL,
                time_stamp INTEGER NOT NULL,
                block_height INTEGER NOT NULL,
                hash TEXT NOT NULL UNIQUE,
                permission TEXT NOT NULL,
                tx_from TEXT NOT NULL,
                address TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS transactions_by_height ON transactions (block_height);
            CREATE INDEX IF NOT EXISTS transactions_by_from ON transactions (tx_from);
            CREATE INDEX IF NOT EXISTS transactions_by_address ON transactions (address);
            CREATE TABLE IF NOT EXISTS accounts (
                name TEXT PRIMARY KEY,
                created_height INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )
        .map_err(|e| StoreError::DatabaseError(format!("Failed to create tables: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn count(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<u64> {
        let count: i64 = conn.query_row(sql, args, |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl Persistence for Database {
    fn query_one_block(&self, height: i64) -> Result<(Block, i64)> {
        let conn = self.conn.lock()?;
        let block = conn
            .query_row(
                &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE height = ?1"),
                params![height],
                block_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("block at height {}", height)))?;
        let max_height: i64 =
            conn.query_row("SELECT MAX(height) FROM blocks", [], |row| row.get(0))?;
        Ok((block, max_height))
    }

    fn query_blocks(&self, page: &PageRequest) -> Result<(Vec<Block>, u64)> {
        let conn = self.conn.lock()?;
        let total = Self::count(&conn, "SELECT COUNT(*) FROM blocks", [])?;
        let Some((limit, offset)) = limit_offset(page) else {
            return Ok((Vec::new(), total));
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY height ASC LIMIT ?1 OFFSET ?2"
        ))?;
        let blocks = stmt
            .query_map(params![limit, offset], block_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((blocks, total))
    }

    fn add_block(&self, block: &Block) -> Result<()> {
        let conn = self.conn.lock()?;
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO blocks ({BLOCK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                block.height,
                block.time_stamp,
                block.count_txs,
                block.hash,
                block.prev_hash,
                block.merkle_hash,
                block.state_hash,
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(format!(
                "block at height {}",
                block.height
            )));
        }
        Ok(())
    }

    fn query_one_transaction(&self, hash: &str) -> Result<Transaction> {
        let conn = self.conn.lock()?;
        let tx = conn
            .query_row(
                &format!("SELECT {TX_COLUMNS} FROM transactions WHERE hash = ?1"),
                params![hash],
                transaction_from_row,
            )
            .optional()?;
        tx.ok_or_else(|| StoreError::NotFound(format!("transaction {}", hash)))
    }

    fn add_transaction(&self, tx: &Transaction) -> Result<()> {
        let conn = self.conn.lock()?;
        // The transaction row and the accounts it introduces land together.
        let db_tx = conn.unchecked_transaction()?;
        let inserted = db_tx.execute(
            &format!(
                "INSERT OR IGNORE INTO transactions ({TX_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                tx.tx_type,
                tx.time_stamp,
                tx.block_height,
                tx.hash,
                tx.permission,
                tx.tx_from,
                tx.address,
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(format!("transaction {}", tx.hash)));
        }
        for name in tx.account_names() {
            db_tx.execute(
                "INSERT OR IGNORE INTO accounts (name, created_height, created_at) VALUES (?1, ?2, ?3)",
                params![name, tx.block_height, tx.time_stamp],
            )?;
        }
        db_tx.commit()?;
        Ok(())
    }

    fn query_transactions_by_height(&self, height: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE block_height = ?1 ORDER BY id ASC"
        ))?;
        let txs = stmt
            .query_map(params![height], transaction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(txs)
    }

    fn query_transactions(&self, page: &PageRequest) -> Result<(Vec<Transaction>, u64)> {
        let conn = self.conn.lock()?;
        let total = Self::count(&conn, "SELECT COUNT(*) FROM transactions", [])?;
        let Some((limit, offset)) = limit_offset(page) else {
            return Ok((Vec::new(), total));
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_COLUMNS} FROM transactions
             ORDER BY block_height ASC, id ASC LIMIT ?1 OFFSET ?2"
        ))?;
        let txs = stmt
            .query_map(params![limit, offset], transaction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((txs, total))
    }

    fn query_transactions_by_account_name(
        &self,
        name: &str,
        page: &PageRequest,
    ) -> Result<(Vec<Transaction>, u64)> {
        let conn = self.conn.lock()?;
        let total = Self::count(
            &conn,
            "SELECT COUNT(*) FROM transactions WHERE ?1 <> '' AND (tx_from = ?1 OR address = ?1)",
            params![name],
        )?;
        let Some((limit, offset)) = limit_offset(page) else {
            return Ok((Vec::new(), total));
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE ?1 <> '' AND (tx_from = ?1 OR address = ?1)
             ORDER BY block_height ASC, id ASC LIMIT ?2 OFFSET ?3"
        ))?;
        let txs = stmt
            .query_map(params![name, limit, offset], transaction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((txs, total))
    }

    fn query_accounts(&self, page: &PageRequest) -> Result<(Vec<Account>, u64)> {
        let conn = self.conn.lock()?;
        let total = Self::count(&conn, "SELECT COUNT(*) FROM accounts", [])?;
        let Some((limit, offset)) = limit_offset(page) else {
            return Ok((Vec::new(), total));
        };
        let mut stmt = conn.prepare(&format!(
            "{ACCOUNT_SELECT} ORDER BY a.name ASC LIMIT ?1 OFFSET ?2"
        ))?;
        let accounts = stmt
            .query_map(params![limit, offset], account_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((accounts, total))
    }

    fn query_one_account(&self, name: &str) -> Result<Account> {
        let conn = self.conn.lock()?;
        let account = conn
            .query_row(
                &format!("{ACCOUNT_SELECT} WHERE a.name = ?1"),
                params![name],
                account_from_row,
            )
            .optional()?;
        account.ok_or_else(|| StoreError::NotFound(format!("account {}", name)))
    }
}

#[derive(Default)]
struct MemoryTables {
    /// Keyed by height, so iteration is in chain order.
    blocks: BTreeMap<i64, Block>,
    /// Insertion order.
    transactions: Vec<Transaction>,
    /// name -> (created_height, created_at)
    accounts: BTreeMap<String, (i64, i64)>,
}

impl MemoryTables {
    /// Transactions sorted the way the SQLite backend returns them.
    fn ordered_transactions(&self) -> Vec<&Transaction> {
        let mut txs: Vec<&Transaction> = self.transactions.iter().collect();
        // stable sort keeps insertion order within a height
        txs.sort_by_key(|tx| tx.block_height);
        txs
    }

    fn account(&self, name: &str, created: (i64, i64)) -> Account {
        Account {
            name: name.to_string(),
            created_height: created.0,
            created_at: created.1,
            tx_count: self.transactions.iter().filter(|tx| tx.involves(name)).count() as u64,
        }
    }
}

/// Simple in-memory store useful for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryPersistence {
    tables: Mutex<MemoryTables>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn query_one_block(&self, height: i64) -> Result<(Block, i64)> {
        let tables = self.tables.lock()?;
        let block = tables
            .blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("block at height {}", height)))?;
        let max_height = tables.blocks.keys().next_back().copied().unwrap_or(height);
        Ok((block, max_height))
    }

    fn query_blocks(&self, page: &PageRequest) -> Result<(Vec<Block>, u64)> {
        let tables = self.tables.lock()?;
        let blocks: Vec<&Block> = tables.blocks.values().collect();
        let slice = page.slice(&blocks).into_iter().cloned().collect();
        Ok((slice, blocks.len() as u64))
    }

    fn add_block(&self, block: &Block) -> Result<()> {
        let mut tables = self.tables.lock()?;
        if tables.blocks.contains_key(&block.height) {
            return Err(StoreError::AlreadyExists(format!(
                "block at height {}",
                block.height
            )));
        }
        tables.blocks.insert(block.height, block.clone());
        Ok(())
    }

    fn query_one_transaction(&self, hash: &str) -> Result<Transaction> {
        let tables = self.tables.lock()?;
        let tx = tables.transactions.iter().find(|tx| tx.hash == hash).cloned();
        tx.ok_or_else(|| StoreError::NotFound(format!("transaction {}", hash)))
    }

    fn add_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut tables = self.tables.lock()?;
        if tables.transactions.iter().any(|t| t.hash == tx.hash) {
            return Err(StoreError::AlreadyExists(format!("transaction {}", tx.hash)));
        }
        for name in tx.account_names() {
            tables
                .accounts
                .entry(name.to_string())
                .or_insert((tx.block_height, tx.time_stamp));
        }
        tables.transactions.push(tx.clone());
        Ok(())
    }

    fn query_transactions_by_height(&self, height: i64) -> Result<Vec<Transaction>> {
        let tables = self.tables.lock()?;
        let txs = tables
            .transactions
            .iter()
            .filter(|tx| tx.block_height == height)
            .cloned()
            .collect();
        Ok(txs)
    }

    fn query_transactions(&self, page: &PageRequest) -> Result<(Vec<Transaction>, u64)> {
        let tables = self.tables.lock()?;
        let txs = tables.ordered_transactions();
        let slice = page.slice(&txs).into_iter().cloned().collect();
        Ok((slice, txs.len() as u64))
    }

    fn query_transactions_by_account_name(
        &self,
        name: &str,
        page: &PageRequest,
    ) -> Result<(Vec<Transaction>, u64)> {
        let tables = self.tables.lock()?;
        let matching: Vec<&Transaction> = tables
            .ordered_transactions()
            .into_iter()
            .filter(|tx| tx.involves(name))
            .collect();
        let slice = page.slice(&matching).into_iter().cloned().collect();
        Ok((slice, matching.len() as u64))
    }

    fn query_accounts(&self, page: &PageRequest) -> Result<(Vec<Account>, u64)> {
        let tables = self.tables.lock()?;
        let entries: Vec<(&String, &(i64, i64))> = tables.accounts.iter().collect();
        let accounts = page
            .slice(&entries)
            .into_iter()
            .map(|(name, created)| tables.account(name, *created))
            .collect();
        Ok((accounts, entries.len() as u64))
    }

    fn query_one_account(&self, name: &str) -> Result<Account> {
        let tables = self.tables.lock()?;
        let account = tables
            .accounts
            .get(name)
            .map(|created| tables.account(name, *created));
        account.ok_or_else(|| StoreError::NotFound(format!("account {}", name)))
    }
}

/// Picks the backend named by `config`. A SQLite file that cannot be opened
/// falls back to in-memory storage with a warning; only failing to create the
/// data directory is an error.
pub fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn Persistence>> {
    if config.in_memory {
        info!("Using in-memory storage");
        return Ok(Arc::new(InMemoryPersistence::new()));
    }

    if let Some(parent) = Path::new(&config.path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to create data dir {:?}: {}", parent, e))
            })?;
        }
    }

    match Database::open(&config.path) {
        Ok(db) => {
            info!(path = %config.path, "Opened SQLite storage");
            Ok(Arc::new(db))
        }
        Err(e) => {
            warn!(
                "Failed to open DB at {}: {}. Falling back to in-memory storage.",
                config.path, e
            );
            Ok(Arc::new(InMemoryPersistence::new()))
        }
    }
}
