//! Key-value persistence for explorer data.
//!
//! The explorer core only ever reads through [`Storage`]. Writes go through
//! [`StorageWriter`] and are used by ingest tooling and tests.

use crate::address::Address;
use crate::block::Block;
use crate::committee::Committee;
use crate::error::{ExplorerError, Result};
use crate::transaction::{AddressRecord, TransactionView};
use parking_lot::RwLock;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Chain head height, stored as decimal text.
pub const BLOCK_HEIGHT_KEY: &str = "bh";
pub const BLOCK_PREFIX: &str = "b";
pub const COMMITTEE_PREFIX: &str = "cp";
pub const TX_PREFIX: &str = "tx";
pub const ADDRESS_PREFIX: &str = "ad";

/// Read-only view of a key-value store. Absent keys are
/// [`ExplorerError::NotFound`].
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;
}

pub trait StorageWriter: Storage {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
}

pub fn block_key(height: u64) -> String {
    format!("{}_{}", BLOCK_PREFIX, height)
}

pub fn committee_key(shard_id: u32, epoch: u64) -> String {
    format!("{}_{}_{}", COMMITTEE_PREFIX, shard_id, epoch)
}

/// Transaction ids are keyed in lowercase `0x` form.
pub fn tx_key(id: &str) -> String {
    let digits = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);
    format!("{}_0x{}", TX_PREFIX, digits.to_ascii_lowercase())
}

pub fn address_key(address: &Address) -> String {
    format!("{}_{}", ADDRESS_PREFIX, address.to_hex())
}

fn decode_record<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| ExplorerError::Decode(format!("Failed to decode {}: {}", what, e)))
}

fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(record)?)
}

pub fn read_block(store: &dyn Storage, height: u64) -> Result<Block> {
    let bytes = store.get(block_key(height).as_bytes())?;
    decode_record(&bytes, &format!("block {}", height))
}

pub fn read_committee(store: &dyn Storage, shard_id: u32, epoch: u64) -> Result<Committee> {
    let bytes = store.get(committee_key(shard_id, epoch).as_bytes())?;
    decode_record(
        &bytes,
        &format!("committee for shard {} epoch {}", shard_id, epoch),
    )
}

pub fn read_head_height(store: &dyn Storage) -> Result<u64> {
    let bytes = store.get(BLOCK_HEIGHT_KEY.as_bytes())?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|e| ExplorerError::Decode(format!("Chain head is not text: {}", e)))?;
    text.trim()
        .parse::<u64>()
        .map_err(|e| ExplorerError::Decode(format!("Chain head is not a height: {}", e)))
}

pub fn read_transaction(store: &dyn Storage, id: &str) -> Result<TransactionView> {
    let bytes = store.get(tx_key(id).as_bytes())?;
    decode_record(&bytes, &format!("transaction {}", id))
}

pub fn read_address(store: &dyn Storage, address: &Address) -> Result<AddressRecord> {
    let bytes = store.get(address_key(address).as_bytes())?;
    decode_record(&bytes, &format!("address {}", address))
}

pub fn write_block(store: &dyn StorageWriter, block: &Block) -> Result<()> {
    store.put(block_key(block.number()).as_bytes(), &encode_record(block)?)
}

pub fn write_committee(store: &dyn StorageWriter, committee: &Committee) -> Result<()> {
    store.put(
        committee_key(committee.shard_id, committee.epoch).as_bytes(),
        &encode_record(committee)?,
    )
}

pub fn write_head_height(store: &dyn StorageWriter, height: u64) -> Result<()> {
    store.put(BLOCK_HEIGHT_KEY.as_bytes(), height.to_string().as_bytes())
}

pub fn write_transaction(store: &dyn StorageWriter, tx: &TransactionView) -> Result<()> {
    store.put(tx_key(&tx.id).as_bytes(), &encode_record(tx)?)
}

pub fn write_address(
    store: &dyn StorageWriter,
    address: &Address,
    record: &AddressRecord,
) -> Result<()> {
    store.put(address_key(address).as_bytes(), &encode_record(record)?)
}

/// SQLite-backed store holding every record in one `kv` table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ExplorerError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key BLOB PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| ExplorerError::Database(format!("Failed to create kv table: {}", e)))?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ExplorerError::Database("Mutex poisoned".to_string()))
    }
}

impl Storage for SqliteStore {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let conn = self.lock()?;
        let value: Option<Vec<u8>> = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ExplorerError::Database(format!("Failed to read key: {}", e)))?;

        value.ok_or_else(|| ExplorerError::NotFound(String::from_utf8_lossy(key).into_owned()))
    }
}

impl StorageWriter for SqliteStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(|e| ExplorerError::Database(format!("Failed to write key: {}", e)))?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn remove(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.write().remove(key)
    }
}

impl Storage for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ExplorerError::NotFound(String::from_utf8_lossy(key).into_owned()))
    }
}

impl StorageWriter for MemoryStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committee::Validator;

    #[test]
    fn test_key_schema() {
        assert_eq!(block_key(42), "b_42");
        assert_eq!(committee_key(1, 7), "cp_1_7");
        assert_eq!(tx_key("0xABcd"), "tx_0xabcd");
        assert_eq!(tx_key("abcd"), "tx_0xabcd");
        assert_eq!(
            address_key(&Address([0u8; 20])),
            "ad_0x0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_memory_store_not_found() {
        let store = MemoryStore::new();
        assert!(store.get(b"missing").unwrap_err().is_not_found());
        assert!(matches!(read_block(&store, 3), Err(ExplorerError::NotFound(_))));
    }

    #[test]
    fn test_block_round_trip_and_decode_failure() {
        let store = MemoryStore::new();
        let block = Block::new(3, 0, 0, 100, [0u8; 32], vec![]);
        write_block(&store, &block).unwrap();
        assert_eq!(read_block(&store, 3).unwrap(), block);

        store.put(block_key(4).as_bytes(), &[0xde, 0xad]).unwrap();
        assert!(matches!(read_block(&store, 4), Err(ExplorerError::Decode(_))));
    }

    #[test]
    fn test_head_height() {
        let store = MemoryStore::new();
        assert!(read_head_height(&store).unwrap_err().is_not_found());
        write_head_height(&store, 1234).unwrap();
        assert_eq!(read_head_height(&store).unwrap(), 1234);
        store.put(BLOCK_HEIGHT_KEY.as_bytes(), b"tall").unwrap();
        assert!(matches!(read_head_height(&store), Err(ExplorerError::Decode(_))));
    }

    #[test]
    fn test_sqlite_store() {
        let store = SqliteStore::open(":memory:").unwrap();
        let committee = Committee {
            shard_id: 0,
            epoch: 2,
            validators: vec![Validator {
                ecdsa_address: Address([9u8; 20]),
                bls_public_key: vec![1u8; 48],
            }],
        };

        write_committee(&store, &committee).unwrap();
        assert_eq!(read_committee(&store, 0, 2).unwrap(), committee);
        assert!(read_committee(&store, 0, 3).unwrap_err().is_not_found());

        store.put(b"k", b"v1").unwrap();
        store.put(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"v2".to_vec());
    }
}
