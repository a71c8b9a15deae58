//! Transactions and the lightweight views served to clients.

use crate::address::{Address, AddressCodec};
use crate::block::Sha256Hash;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Marks a transaction in an address record as incoming.
pub const RECEIVED: &str = "RECEIVED";
/// Marks a transaction in an address record as outgoing.
pub const SENT: &str = "SENT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub nonce: u64,
    pub shard_id: u32,
    pub to_shard_id: u32,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: u128,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub data: Vec<u8>,
}

impl Transaction {
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.shard_id.to_le_bytes());
        hasher.update(self.to_shard_id.to_le_bytes());
        hasher.update(self.from.as_bytes());
        match &self.to {
            Some(to) => {
                hasher.update([1u8]);
                hasher.update(to.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update(self.value.to_le_bytes());
        hasher.update(self.gas_limit.to_le_bytes());
        hasher.update(self.gas_price.to_le_bytes());
        hasher.update(&self.data);
        hasher.finalize().into()
    }

    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash()))
    }

    pub fn gas_fee(&self) -> u128 {
        self.gas_price.saturating_mul(self.gas_limit as u128)
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        bincode::serialized_size(self).map(|s| s as usize).unwrap_or(0)
    }
}

/// Display form of a transaction, as embedded in block and address responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: String,
    /// Milliseconds since the Unix epoch, as decimal text.
    pub timestamp: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub bytes: String,
    pub data: String,
    #[serde(rename = "gasFee")]
    pub gas_fee: String,
    #[serde(rename = "fromShard")]
    pub from_shard: u32,
    #[serde(rename = "toShard")]
    pub to_shard: u32,
    /// [`RECEIVED`], [`SENT`] or empty.
    #[serde(rename = "type")]
    pub kind: String,
}

impl TransactionView {
    /// Builds the view of `tx` included in a block produced at `block_time`
    /// seconds. Fails if either address cannot be encoded.
    pub fn new(tx: &Transaction, block_time: u64, codec: &dyn AddressCodec) -> Result<Self> {
        let from = codec.encode(&tx.from)?;
        let to = match &tx.to {
            Some(to) => codec.encode(to)?,
            None => String::new(),
        };

        Ok(TransactionView {
            id: tx.hash_hex(),
            timestamp: block_time.saturating_mul(1000).to_string(),
            from,
            to,
            value: tx.value.to_string(),
            bytes: tx.size().to_string(),
            data: hex::encode(&tx.data),
            gas_fee: tx.gas_fee().to_string(),
            from_shard: tx.shard_id,
            to_shard: tx.to_shard_id,
            kind: String::new(),
        })
    }
}

/// Indexed history of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: String,
    pub balance: String,
    #[serde(rename = "txs")]
    pub transactions: Vec<TransactionView>,
}
