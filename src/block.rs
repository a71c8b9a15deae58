//! Raw block and header types as persisted by the chain node.

use crate::committee::{Committee, ShardState};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type Sha256Hash = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub epoch: u64,
    pub shard_id: u32,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub parent_hash: Sha256Hash,
    pub tx_root: Sha256Hash,
    /// Committees for the shards, present on epoch transition headers.
    pub shard_state: Option<ShardState>,
    /// Which members of the committee signed the commit for the PREVIOUS
    /// block. Bit i refers to committee position i.
    pub last_commit_bitmap: Vec<u8>,
}

impl BlockHeader {
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.number.to_le_bytes());
        hasher.update(self.epoch.to_le_bytes());
        hasher.update(self.shard_id.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.parent_hash);
        hasher.update(self.tx_root);
        match &self.shard_state {
            Some(state) => {
                hasher.update([1u8]);
                hasher.update((state.len() as u64).to_le_bytes());
                for committee in state {
                    committee.hash_into(&mut hasher);
                }
            }
            None => hasher.update([0u8]),
        }
        hasher.update((self.last_commit_bitmap.len() as u64).to_le_bytes());
        hasher.update(&self.last_commit_bitmap);
        hasher.finalize().into()
    }

    pub fn shard_state(&self) -> Option<&ShardState> {
        self.shard_state.as_ref()
    }

    /// The committee for `shard_id` in the embedded shard state, if any.
    pub fn committee_for_shard(&self, shard_id: u32) -> Option<&Committee> {
        self.shard_state
            .as_ref()?
            .iter()
            .find(|committee| committee.shard_id == shard_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        number: u64,
        epoch: u64,
        shard_id: u32,
        timestamp: u64,
        parent_hash: Sha256Hash,
        transactions: Vec<Transaction>,
    ) -> Self {
        let tx_root = Block::calculate_tx_root(&transactions);
        Block {
            header: BlockHeader {
                number,
                epoch,
                shard_id,
                timestamp,
                parent_hash,
                tx_root,
                shard_state: None,
                last_commit_bitmap: Vec::new(),
            },
            transactions,
        }
    }

    pub fn with_shard_state(mut self, state: ShardState) -> Self {
        self.header.shard_state = Some(state);
        self
    }

    pub fn with_last_commit_bitmap(mut self, bitmap: Vec<u8>) -> Self {
        self.header.last_commit_bitmap = bitmap;
        self
    }

    pub fn hash(&self) -> Sha256Hash {
        self.header.hash()
    }

    /// `0x`-prefixed hex of the header hash.
    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash()))
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn epoch(&self) -> u64 {
        self.header.epoch
    }

    pub fn shard_id(&self) -> u32 {
        self.header.shard_id
    }

    pub fn time(&self) -> u64 {
        self.header.timestamp
    }

    pub fn last_commit_bitmap(&self) -> &[u8] {
        &self.header.last_commit_bitmap
    }

    pub fn calculate_tx_root(transactions: &[Transaction]) -> Sha256Hash {
        let mut hasher = Sha256::new();
        for tx in transactions {
            hasher.update(tx.hash());
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::committee::Validator;

    fn committee(shard_id: u32) -> Committee {
        Committee {
            shard_id,
            epoch: 3,
            validators: vec![Validator {
                ecdsa_address: Address([shard_id as u8; 20]),
                bls_public_key: vec![shard_id as u8; 48],
            }],
        }
    }

    #[test]
    fn test_hash_covers_bitmap_and_shard_state() {
        let base = Block::new(5, 0, 0, 1_000, [0u8; 32], vec![]);
        let with_bitmap = base.clone().with_last_commit_bitmap(vec![0b0000_0011]);
        let with_state = base.clone().with_shard_state(vec![committee(0)]);

        assert_ne!(base.hash(), with_bitmap.hash());
        assert_ne!(base.hash(), with_state.hash());
        assert_eq!(base.hash(), base.clone().hash());
        assert!(base.hash_hex().starts_with("0x"));
        assert_eq!(base.hash_hex().len(), 66);
    }

    #[test]
    fn test_committee_for_shard() {
        let block = Block::new(1, 1, 0, 0, [0u8; 32], vec![])
            .with_shard_state(vec![committee(0), committee(1)]);

        assert_eq!(block.header.committee_for_shard(1).unwrap().shard_id, 1);
        assert!(block.header.committee_for_shard(2).is_none());

        let bare = Block::new(1, 1, 0, 0, [0u8; 32], vec![]);
        assert!(bare.header.committee_for_shard(0).is_none());
    }
}
