//! Block window scanning.
//!
//! A scan of `[from, to]` reads one extra block on each side. The block
//! before the window links the first block back; the block after the window
//! carries the commit bitmap that says who signed the last one.

use crate::address::AddressCodec;
use crate::bitmap::{MaskDecoder, SignerDecoder};
use crate::block::Block;
use crate::committee::CommitteeResolver;
use crate::error::{ExplorerError, Result};
use crate::persistence::{read_block, Storage};
use crate::transaction::TransactionView;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Link to a neighboring block. Both fields are empty when the neighbor is
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefBlock {
    pub id: String,
    pub height: String,
}

impl RefBlock {
    pub fn empty() -> Self {
        RefBlock::default()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.height.is_empty()
    }

    fn to(block: &Block, height: u64) -> Self {
        RefBlock {
            id: block.hash_hex(),
            height: height.to_string(),
        }
    }
}

/// A block as served by the explorer, enriched with its signers and links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerBlock {
    pub id: String,
    pub height: String,
    pub epoch: u64,
    pub shard_id: u32,
    pub tx_count: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: String,
    pub tx_root: String,
    /// Seconds since the previous block, 0 when it is missing.
    pub block_time: i64,
    pub prev_block: RefBlock,
    pub next_block: RefBlock,
    pub txs: Vec<TransactionView>,
    pub signers: Vec<String>,
}

impl ExplorerBlock {
    fn new(block: &Block, height: u64) -> Self {
        ExplorerBlock {
            id: block.hash_hex(),
            height: height.to_string(),
            epoch: block.epoch(),
            shard_id: block.shard_id(),
            tx_count: block.transactions.len().to_string(),
            timestamp: block.time().saturating_mul(1000).to_string(),
            tx_root: format!("0x{}", hex::encode(block.header.tx_root)),
            block_time: 0,
            prev_block: RefBlock::empty(),
            next_block: RefBlock::empty(),
            txs: Vec::new(),
            signers: Vec::new(),
        }
    }
}

/// Slots reserved up front; longer windows grow as they are read.
const MAX_PREALLOCATED_SLOTS: usize = 4096;

/// Seconds from `prev` to `time`, clamped to the `i64` range.
fn time_delta(prev: u64, time: u64) -> i64 {
    (time as i128 - prev as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

pub struct BlockWindowScanner<'a> {
    store: &'a dyn Storage,
    shard_id: u32,
    codec: &'a dyn AddressCodec,
}

impl<'a> BlockWindowScanner<'a> {
    pub fn new(store: &'a dyn Storage, shard_id: u32, codec: &'a dyn AddressCodec) -> Self {
        BlockWindowScanner {
            store,
            shard_id,
            codec,
        }
    }

    /// Slots for heights `from - 1 ..= to + 1`. Heights below zero, missing
    /// blocks and undecodable blocks are `None`.
    pub fn read_blocks(&self, from: u64, to: u64) -> Vec<Option<Block>> {
        let never = AtomicBool::new(false);
        self.read_window(from, to, &never).unwrap_or_default()
    }

    /// Scans `[from, to]`. Never fails: problem blocks are skipped or left
    /// without signers. Callers bound the window; see
    /// [`crate::explorer::check_window`].
    pub fn scan(&self, from: u64, to: u64) -> Vec<ExplorerBlock> {
        let never = AtomicBool::new(false);
        self.scan_until(from, to, &never).unwrap_or_default()
    }

    /// Like [`BlockWindowScanner::scan`], abandoning the scan with
    /// [`ExplorerError::Cancelled`] once `cancelled` is set.
    pub fn scan_until(
        &self,
        from: u64,
        to: u64,
        cancelled: &AtomicBool,
    ) -> Result<Vec<ExplorerBlock>> {
        let slots = self.read_window(from, to, cancelled)?;
        let mut resolver = CommitteeResolver::new(self.store, self.shard_id);
        let decoder = MaskDecoder::new(self.codec);
        let mut blocks = Vec::with_capacity(slots.len().saturating_sub(2));

        for id in 1..slots.len().saturating_sub(1) {
            let height = from + (id as u64 - 1);
            if cancelled.load(Ordering::Relaxed) {
                return Err(ExplorerError::Cancelled(height));
            }
            let block = match &slots[id] {
                Some(block) => block,
                None => continue,
            };

            let mut enriched = ExplorerBlock::new(block, height);

            let committee = resolver.resolve(block.epoch(), &block.header);
            if let Some(next) = &slots[id + 1] {
                enriched.signers = match decoder.decode(&committee, next.last_commit_bitmap()) {
                    Ok(signers) => signers,
                    Err(e) => {
                        warn!(height, error = %e, "cannot decode signers from next block bitmap");
                        Vec::new()
                    }
                };
            }

            for tx in &block.transactions {
                match TransactionView::new(tx, block.time(), self.codec) {
                    Ok(view) => enriched.txs.push(view),
                    Err(e) => warn!(height, error = %e, "skipping transaction"),
                }
            }

            if let Some(prev) = &slots[id - 1] {
                enriched.block_time = time_delta(prev.time(), block.time());
                enriched.prev_block = RefBlock::to(prev, height.saturating_sub(1));
            }
            if let Some(next) = &slots[id + 1] {
                enriched.next_block = RefBlock::to(next, height.saturating_add(1));
            }

            blocks.push(enriched);
        }

        debug!(from, to, blocks = blocks.len(), "window scan complete");
        Ok(blocks)
    }

    fn read_window(
        &self,
        from: u64,
        to: u64,
        cancelled: &AtomicBool,
    ) -> Result<Vec<Option<Block>>> {
        let interior = to.checked_sub(from).map_or(0, |d| d.saturating_add(1));
        let capacity = usize::try_from(interior)
            .unwrap_or(usize::MAX)
            .min(MAX_PREALLOCATED_SLOTS);
        let mut slots = Vec::with_capacity(capacity.saturating_add(2));

        slots.push(from.checked_sub(1).and_then(|h| self.read_slot(h)));
        if to >= from {
            for height in from..=to {
                if cancelled.load(Ordering::Relaxed) {
                    return Err(ExplorerError::Cancelled(height));
                }
                slots.push(self.read_slot(height));
            }
        }
        slots.push(to.checked_add(1).and_then(|h| self.read_slot(h)));

        Ok(slots)
    }

    fn read_slot(&self, height: u64) -> Option<Block> {
        match read_block(self.store, height) {
            Ok(block) => Some(block),
            Err(ExplorerError::NotFound(_)) => None,
            Err(e) => {
                warn!(height, error = %e, "unreadable block, leaving slot empty");
                None
            }
        }
    }
}
