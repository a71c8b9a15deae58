//! Epoch schedule resolution.
//!
//! Maps a block height to its epoch number and an epoch to the network
//! topology that applies to it. Everything here is pure: no storage access.

use crate::error::{ExplorerError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Height of the first block of epoch 1 on mainnet. The genesis epoch is
/// longer than every later epoch.
pub const MAINNET_FIRST_EPOCH_BLOCK: u64 = 344_064;

/// Length of every post-genesis epoch on mainnet.
pub const MAINNET_BLOCKS_PER_EPOCH: u64 = 16_384;

pub const MAINNET_V1_EPOCH: u64 = 12;
pub const MAINNET_V1_1_EPOCH: u64 = 19;
pub const MAINNET_V1_2_EPOCH: u64 = 25;

static MAINNET: Lazy<EpochSchedule> = Lazy::new(|| EpochSchedule {
    first_epoch_block: MAINNET_FIRST_EPOCH_BLOCK,
    blocks_per_epoch: MAINNET_BLOCKS_PER_EPOCH,
    breakpoints: vec![
        (0, NetworkInstance::literal("v0", 4, 150)),
        (MAINNET_V1_EPOCH, NetworkInstance::literal("v1", 4, 152)),
        (MAINNET_V1_1_EPOCH, NetworkInstance::literal("v1.1", 4, 152)),
        (MAINNET_V1_2_EPOCH, NetworkInstance::literal("v1.2", 4, 152)),
    ],
});

/// Versioned network topology tied to one schedule breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInstance {
    pub version: String,
    pub num_shards: u32,
    pub nodes_per_shard: u32,
}

impl NetworkInstance {
    pub fn new(version: &str, num_shards: u32, nodes_per_shard: u32) -> Result<Self> {
        if num_shards == 0 {
            return Err(ExplorerError::Config(format!(
                "instance {} must have at least one shard",
                version
            )));
        }
        if nodes_per_shard == 0 {
            return Err(ExplorerError::Config(format!(
                "instance {} must have at least one node per shard",
                version
            )));
        }
        Ok(Self::literal(version, num_shards, nodes_per_shard))
    }

    fn literal(version: &str, num_shards: u32, nodes_per_shard: u32) -> Self {
        NetworkInstance {
            version: version.to_string(),
            num_shards,
            nodes_per_shard,
        }
    }

    pub fn num_nodes(&self) -> u64 {
        self.num_shards as u64 * self.nodes_per_shard as u64
    }
}

/// Sorted table of `(epoch threshold, instance)` plus the epoch length rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochSchedule {
    first_epoch_block: u64,
    blocks_per_epoch: u64,
    breakpoints: Vec<(u64, NetworkInstance)>,
}

impl EpochSchedule {
    /// Builds a schedule, rejecting empty tables, non-increasing thresholds
    /// and a zero epoch length.
    pub fn new(
        first_epoch_block: u64,
        blocks_per_epoch: u64,
        breakpoints: Vec<(u64, NetworkInstance)>,
    ) -> Result<Self> {
        if blocks_per_epoch == 0 {
            return Err(ExplorerError::Config(
                "blocks_per_epoch must be non-zero".to_string(),
            ));
        }
        if breakpoints.is_empty() {
            return Err(ExplorerError::Config(
                "schedule needs at least one breakpoint".to_string(),
            ));
        }
        for pair in breakpoints.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(ExplorerError::Config(format!(
                    "breakpoint epochs must be strictly increasing: {} follows {}",
                    pair[1].0, pair[0].0
                )));
            }
        }
        for (epoch, instance) in &breakpoints {
            if instance.num_shards == 0 || instance.nodes_per_shard == 0 {
                return Err(ExplorerError::Config(format!(
                    "breakpoint at epoch {} has an empty topology",
                    epoch
                )));
            }
        }

        Ok(EpochSchedule {
            first_epoch_block,
            blocks_per_epoch,
            breakpoints,
        })
    }

    pub fn mainnet() -> Self {
        MAINNET.clone()
    }

    pub fn first_epoch_block(&self) -> u64 {
        self.first_epoch_block
    }

    pub fn blocks_per_epoch(&self) -> u64 {
        self.blocks_per_epoch
    }

    pub fn breakpoints(&self) -> &[(u64, NetworkInstance)] {
        &self.breakpoints
    }

    /// Returns the most recent instance whose threshold is at or below `epoch`.
    ///
    /// Epochs below the smallest threshold have no topology and fail with
    /// [`ExplorerError::Config`].
    pub fn instance_for_epoch(&self, epoch: u64) -> Result<&NetworkInstance> {
        self.breakpoints
            .iter()
            .rev()
            .find(|(threshold, _)| *threshold <= epoch)
            .map(|(_, instance)| instance)
            .ok_or_else(|| {
                ExplorerError::Config(format!("no schedule breakpoint covers epoch {}", epoch))
            })
    }

    pub fn calc_epoch_number(&self, height: u64) -> u64 {
        if height < self.first_epoch_block {
            return 0;
        }
        (height - self.first_epoch_block) / self.blocks_per_epoch + 1
    }

    /// Height of the first block belonging to `epoch`.
    pub fn epoch_first_block(&self, epoch: u64) -> u64 {
        if epoch == 0 {
            return 0;
        }
        (epoch - 1)
            .saturating_mul(self.blocks_per_epoch)
            .saturating_add(self.first_epoch_block)
    }

    /// Height of the last block belonging to `epoch`.
    pub fn epoch_last_block(&self, epoch: u64) -> u64 {
        self.epoch_first_block(epoch.saturating_add(1))
            .saturating_sub(1)
    }

    pub fn is_last_block(&self, height: u64) -> bool {
        self.epoch_last_block(self.calc_epoch_number(height)) == height
    }
}

impl Default for EpochSchedule {
    fn default() -> Self {
        Self::mainnet()
    }
}
