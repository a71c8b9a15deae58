//! Committees and their epoch-scoped resolution.
//!
//! A committee is looked up first as a persisted record keyed by
//! `(shard, epoch)`, then in the shard state embedded in a block header. When
//! neither has it the result is an empty committee, never an error.

use crate::address::Address;
use crate::block::BlockHeader;
use crate::error::{ExplorerError, Result};
use crate::persistence::{read_committee, Storage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use tracing::{debug, warn};

pub const BLS_PUBLIC_KEY_LENGTH: usize = 48;

/// Serialized BLS public key of a committee member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlsPublicKey([u8; BLS_PUBLIC_KEY_LENGTH]);

impl BlsPublicKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; BLS_PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            ExplorerError::Decode(format!(
                "BLS public key must be {} bytes, got {}",
                BLS_PUBLIC_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(BlsPublicKey(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub ecdsa_address: Address,
    /// Kept in serialized form; parsed on demand by [`Validator::public_key`].
    pub bls_public_key: Vec<u8>,
}

impl Validator {
    pub fn public_key(&self) -> Result<BlsPublicKey> {
        BlsPublicKey::from_slice(&self.bls_public_key)
    }
}

/// Ordered validator list for one shard and epoch. Position i is bit i of
/// any commit bitmap produced by this committee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committee {
    pub shard_id: u32,
    pub epoch: u64,
    pub validators: Vec<Validator>,
}

/// Committees of every shard, as embedded in an epoch transition header.
pub type ShardState = Vec<Committee>;

impl Committee {
    pub fn empty(shard_id: u32, epoch: u64) -> Self {
        Committee {
            shard_id,
            epoch,
            validators: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Public keys in committee order. Fails on the first malformed key.
    pub fn public_keys(&self) -> Result<Vec<BlsPublicKey>> {
        self.validators.iter().map(Validator::public_key).collect()
    }

    pub(crate) fn hash_into(&self, hasher: &mut Sha256) {
        hasher.update(self.shard_id.to_le_bytes());
        hasher.update(self.epoch.to_le_bytes());
        hasher.update((self.validators.len() as u64).to_le_bytes());
        for validator in &self.validators {
            hasher.update(validator.ecdsa_address.as_bytes());
            hasher.update((validator.bls_public_key.len() as u64).to_le_bytes());
            hasher.update(&validator.bls_public_key);
        }
    }
}

/// Which tier produced a committee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitteeSource {
    Persisted,
    ShardState,
    Empty,
}

/// Two-tier committee lookup without caching.
///
/// `fallbacks` are consulted in order; the first header whose shard state has
/// an entry for `shard_id` wins.
pub fn resolve_committee<'h, I>(
    store: &dyn Storage,
    shard_id: u32,
    epoch: u64,
    fallbacks: I,
) -> (Committee, CommitteeSource)
where
    I: IntoIterator<Item = &'h BlockHeader>,
{
    match read_committee(store, shard_id, epoch) {
        Ok(committee) => return (committee, CommitteeSource::Persisted),
        Err(ExplorerError::NotFound(_)) => {
            debug!(shard_id, epoch, "no persisted committee, using header shard state");
        }
        Err(e) => {
            warn!(shard_id, epoch, error = %e, "cannot read committee for new epoch");
        }
    }

    for header in fallbacks {
        if let Some(committee) = header.committee_for_shard(shard_id) {
            return (committee.clone(), CommitteeSource::ShardState);
        }
    }

    (Committee::empty(shard_id, epoch), CommitteeSource::Empty)
}

/// Committee lookup memoized for the lifetime of one window scan.
///
/// Blocks are expected in non-decreasing epoch order. The committee is
/// re-resolved only when the epoch moves past the cached one.
pub struct CommitteeResolver<'a> {
    store: &'a dyn Storage,
    shard_id: u32,
    cached: Option<(u64, Committee)>,
}

impl<'a> CommitteeResolver<'a> {
    pub fn new(store: &'a dyn Storage, shard_id: u32) -> Self {
        CommitteeResolver {
            store,
            shard_id,
            cached: None,
        }
    }

    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    pub fn cached_epoch(&self) -> Option<u64> {
        self.cached.as_ref().map(|(epoch, _)| *epoch)
    }

    /// Committee for `epoch`, with `header` as the shard-state fallback.
    ///
    /// An epoch below the cached one is resolved on its own and leaves the
    /// cache untouched.
    pub fn resolve(&mut self, epoch: u64, header: &BlockHeader) -> Cow<'_, Committee> {
        match self.cached_epoch() {
            Some(cached) if epoch < cached => {
                warn!(
                    epoch,
                    cached_epoch = cached,
                    "epoch went backwards within a scan, resolving without cache"
                );
                let (committee, _) = resolve_committee(self.store, self.shard_id, epoch, [header]);
                return Cow::Owned(committee);
            }
            Some(cached) if epoch > cached => self.cached = None,
            _ => {}
        }

        let (store, shard_id) = (self.store, self.shard_id);
        let (_, committee) = self.cached.get_or_insert_with(|| {
            let (committee, source) = resolve_committee(store, shard_id, epoch, [header]);
            debug!(
                shard_id,
                epoch,
                members = committee.len(),
                source = ?source,
                "resolved committee"
            );
            (epoch, committee)
        });
        Cow::Borrowed(committee)
    }
}
