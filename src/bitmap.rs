//! Commit bitmap decoding.
//!
//! A commit bitmap marks which committee members' signatures were aggregated.
//! Bit i lives in byte `i / 8` at position `i % 8` (least significant first)
//! and refers to committee position i.

use crate::address::AddressCodec;
use crate::committee::{BlsPublicKey, Committee};
use crate::error::{ExplorerError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Participation mask positioned over an ordered list of public keys.
#[derive(Debug, Clone)]
pub struct Mask {
    public_keys: Vec<BlsPublicKey>,
    index: HashMap<BlsPublicKey, usize>,
    bitmap: Vec<u8>,
}

impl Mask {
    pub fn new(public_keys: Vec<BlsPublicKey>) -> Self {
        let mut index = HashMap::with_capacity(public_keys.len());
        for (i, key) in public_keys.iter().enumerate() {
            index.entry(*key).or_insert(i);
        }
        let bitmap = vec![0u8; public_keys.len().div_ceil(8)];
        Mask {
            public_keys,
            index,
            bitmap,
        }
    }

    /// Fails if any member's public key is malformed.
    pub fn from_committee(committee: &Committee) -> Result<Self> {
        Ok(Self::new(committee.public_keys()?))
    }

    pub fn len(&self) -> usize {
        self.public_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.public_keys.is_empty()
    }

    /// Number of bytes a bitmap for this mask must have.
    pub fn bitmap_len(&self) -> usize {
        self.bitmap.len()
    }

    /// Replaces the participation bits. The bitmap must be exactly
    /// [`Mask::bitmap_len`] bytes with no bits set past the last member.
    pub fn set_mask(&mut self, bitmap: &[u8]) -> Result<()> {
        if bitmap.len() != self.bitmap_len() {
            return Err(ExplorerError::Decode(format!(
                "mismatching bitmap lengths: expected {}, got {}",
                self.bitmap_len(),
                bitmap.len()
            )));
        }
        let used_bits = self.len() % 8;
        if used_bits != 0 {
            let padding = bitmap[bitmap.len() - 1] >> used_bits;
            if padding != 0 {
                return Err(ExplorerError::Decode(
                    "bitmap has bits set beyond the committee size".to_string(),
                ));
            }
        }
        self.bitmap.copy_from_slice(bitmap);
        Ok(())
    }

    pub fn index_enabled(&self, i: usize) -> Result<bool> {
        if i >= self.len() {
            return Err(ExplorerError::Decode(format!(
                "index {} out of range for mask of {}",
                i,
                self.len()
            )));
        }
        Ok(self.bitmap[i >> 3] & (1u8 << (i & 7)) != 0)
    }

    pub fn key_enabled(&self, key: &BlsPublicKey) -> Result<bool> {
        let i = self
            .index
            .get(key)
            .ok_or_else(|| ExplorerError::Decode("key not found in mask".to_string()))?;
        self.index_enabled(*i)
    }

    pub fn count_enabled(&self) -> usize {
        self.bitmap.iter().map(|b| b.count_ones() as usize).sum()
    }
}

/// Turns a committee and a commit bitmap into the signers' display addresses.
pub trait SignerDecoder {
    /// Signer addresses in committee order. A malformed key or bitmap fails
    /// the whole call; a member whose address cannot be encoded is skipped.
    fn decode(&self, committee: &Committee, bitmap: &[u8]) -> Result<Vec<String>>;
}

pub struct MaskDecoder<'a> {
    codec: &'a dyn AddressCodec,
}

impl<'a> MaskDecoder<'a> {
    pub fn new(codec: &'a dyn AddressCodec) -> Self {
        MaskDecoder { codec }
    }
}

impl SignerDecoder for MaskDecoder<'_> {
    fn decode(&self, committee: &Committee, bitmap: &[u8]) -> Result<Vec<String>> {
        let mut mask = Mask::from_committee(committee)?;
        mask.set_mask(bitmap)?;

        let mut signers = Vec::with_capacity(mask.count_enabled());
        for (i, validator) in committee.validators.iter().enumerate() {
            if !mask.index_enabled(i)? {
                continue;
            }
            match self.codec.encode(&validator.ecdsa_address) {
                Ok(address) => signers.push(address),
                Err(e) => {
                    debug!(index = i, error = %e, "skipping signer with unencodable address")
                }
            }
        }
        Ok(signers)
    }
}
