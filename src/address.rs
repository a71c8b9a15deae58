//! Account addresses and their display encoding.
//!
//! Raw identities are 20 bytes. The canonical text form is bech32 (BIP-173)
//! with a network prefix, e.g. `one1pdv9lrdwl0rg5vglh4xtyrv3wjk3wsqket7zxy`;
//! `0x`-prefixed hex is accepted on input.

use crate::error::{ExplorerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ADDRESS_LENGTH: usize = 20;
pub const DEFAULT_HRP: &str = "one";

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [0x3b6a_57b2, 0x2650_8e6d, 0x1ea1_19fa, 0x3d42_33dd, 0x2a14_62b3];
const CHECKSUM_LENGTH: usize = 6;
const MAX_LENGTH: usize = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; ADDRESS_LENGTH] = bytes.try_into().map_err(|_| {
            ExplorerError::Decode(format!(
                "Address must be {} bytes, got {}",
                ADDRESS_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Address(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase `0x`-prefixed hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        let bytes = hex::decode(digits)
            .map_err(|e| ExplorerError::Decode(format!("Invalid hex address: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Converts between raw identities and their display text.
pub trait AddressCodec: Send + Sync {
    fn encode(&self, address: &Address) -> Result<String>;
    fn decode(&self, text: &str) -> Result<Address>;
}

/// Bech32 codec bound to one human-readable prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bech32Codec {
    hrp: String,
}

impl Bech32Codec {
    pub fn new(hrp: &str) -> Result<Self> {
        validate_hrp(hrp)?;
        Ok(Bech32Codec {
            hrp: hrp.to_ascii_lowercase(),
        })
    }

    pub fn hrp(&self) -> &str {
        &self.hrp
    }
}

impl Default for Bech32Codec {
    fn default() -> Self {
        Bech32Codec {
            hrp: DEFAULT_HRP.to_string(),
        }
    }
}

impl AddressCodec for Bech32Codec {
    fn encode(&self, address: &Address) -> Result<String> {
        encode(&self.hrp, address.as_bytes())
    }

    /// Accepts bech32 under this codec's prefix, or `0x` hex.
    fn decode(&self, text: &str) -> Result<Address> {
        if text.starts_with("0x") || text.starts_with("0X") {
            return Address::from_hex(text);
        }
        let (hrp, payload) = decode(text)?;
        if hrp != self.hrp {
            return Err(ExplorerError::Decode(format!(
                "Address prefix {} does not match {}",
                hrp, self.hrp
            )));
        }
        Address::from_slice(&payload)
    }
}

fn validate_hrp(hrp: &str) -> Result<()> {
    if hrp.is_empty() || hrp.len() > 83 {
        return Err(ExplorerError::Config(format!(
            "Invalid bech32 prefix length: {}",
            hrp.len()
        )));
    }
    if hrp.bytes().any(|b| !(33..=126).contains(&b)) {
        return Err(ExplorerError::Config(format!(
            "Invalid character in bech32 prefix: {}",
            hrp
        )));
    }
    Ok(())
}

fn polymod(values: impl Iterator<Item = u8>) -> u32 {
    let mut chk = 1u32;
    for value in values {
        let top = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ value as u32;
        for (i, generator) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= generator;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    hrp.bytes()
        .map(|b| b >> 5)
        .chain(std::iter::once(0))
        .chain(hrp.bytes().map(|b| b & 0x1f))
        .collect()
}

fn create_checksum(hrp: &str, data: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let values = hrp_expand(hrp)
        .into_iter()
        .chain(data.iter().copied())
        .chain([0u8; CHECKSUM_LENGTH]);
    let pm = polymod(values) ^ 1;

    let mut checksum = [0u8; CHECKSUM_LENGTH];
    for (i, item) in checksum.iter_mut().enumerate() {
        *item = ((pm >> (5 * (5 - i))) & 0x1f) as u8;
    }
    checksum
}

fn verify_checksum(hrp: &str, data: &[u8]) -> bool {
    polymod(hrp_expand(hrp).into_iter().chain(data.iter().copied())) == 1
}

/// Regroups a bit stream from `from`-bit to `to`-bit words.
fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max_value: u32 = (1 << to) - 1;
    let max_acc: u32 = (1 << (from + to - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &value in data {
        if (value as u32) >> from != 0 {
            return Err(ExplorerError::Decode(format!(
                "Value {} does not fit in {} bits",
                value, from
            )));
        }
        acc = ((acc << from) | value as u32) & max_acc;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max_value) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max_value) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max_value) != 0 {
        return Err(ExplorerError::Decode("Invalid bech32 padding".to_string()));
    }

    Ok(out)
}

/// Encodes `payload` as bech32 under `hrp`.
pub fn encode(hrp: &str, payload: &[u8]) -> Result<String> {
    validate_hrp(hrp)?;
    let hrp = hrp.to_ascii_lowercase();
    let data = convert_bits(payload, 8, 5, true)?;
    let checksum = create_checksum(&hrp, &data);

    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + CHECKSUM_LENGTH);
    out.push_str(&hrp);
    out.push('1');
    for d in data.iter().chain(checksum.iter()) {
        out.push(CHARSET[*d as usize] as char);
    }
    Ok(out)
}

/// Decodes bech32 text into its prefix and 8-bit payload.
pub fn decode(text: &str) -> Result<(String, Vec<u8>)> {
    if text.len() > MAX_LENGTH {
        return Err(ExplorerError::Decode(format!(
            "Bech32 string too long: {}",
            text.len()
        )));
    }
    let has_lower = text.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = text.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(ExplorerError::Decode("Mixed-case bech32 string".to_string()));
    }
    let text = text.to_ascii_lowercase();

    let separator = text
        .rfind('1')
        .ok_or_else(|| ExplorerError::Decode("Missing bech32 separator".to_string()))?;
    if separator == 0 || separator + 1 + CHECKSUM_LENGTH > text.len() {
        return Err(ExplorerError::Decode("Invalid bech32 separator position".to_string()));
    }
    let (hrp, rest) = text.split_at(separator);
    validate_hrp(hrp).map_err(|e| ExplorerError::Decode(e.to_string()))?;

    let mut data = Vec::with_capacity(rest.len() - 1);
    for c in rest[1..].bytes() {
        let value = CHARSET
            .iter()
            .position(|&x| x == c)
            .ok_or_else(|| ExplorerError::Decode(format!("Invalid bech32 character: {}", c as char)))?;
        data.push(value as u8);
    }

    if !verify_checksum(hrp, &data) {
        return Err(ExplorerError::Decode("Invalid bech32 checksum".to_string()));
    }
    data.truncate(data.len() - CHECKSUM_LENGTH);
    let payload = convert_bits(&data, 5, 8, false)?;

    Ok((hrp.to_string(), payload))
}
