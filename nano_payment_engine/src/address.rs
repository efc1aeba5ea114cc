//! Nano account addresses.
//!
//! An address is `nano_` (or the legacy `xrb_`) followed by 60 characters of Nano's base-32 alphabet: 52 characters
//! encoding the 256-bit account public key (left-padded with 4 zero bits), and 8 characters encoding a 40-bit
//! Blake2b checksum of the key, in reversed byte order.
use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use blake2::{
    digest::{Update, VariableOutput},
    Blake2bVar,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";
const PREFIX: &str = "nano_";
const LEGACY_PREFIX: &str = "xrb_";
const KEY_CHARS: usize = 52;
const CHECKSUM_CHARS: usize = 8;
const CHECKSUM_BYTES: usize = 5;
const KEY_PADDING_BITS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Address must start with 'nano_' or 'xrb_'")]
    InvalidPrefix,
    #[error("Address body must be 60 characters long, but it is {0}")]
    InvalidLength(usize),
    #[error("'{0}' is not a valid address character")]
    InvalidCharacter(char),
    #[error("The address does not encode a 256-bit public key")]
    InvalidPadding,
    #[error("The address checksum does not match its public key")]
    InvalidChecksum,
}

/// A validated Nano account address.
///
/// Two addresses compare equal when they encode the same public key, regardless of which prefix they were parsed
/// with. Addresses are always displayed with the `nano_` prefix.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NanoAddress {
    public_key: [u8; 32],
}

impl NanoAddress {
    pub fn from_public_key(public_key: [u8; 32]) -> Self {
        Self { public_key }
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    pub fn is_valid(address: &str) -> bool {
        address.parse::<Self>().is_ok()
    }
}

impl FromStr for NanoAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix(PREFIX).or_else(|| s.strip_prefix(LEGACY_PREFIX)).ok_or(AddressError::InvalidPrefix)?;
        if let Some(c) = body.chars().find(|c| !c.is_ascii()) {
            return Err(AddressError::InvalidCharacter(c));
        }
        if body.len() != KEY_CHARS + CHECKSUM_CHARS {
            return Err(AddressError::InvalidLength(body.len()));
        }
        let (key_part, checksum_part) = body.split_at(KEY_CHARS);
        let key_bytes = decode(key_part, KEY_PADDING_BITS)?;
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&key_bytes);
        let checksum = decode(checksum_part, 0)?;
        if checksum.as_slice() != key_checksum(&public_key).as_slice() {
            return Err(AddressError::InvalidChecksum);
        }
        Ok(Self { public_key })
    }
}

impl TryFrom<String> for NanoAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NanoAddress> for String {
    fn from(value: NanoAddress) -> Self {
        value.to_string()
    }
}

impl Display for NanoAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = encode(&self.public_key, KEY_PADDING_BITS);
        let checksum = encode(&key_checksum(&self.public_key), 0);
        write!(f, "{PREFIX}{key}{checksum}")
    }
}

impl Debug for NanoAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NanoAddress({self})")
    }
}

fn key_checksum(public_key: &[u8; 32]) -> [u8; CHECKSUM_BYTES] {
    let mut checksum = [0u8; CHECKSUM_BYTES];
    // A 5-byte output always fits Blake2b's output size limits, so neither call can fail.
    if let Ok(mut hasher) = Blake2bVar::new(CHECKSUM_BYTES) {
        hasher.update(public_key);
        if hasher.finalize_variable(&mut checksum).is_ok() {
            checksum.reverse();
        }
    }
    checksum
}

fn encode(bytes: &[u8], padding_bits: usize) -> String {
    let bits = std::iter::repeat(false)
        .take(padding_bits)
        .chain(bytes.iter().flat_map(|b| (0..8).rev().map(move |i| (b >> i) & 1 == 1)))
        .collect::<Vec<bool>>();
    bits.chunks(5)
        .map(|chunk| {
            let index = chunk.iter().fold(0usize, |acc, &bit| (acc << 1) | usize::from(bit));
            char::from(ALPHABET[index])
        })
        .collect()
}

fn decode(chars: &str, padding_bits: usize) -> Result<Vec<u8>, AddressError> {
    let mut bits = Vec::with_capacity(chars.len() * 5);
    for c in chars.chars() {
        let value = ALPHABET.iter().position(|&a| char::from(a) == c).ok_or(AddressError::InvalidCharacter(c))?;
        bits.extend((0..5).rev().map(|i| (value >> i) & 1 == 1));
    }
    if bits.iter().take(padding_bits).any(|&bit| bit) {
        return Err(AddressError::InvalidPadding);
    }
    Ok(bits[padding_bits..]
        .chunks(8)
        .map(|byte| byte.iter().fold(0u8, |acc, &bit| (acc << 1) | u8::from(bit)))
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;

    const GENESIS: &str = "nano_3t6k35gi95xu6tergt6p69ck76ogmitsa8mnijtpxm9fkcm736xtoncuohr3";
    const GENESIS_KEY: [u8; 32] = [
        0xE8, 0x92, 0x08, 0xDD, 0x03, 0x8F, 0xBB, 0x26, 0x99, 0x87, 0x68, 0x96, 0x21, 0xD5, 0x22, 0x92, 0xAE, 0x9C,
        0x35, 0x94, 0x1A, 0x74, 0x84, 0x75, 0x6E, 0xCC, 0xED, 0x92, 0xA6, 0x50, 0x93, 0xBA,
    ];

    #[test]
    fn parses_known_addresses() {
        let genesis = GENESIS.parse::<NanoAddress>().unwrap();
        assert_eq!(genesis.public_key(), &GENESIS_KEY);
        assert_eq!(genesis.to_string(), GENESIS);
        let legacy = GENESIS.replace("nano_", "xrb_").parse::<NanoAddress>().unwrap();
        assert_eq!(legacy, genesis);
        let burn = "nano_1111111111111111111111111111111111111111111111111111hifc8npp".parse::<NanoAddress>().unwrap();
        assert_eq!(burn.public_key(), &[0u8; 32]);
    }

    #[test]
    fn encodes_public_keys() {
        let mut key = [0u8; 32];
        key.iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
        let address = NanoAddress::from_public_key(key);
        assert_eq!(address.to_string(), "nano_11131a3ia3a81w61k4id3i8iw5ri46b3871o4rdji8at5eg3t9izij86w3hz");
        assert_eq!(NanoAddress::from_public_key(GENESIS_KEY).to_string(), GENESIS);
    }

    #[test]
    fn rejects_invalid_addresses() {
        assert_eq!("".parse::<NanoAddress>(), Err(AddressError::InvalidPrefix));
        assert_eq!(GENESIS.replace("nano_", "ban_").parse::<NanoAddress>(), Err(AddressError::InvalidPrefix));
        assert_eq!("nano_3t6k35".parse::<NanoAddress>(), Err(AddressError::InvalidLength(6)));
        // '0', 'l', 'v' and '2' are not part of the alphabet
        let bad_char = GENESIS.replace("3t6k", "3t0k");
        assert_eq!(bad_char.parse::<NanoAddress>(), Err(AddressError::InvalidCharacter('0')));
        let bad_checksum = GENESIS.replace("uohr3", "uohr1");
        assert_eq!(bad_checksum.parse::<NanoAddress>(), Err(AddressError::InvalidChecksum));
        let bad_key = GENESIS.replace("nano_3t6k", "nano_3t6m");
        assert_eq!(bad_key.parse::<NanoAddress>(), Err(AddressError::InvalidChecksum));
        let bad_padding = GENESIS.replace("nano_3", "nano_9");
        assert_eq!(bad_padding.parse::<NanoAddress>(), Err(AddressError::InvalidPadding));
        assert!(!NanoAddress::is_valid("nano_not_an_address"));
        assert!(NanoAddress::is_valid(GENESIS));
    }
}
