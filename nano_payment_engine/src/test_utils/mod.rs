//! In-memory wallet backends for exercising payment watchers without a node.
mod mock_wallet;

use blake2::{Blake2b512, Digest};
pub use mock_wallet::{MockFeed, MockWallet, MockWalletProvider, RecordedSend};

use crate::NanoAddress;

pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// A deterministic, valid address for tests. Different `n` give different addresses.
pub fn test_address(n: u8) -> NanoAddress {
    NanoAddress::from_public_key([n; 32])
}

/// Derives a deterministic account key from a seed and index, standing in for real key derivation.
pub fn derive_test_address(seed: &str, index: u32) -> NanoAddress {
    let digest = Blake2b512::new().chain_update(seed.as_bytes()).chain_update(index.to_be_bytes()).finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    NanoAddress::from_public_key(key)
}
