//! Tendermint 0.20.x.

use ripemd::{Digest, Ripemd160};

use crate::requests::ProveFlag;
use crate::responses::TxHash;

use super::{Adaptor, Dialect, ProofLayout, Version};

const DIALECT: Dialect = Dialect {
    pubkey_types: &["AC26791624DE60", "tendermint/PubKeyEd25519"],
    sync_field: "syncing",
    proof_layout: ProofLayout::Flat,
    prove_flag: ProveFlag::Trusted,
};

pub struct V0_20;

impl Adaptor for V0_20 {
    fn version(&self) -> Version {
        Version::V0_20
    }

    fn dialect(&self) -> &Dialect {
        &DIALECT
    }

    fn hash_tx(&self, tx: &[u8]) -> TxHash {
        hash_tx(tx)
    }
}

/// RIPEMD-160 over the transaction with its amino length prefix.
pub fn hash_tx(tx: &[u8]) -> TxHash {
    let mut hasher = Ripemd160::new();
    hasher.update(length_prefix(tx.len()));
    hasher.update(tx);
    TxHash::new(hasher.finalize().to_vec())
}

/// Uvarint encoding of `len`. Transactions stay well below 2^14 bytes, so
/// the prefix is one or two bytes in practice.
fn length_prefix(len: usize) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(2);
    let mut rest = len;
    while rest >= 0x80 {
        prefix.push((rest % 0x80) as u8 | 0x80);
        rest /= 0x80;
    }
    prefix.push(rest as u8);
    prefix
}
