//! Tendermint 0.25.x.

use sha2::{Digest, Sha256};

use crate::requests::ProveFlag;
use crate::responses::TxHash;

use super::{Adaptor, Dialect, ProofLayout, Version};

/// Length of a truncated transaction hash.
const TX_HASH_LEN: usize = 20;

const DIALECT: Dialect = Dialect {
    pubkey_types: &["tendermint/PubKeyEd25519"],
    sync_field: "catching_up",
    proof_layout: ProofLayout::Nested,
    prove_flag: ProveFlag::Prove,
};

pub struct V0_25;

impl Adaptor for V0_25 {
    fn version(&self) -> Version {
        Version::V0_25
    }

    fn dialect(&self) -> &Dialect {
        &DIALECT
    }

    fn hash_tx(&self, tx: &[u8]) -> TxHash {
        hash_tx(tx)
    }
}

/// SHA-256 of the transaction, truncated to 20 bytes.
pub fn hash_tx(tx: &[u8]) -> TxHash {
    let digest = Sha256::digest(tx);
    TxHash::new(digest[..TX_HASH_LEN].to_vec())
}
