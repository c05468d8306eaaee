//! Per-version response adaptors.
//!
//! Each supported protocol version is a [`Version`] variant carrying a
//! stateless [`Adaptor`]: the decode functions for its wire dialect plus its
//! transaction hash. A client picks one adaptor when it is built and keeps
//! it for its whole life.

mod decoder;
mod decoding;
pub mod v0_20;
pub mod v0_25;

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{CoreError, DecodeError};
use crate::requests::{encode_abci_query, AbciQueryParams, ProveFlag};
use crate::responses::{
    AbciInfoResponse, AbciQueryResponse, BlockResponse, BlockResultsResponse, BlockchainResponse,
    BroadcastTxAsyncResponse, BroadcastTxCommitResponse, BroadcastTxSyncResponse,
    CommitResponse, GenesisResponse, HealthResponse, NewBlockEvent, NewBlockHeaderEvent,
    StatusResponse, TxEvent, TxHash, TxResponse, TxSearchResponse, ValidatorsResponse,
};
use crate::rpc::{JsonRpcEvent, Params};

use decoder::Decoder;

/// Where a protocol version puts the leaf counters of a transaction proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofLayout {
    /// `Index` and `Total` beside `Proof`.
    Flat,
    /// `total` and `index` inside `Proof`.
    Nested,
}

/// Wire-format differences between protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Accepted amino type tags for Ed25519 public keys.
    pub pubkey_types: &'static [&'static str],
    /// Name of the boolean sync flag in `sync_info`.
    pub sync_field: &'static str,
    pub proof_layout: ProofLayout,
    pub prove_flag: ProveFlag,
}

/// The decode and hash capabilities of one protocol version.
///
/// Implementors supply the version, its dialect and its hash; decoding is
/// shared and driven by the dialect.
pub trait Adaptor: Send + Sync {
    fn version(&self) -> Version;

    fn dialect(&self) -> &Dialect;

    /// Transaction id as the node computes it.
    fn hash_tx(&self, tx: &[u8]) -> TxHash;

    fn encode_abci_query(&self, params: &AbciQueryParams) -> Params {
        encode_abci_query(params, self.dialect().prove_flag)
    }

    fn decode_abci_info(&self, result: &Value) -> Result<AbciInfoResponse, DecodeError> {
        Decoder::new(self.dialect()).abci_info(result)
    }

    fn decode_abci_query(&self, result: &Value) -> Result<AbciQueryResponse, DecodeError> {
        Decoder::new(self.dialect()).abci_query(result)
    }

    fn decode_block(&self, result: &Value) -> Result<BlockResponse, DecodeError> {
        Decoder::new(self.dialect()).block(result)
    }

    fn decode_block_results(&self, result: &Value) -> Result<BlockResultsResponse, DecodeError> {
        Decoder::new(self.dialect()).block_results(result)
    }

    fn decode_blockchain(&self, result: &Value) -> Result<BlockchainResponse, DecodeError> {
        Decoder::new(self.dialect()).blockchain(result)
    }

    fn decode_broadcast_tx_sync(
        &self,
        result: &Value,
    ) -> Result<BroadcastTxSyncResponse, DecodeError> {
        Decoder::new(self.dialect()).broadcast_tx_sync(result)
    }

    fn decode_broadcast_tx_async(
        &self,
        result: &Value,
    ) -> Result<BroadcastTxAsyncResponse, DecodeError> {
        self.decode_broadcast_tx_sync(result)
    }

    fn decode_broadcast_tx_commit(
        &self,
        result: &Value,
    ) -> Result<BroadcastTxCommitResponse, DecodeError> {
        Decoder::new(self.dialect()).broadcast_tx_commit(result)
    }

    fn decode_commit(&self, result: &Value) -> Result<CommitResponse, DecodeError> {
        Decoder::new(self.dialect()).commit(result)
    }

    fn decode_genesis(&self, result: &Value) -> Result<GenesisResponse, DecodeError> {
        Decoder::new(self.dialect()).genesis(result)
    }

    fn decode_health(&self, _result: &Value) -> Result<HealthResponse, DecodeError> {
        Ok(())
    }

    fn decode_status(&self, result: &Value) -> Result<StatusResponse, DecodeError> {
        Decoder::new(self.dialect()).status(result)
    }

    fn decode_tx(&self, result: &Value) -> Result<TxResponse, DecodeError> {
        Decoder::new(self.dialect()).tx(result)
    }

    fn decode_tx_search(&self, result: &Value) -> Result<TxSearchResponse, DecodeError> {
        Decoder::new(self.dialect()).tx_search(result)
    }

    fn decode_validators(&self, result: &Value) -> Result<ValidatorsResponse, DecodeError> {
        Decoder::new(self.dialect()).validators(result)
    }

    fn decode_new_block_event(&self, event: &JsonRpcEvent) -> Result<NewBlockEvent, DecodeError> {
        Decoder::new(self.dialect()).new_block_event(event)
    }

    fn decode_new_block_header_event(
        &self,
        event: &JsonRpcEvent,
    ) -> Result<NewBlockHeaderEvent, DecodeError> {
        Decoder::new(self.dialect()).new_block_header_event(event)
    }

    fn decode_tx_event(&self, event: &JsonRpcEvent) -> Result<TxEvent, DecodeError> {
        Decoder::new(self.dialect()).tx_event(event, |tx| self.hash_tx(tx))
    }
}

// ==============================================================================
// Versions And Detection
// ==============================================================================

/// Supported protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    V0_20,
    V0_25,
}

/// Node version prefixes, matched in order.
const VERSION_TABLE: &[(&str, Version)] = &[("0.20.", Version::V0_20), ("0.25.", Version::V0_25)];

impl Version {
    pub fn adaptor(self) -> &'static dyn Adaptor {
        match self {
            Self::V0_20 => &v0_20::V0_20,
            Self::V0_25 => &v0_25::V0_25,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V0_20 => "0.20",
            Self::V0_25 => "0.25",
        }
    }

    /// Pick the version for a node-reported version string such as
    /// `0.25.0`. Unknown versions are an error, never a guess.
    pub fn detect(node_version: &str) -> Result<Self, CoreError> {
        let trimmed = node_version.trim();
        let normalized = trimmed.strip_prefix('v').unwrap_or(trimmed);
        VERSION_TABLE
            .iter()
            .find(|(prefix, _)| normalized.starts_with(prefix))
            .map(|(_, version)| *version)
            .ok_or_else(|| CoreError::UnsupportedVersion(node_version.to_owned()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Version {
    type Err = CoreError;

    /// Accepts `0.25`, `v0.25` or a full node version like `0.25.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let normalized = trimmed.strip_prefix('v').unwrap_or(trimmed);
        match normalized {
            "0.20" => Ok(Self::V0_20),
            "0.25" => Ok(Self::V0_25),
            _ => Self::detect(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    #[test]
    fn detect_matches_version_prefix() {
        assert_eq!(Version::detect("0.20.0").expect("known"), Version::V0_20);
        assert_eq!(Version::detect("0.25.0").expect("known"), Version::V0_25);
        assert_eq!(Version::detect("v0.25.1-dev").expect("known"), Version::V0_25);
    }

    #[test]
    fn detect_rejects_unknown_versions() {
        for unknown in ["0.21.0", "0.2", "0.250.0", "1.0.0", ""] {
            let err = Version::detect(unknown).expect_err("must not guess");
            assert!(
                matches!(err, CoreError::UnsupportedVersion(ref v) if v == unknown),
                "{unknown}: {err}"
            );
        }
    }

    #[test]
    fn version_from_str_accepts_short_forms() {
        assert_eq!("0.20".parse::<Version>().expect("short"), Version::V0_20);
        assert_eq!("v0.25".parse::<Version>().expect("prefixed"), Version::V0_25);
        assert_eq!("0.25.3".parse::<Version>().expect("full"), Version::V0_25);
        assert!("0.30".parse::<Version>().is_err());
    }

    #[test]
    fn adaptor_reports_its_own_version() {
        for version in [Version::V0_20, Version::V0_25] {
            assert_eq!(version.adaptor().version(), version);
        }
    }

    #[test]
    fn decode_status_per_dialect() {
        let v20 = Version::V0_20
            .adaptor()
            .decode_status(&status_v0_20())
            .expect("v0.20 status");
        assert_eq!(v20.node_info.version, "0.20.0");
        assert_eq!(v20.node_info.other.get("tx_index").map(String::as_str), Some("on"));
        assert!(v20.sync_info.catching_up);
        assert_eq!(v20.sync_info.latest_block_height, 1234);

        let v25 = Version::V0_25
            .adaptor()
            .decode_status(&status_v0_25())
            .expect("v0.25 status");
        assert_eq!(v25.node_info.version, "0.25.0");
        assert_eq!(v25.node_info.other.get("rpc_address").map(String::as_str), Some("tcp://0.0.0.0:26657"));
        assert!(!v25.sync_info.catching_up);
        assert_eq!(v25.validator_info.voting_power, 10);
        assert_eq!(v25.validator_info.pubkey.data.len(), 32);
    }

    #[test]
    fn pubkey_tags_are_dialect_specific() {
        // The legacy amino prefix is only understood by 0.20.
        let err = Version::V0_25
            .adaptor()
            .decode_status(&status_v0_20())
            .expect_err("legacy pubkey tag");
        assert_eq!(err, DecodeError::UnknownPubkeyType("AC26791624DE60".into()));
    }

    #[test]
    fn missing_required_field_fails_optional_absence_succeeds() {
        let adaptor = Version::V0_25.adaptor();

        let mut broken = broadcast_tx_commit_result();
        broken.as_object_mut().expect("object").remove("hash");
        assert_eq!(
            adaptor.decode_broadcast_tx_commit(&broken),
            Err(DecodeError::MissingField("hash".into()))
        );

        let mut sparse = broadcast_tx_commit_result();
        let obj = sparse.as_object_mut().expect("object");
        obj.remove("height");
        obj.remove("deliver_tx");
        let decoded = adaptor
            .decode_broadcast_tx_commit(&sparse)
            .expect("optional fields may be absent");
        assert_eq!(decoded.height, None);
        assert_eq!(decoded.deliver_tx, None);
    }

    #[test]
    fn decode_broadcast_tx_commit_fields() {
        let decoded = Version::V0_25
            .adaptor()
            .decode_broadcast_tx_commit(&broadcast_tx_commit_result())
            .expect("decodes");
        assert_eq!(decoded.height, Some(27));
        assert_eq!(decoded.hash.to_string(), "3D011E09502A84552A0F8AE112D024CC2C115597");
        assert_eq!(decoded.check_tx.code, 0);
        let deliver = decoded.deliver_tx.expect("delivered");
        assert_eq!(deliver.data.as_deref(), Some(&b"ok"[..]));
        let tags = deliver.tags.expect("tags");
        assert_eq!(tags[0].key, b"app.key".to_vec());
        assert_eq!(tags[0].value, b"hello".to_vec());
    }

    #[test]
    fn decode_block_and_header_event() {
        let adaptor = Version::V0_25.adaptor();
        let block = adaptor.decode_block(&block_result()).expect("block");
        assert_eq!(block.block.header.height, 27);
        assert_eq!(block.block.header.chain_id, "test-chain");
        assert_eq!(block.block.txs, vec![b"hello=world".to_vec()]);
        assert_eq!(block.block.evidence, None);
        assert_eq!(block.block.last_commit.precommits.len(), 2);
        assert!(block.block.last_commit.precommits[1].is_none());
        let vote = block.block.last_commit.precommits[0].as_ref().expect("vote");
        assert_eq!(vote.round, 0);
        assert_eq!(vote.signature.signature.len(), 64);

        let event = header_event(28);
        let header = adaptor
            .decode_new_block_header_event(&event)
            .expect("header event");
        assert_eq!(header.height, 28);
    }

    #[test]
    fn decode_tx_event_hashes_locally() {
        let event = tx_event(b"hello=world", 30);
        let v20 = Version::V0_20.adaptor().decode_tx_event(&event).expect("v0.20");
        let v25 = Version::V0_25.adaptor().decode_tx_event(&event).expect("v0.25");
        assert_eq!(v20.hash.to_string(), "BF19BE07F8484796CED8876B1833E0E362705599");
        assert_eq!(v25.hash.to_string(), "3D011E09502A84552A0F8AE112D024CC2C115597");
        assert_eq!(v25.height, 30);
        assert_eq!(v25.tx, b"hello=world".to_vec());
    }

    #[test]
    fn wrong_event_kind_is_decode_error() {
        let event = header_event(5);
        let err = Version::V0_25
            .adaptor()
            .decode_new_block_event(&event)
            .expect_err("header event has no block");
        assert!(matches!(err, DecodeError::UnexpectedEvent(_)));
    }

    #[test]
    fn tx_proof_layout_per_dialect() {
        let flat = Version::V0_20
            .adaptor()
            .decode_tx(&tx_result_with_flat_proof())
            .expect("flat proof");
        let proof = flat.proof.expect("proof");
        assert_eq!((proof.total, proof.index), (4, 1));
        assert_eq!(proof.aunts.len(), 2);

        let nested = Version::V0_25
            .adaptor()
            .decode_tx(&tx_result_with_nested_proof())
            .expect("nested proof");
        let proof = nested.proof.expect("proof");
        assert_eq!((proof.total, proof.index), (1, 0));
        assert!(proof.aunts.is_empty());
    }

    #[test]
    fn abci_query_prove_flag_follows_dialect() {
        let mut params = AbciQueryParams::new("/store", b"k".to_vec());
        params.prove = true;
        let v20 = Version::V0_20.adaptor().encode_abci_query(&params);
        let v25 = Version::V0_25.adaptor().encode_abci_query(&params);
        assert_eq!(v20["trusted"], Value::Bool(false));
        assert_eq!(v25["prove"], Value::Bool(true));
    }

    #[test]
    fn decode_genesis_and_validators() {
        let adaptor = Version::V0_25.adaptor();
        let genesis = adaptor.decode_genesis(&genesis_result()).expect("genesis");
        assert_eq!(genesis.chain_id, "test-chain");
        assert_eq!(genesis.consensus_params.block_size.max_bytes, 22_020_096);
        assert_eq!(genesis.consensus_params.block_size.max_gas, -1);
        assert_eq!(genesis.validators[0].name.as_deref(), Some("node0"));
        assert_eq!(genesis.validators[0].address, None);
        assert!(genesis.app_state.is_some());

        let validators = adaptor
            .decode_validators(&validators_result())
            .expect("validators");
        assert_eq!(validators.block_height, 27);
        assert_eq!(validators.results[0].accum, Some(-20));
        assert!(validators.results[0].address.is_some());
    }

    #[test]
    fn validator_set_members_need_an_address() {
        let adaptor = Version::V0_25.adaptor();
        let mut validators = validators_result();
        if let Some(member) = validators["validators"][0].as_object_mut() {
            member.remove("address");
        }
        match adaptor.decode_validators(&validators) {
            Err(DecodeError::MissingField(field)) => assert!(field.contains("address"), "{field}"),
            other => panic!("expected missing address, got {other:?}"),
        }
    }

    #[test]
    fn decode_block_evidence_requires_validator_address() {
        let adaptor = Version::V0_25.adaptor();
        let mut block = block_result();
        block["block"]["evidence"] = serde_json::json!({"evidence": [{
            "type": "DuplicateVoteEvidence",
            "validator": {
                "address": HASH_HEX,
                "pub_key": pubkey("tendermint/PubKeyEd25519"),
                "voting_power": "10"
            },
            "height": "20",
            "time": "1542120703",
            "totalVotingPower": "40"
        }]});
        let decoded = adaptor.decode_block(&block).expect("block with evidence");
        let evidence = decoded.block.evidence.expect("evidence list");
        assert_eq!(evidence[0].height, 20);
        assert_eq!(evidence[0].total_voting_power, 40);
        assert!(evidence[0].validator.address.is_some());

        if let Some(validator) = block["block"]["evidence"]["evidence"][0]["validator"].as_object_mut() {
            validator.remove("address");
        }
        assert!(matches!(
            adaptor.decode_block(&block),
            Err(DecodeError::MissingField(field)) if field.contains("address")
        ));
    }
}
