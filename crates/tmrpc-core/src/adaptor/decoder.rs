use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::DecodeError;
use crate::responses::{
    AbciInfoResponse, AbciQueryResponse, Algorithm, Block, BlockId, BlockMeta, BlockResponse,
    BlockResultsResponse, BlockSizeParams, BlockchainResponse, BroadcastTxCommitResponse,
    BroadcastTxSyncResponse, Commit, CommitResponse, ConsensusParams, EndBlock, Evidence,
    EvidenceParams, GenesisResponse, Header, NodeInfo, PartSetHeader, PublicKey,
    StatusResponse, SyncInfo, Tag, TxData, TxEvent, TxHash, TxProof, TxResponse,
    TxSearchResponse, Validator, ValidatorsResponse, Vote, VoteSignature,
};
use crate::rpc::JsonRpcEvent;

use super::decoding::{
    get, optional_base64, optional_bool, optional_int, optional_list, optional_str,
    parse_base64, parse_hex, required, required_base64, required_bool, required_hex,
    required_int, required_list, required_str, required_time, Decoded,
};
use super::{Dialect, ProofLayout};

/// Response decoding for one protocol dialect.
pub(super) struct Decoder<'d> {
    dialect: &'d Dialect,
}

impl<'d> Decoder<'d> {
    pub(super) fn new(dialect: &'d Dialect) -> Self {
        Self { dialect }
    }

    // ==========================================================================
    // Endpoints
    // ==========================================================================

    pub(super) fn abci_info(&self, result: &Value) -> Decoded<AbciInfoResponse> {
        let data = required(result, "response")?;
        Ok(AbciInfoResponse {
            data: optional_str(data, "data")?,
            last_block_height: optional_int(data, "last_block_height")?,
            last_block_app_hash: optional_base64(data, "last_block_app_hash")?,
        })
    }

    pub(super) fn abci_query(&self, result: &Value) -> Decoded<AbciQueryResponse> {
        let data = required(result, "response")?;
        Ok(AbciQueryResponse {
            key: optional_base64(data, "key")?.unwrap_or_default(),
            value: optional_base64(data, "value")?.unwrap_or_default(),
            height: optional_int(data, "height")?,
            index: optional_int(data, "index")?,
            code: optional_int(data, "code")?,
            log: optional_str(data, "log")?,
        })
    }

    pub(super) fn block(&self, result: &Value) -> Decoded<BlockResponse> {
        Ok(BlockResponse {
            block_meta: self.block_meta(required(result, "block_meta")?)?,
            block: self.block_body(required(result, "block")?)?,
        })
    }

    pub(super) fn block_results(&self, result: &Value) -> Decoded<BlockResultsResponse> {
        let results = required(result, "results")?;
        let end = required(results, "EndBlock")?;
        Ok(BlockResultsResponse {
            height: required_int(result, "height")?,
            results: optional_list(results, "DeliverTx", |tx| self.tx_data(tx))?
                .unwrap_or_default(),
            end_block: EndBlock {
                validator_updates: optional_list(end, "validator_updates", |v| {
                    self.validator_update(v)
                })?
                .unwrap_or_default(),
                consensus_updates: get(end, "consensus_param_updates")
                    .map(|params| self.consensus_params(params))
                    .transpose()?,
                tags: optional_list(end, "tags", decode_tag)?,
            },
        })
    }

    pub(super) fn blockchain(&self, result: &Value) -> Decoded<BlockchainResponse> {
        Ok(BlockchainResponse {
            last_height: required_int(result, "last_height")?,
            block_metas: required_list(result, "block_metas", |meta| self.block_meta(meta))?,
        })
    }

    pub(super) fn broadcast_tx_sync(&self, result: &Value) -> Decoded<BroadcastTxSyncResponse> {
        Ok(BroadcastTxSyncResponse {
            result: self.tx_data(result)?,
            hash: TxHash::new(required_hex(result, "hash")?),
        })
    }

    pub(super) fn broadcast_tx_commit(
        &self,
        result: &Value,
    ) -> Decoded<BroadcastTxCommitResponse> {
        Ok(BroadcastTxCommitResponse {
            height: optional_int(result, "height")?,
            hash: TxHash::new(required_hex(result, "hash")?),
            check_tx: self.tx_data(required(result, "check_tx")?)?,
            deliver_tx: get(result, "deliver_tx")
                .map(|deliver| self.tx_data(deliver))
                .transpose()?,
        })
    }

    pub(super) fn commit(&self, result: &Value) -> Decoded<CommitResponse> {
        let signed = required(result, "signed_header")?;
        Ok(CommitResponse {
            canonical: required_bool(result, "canonical")?,
            header: self.header(required(signed, "header")?)?,
            commit: self.commit_body(required(signed, "commit")?)?,
        })
    }

    pub(super) fn genesis(&self, result: &Value) -> Decoded<GenesisResponse> {
        let genesis = required(result, "genesis")?;
        Ok(GenesisResponse {
            genesis_time: required_time(genesis, "genesis_time")?,
            chain_id: required_str(genesis, "chain_id")?.to_owned(),
            consensus_params: self.consensus_params(required(genesis, "consensus_params")?)?,
            validators: required_list(genesis, "validators", |v| self.validator_genesis(v))?,
            app_hash: required_hex(genesis, "app_hash")?,
            app_state: get(genesis, "app_state").cloned(),
        })
    }

    pub(super) fn status(&self, result: &Value) -> Decoded<StatusResponse> {
        Ok(StatusResponse {
            node_info: self.node_info(required(result, "node_info")?)?,
            sync_info: self.sync_info(required(result, "sync_info")?)?,
            validator_info: self.validator_info(required(result, "validator_info")?)?,
        })
    }

    pub(super) fn tx(&self, result: &Value) -> Decoded<TxResponse> {
        Ok(TxResponse {
            tx: required_base64(result, "tx")?,
            tx_result: self.tx_data(required(result, "tx_result")?)?,
            height: required_int(result, "height")?,
            index: required_int(result, "index")?,
            hash: TxHash::new(required_hex(result, "hash")?),
            proof: get(result, "proof")
                .map(|proof| self.tx_proof(proof))
                .transpose()?,
        })
    }

    pub(super) fn tx_search(&self, result: &Value) -> Decoded<TxSearchResponse> {
        Ok(TxSearchResponse {
            total_count: required_int(result, "total_count")?,
            txs: required_list(result, "txs", |tx| self.tx(tx))?,
        })
    }

    pub(super) fn validators(&self, result: &Value) -> Decoded<ValidatorsResponse> {
        Ok(ValidatorsResponse {
            block_height: required_int(result, "block_height")?,
            results: required_list(result, "validators", |v| self.validator_data(v))?,
        })
    }

    // ==========================================================================
    // Events
    // ==========================================================================

    fn event_field<'e>(&self, event: &'e JsonRpcEvent, field: &str) -> Decoded<&'e Value> {
        get(&event.data.value, field).ok_or_else(|| {
            DecodeError::UnexpectedEvent(format!("`{}` event without `{field}`", event.data.kind))
        })
    }

    pub(super) fn new_block_event(&self, event: &JsonRpcEvent) -> Decoded<Block> {
        self.block_body(self.event_field(event, "block")?)
    }

    pub(super) fn new_block_header_event(&self, event: &JsonRpcEvent) -> Decoded<Header> {
        self.header(self.event_field(event, "header")?)
    }

    pub(super) fn tx_event(
        &self,
        event: &JsonRpcEvent,
        hash_tx: impl Fn(&[u8]) -> TxHash,
    ) -> Decoded<TxEvent> {
        let data = self.event_field(event, "TxResult")?;
        let tx = required_base64(data, "tx")?;
        Ok(TxEvent {
            hash: hash_tx(&tx),
            tx,
            result: self.tx_data(required(data, "result")?)?,
            height: required_int(data, "height")?,
            index: required_int(data, "index")?,
        })
    }

    // ==========================================================================
    // Shared Structures
    // ==========================================================================

    fn tx_data(&self, data: &Value) -> Decoded<TxData> {
        Ok(TxData {
            code: optional_int(data, "code")?.unwrap_or(0),
            log: optional_str(data, "log")?,
            data: optional_base64(data, "data")?,
            tags: optional_list(data, "tags", decode_tag)?,
        })
    }

    fn tx_proof(&self, proof: &Value) -> Decoded<TxProof> {
        let inner = required(proof, "Proof")?;
        let (total, index) = match self.dialect.proof_layout {
            ProofLayout::Flat => (required_int(proof, "Total")?, required_int(proof, "Index")?),
            // Older 0.25 builds still put the counters next to `Proof`.
            ProofLayout::Nested => (
                match optional_int(inner, "total")? {
                    Some(total) => total,
                    None => required_int(proof, "Total")?,
                },
                match optional_int(inner, "index")? {
                    Some(index) => index,
                    None => required_int(proof, "Index")?,
                },
            ),
        };
        Ok(TxProof {
            data: required_base64(proof, "Data")?,
            root_hash: required_hex(proof, "RootHash")?,
            total,
            index,
            // A single-leaf tree has no aunts and the node sends null.
            aunts: optional_list(inner, "aunts", |aunt| parse_base64(aunt, "aunts"))?
                .unwrap_or_default(),
        })
    }

    fn block_meta(&self, meta: &Value) -> Decoded<BlockMeta> {
        Ok(BlockMeta {
            block_id: self.block_id(required(meta, "block_id")?)?,
            header: self.header(required(meta, "header")?)?,
        })
    }

    fn block_id(&self, id: &Value) -> Decoded<BlockId> {
        let parts = required(id, "parts")?;
        Ok(BlockId {
            hash: required_hex(id, "hash")?,
            parts: PartSetHeader {
                total: required_int(parts, "total")?,
                hash: required_hex(parts, "hash")?,
            },
        })
    }

    fn block_body(&self, block: &Value) -> Decoded<Block> {
        let data = required(block, "data")?;
        Ok(Block {
            header: self.header(required(block, "header")?)?,
            last_commit: self.commit_body(required(block, "last_commit")?)?,
            txs: optional_list(data, "txs", |tx| parse_base64(tx, "txs"))?.unwrap_or_default(),
            evidence: match get(block, "evidence") {
                Some(evidence) => optional_list(evidence, "evidence", |e| self.evidence(e))?,
                None => None,
            },
        })
    }

    fn evidence(&self, evidence: &Value) -> Decoded<Evidence> {
        Ok(Evidence {
            kind: required_str(evidence, "type")?.to_owned(),
            validator: self.validator_data(required(evidence, "validator")?)?,
            height: required_int(evidence, "height")?,
            time: required_int(evidence, "time")?,
            total_voting_power: required_int(evidence, "totalVotingPower")?,
        })
    }

    fn commit_body(&self, commit: &Value) -> Decoded<Commit> {
        let precommits = required(commit, "precommits")?
            .as_array()
            .ok_or_else(|| DecodeError::invalid("precommits", "expected array"))?
            .iter()
            .map(|vote| match vote {
                Value::Null => Ok(None),
                vote => self.vote(vote).map(Some),
            })
            .collect::<Decoded<Vec<_>>>()?;
        Ok(Commit {
            block_id: self.block_id(required(commit, "block_id")?)?,
            precommits,
        })
    }

    fn vote(&self, vote: &Value) -> Decoded<Vote> {
        Ok(Vote {
            kind: required_int(vote, "type")?,
            validator_address: required_hex(vote, "validator_address")?,
            validator_index: required_int(vote, "validator_index")?,
            height: required_int(vote, "height")?,
            round: required_int(vote, "round")?,
            timestamp: required_time(vote, "timestamp")?,
            block_id: self.block_id(required(vote, "block_id")?)?,
            signature: decode_signature(required(vote, "signature")?)?,
        })
    }

    fn header(&self, header: &Value) -> Decoded<Header> {
        Ok(Header {
            chain_id: required_str(header, "chain_id")?.to_owned(),
            height: required_int(header, "height")?,
            time: required_time(header, "time")?,
            num_txs: required_int(header, "num_txs")?,
            total_txs: required_int(header, "total_txs")?,
            last_block_id: self.block_id(required(header, "last_block_id")?)?,

            app_hash: required_hex(header, "app_hash")?,
            consensus_hash: required_hex(header, "consensus_hash")?,
            data_hash: required_hex(header, "data_hash")?,
            evidence_hash: required_hex(header, "evidence_hash")?,
            last_commit_hash: required_hex(header, "last_commit_hash")?,
            last_results_hash: required_hex(header, "last_results_hash")?,
            validators_hash: required_hex(header, "validators_hash")?,
        })
    }

    fn node_info(&self, info: &Value) -> Decoded<NodeInfo> {
        Ok(NodeInfo {
            id: required_hex(info, "id")?,
            listen_addr: required_str(info, "listen_addr")?.to_owned(),
            network: required_str(info, "network")?.to_owned(),
            version: required_str(info, "version")?.to_owned(),
            channels: required_str(info, "channels")?.to_owned(),
            moniker: required_str(info, "moniker")?.to_owned(),
            other: decode_node_other(required(info, "other")?)?,
        })
    }

    fn sync_info(&self, info: &Value) -> Decoded<SyncInfo> {
        Ok(SyncInfo {
            latest_block_hash: required_hex(info, "latest_block_hash")?,
            latest_app_hash: required_hex(info, "latest_app_hash")?,
            latest_block_height: required_int(info, "latest_block_height")?,
            latest_block_time: required_time(info, "latest_block_time")?,
            catching_up: optional_bool(info, self.dialect.sync_field)?.unwrap_or(false),
        })
    }

    fn validator_genesis(&self, validator: &Value) -> Decoded<Validator> {
        Ok(Validator {
            address: get(validator, "address")
                .map(|address| parse_hex(address, "address"))
                .transpose()?,
            pubkey: self.pubkey(required(validator, "pub_key")?)?,
            voting_power: required_int(validator, "power")?,
            name: optional_str(validator, "name")?,
            accum: None,
        })
    }

    fn validator_update(&self, validator: &Value) -> Decoded<Validator> {
        // ABCI validator updates spell the power field `power`.
        let voting_power = match optional_int(validator, "voting_power")? {
            Some(power) => power,
            None => required_int(validator, "power")?,
        };
        Ok(Validator {
            address: get(validator, "address")
                .map(|address| parse_hex(address, "address"))
                .transpose()?,
            pubkey: self.pubkey(required(validator, "pub_key")?)?,
            voting_power,
            name: None,
            accum: None,
        })
    }

    /// Validator set members always carry an address; only EndBlock updates
    /// may leave it out.
    fn validator_data(&self, validator: &Value) -> Decoded<Validator> {
        Ok(Validator {
            address: Some(required_hex(validator, "address")?),
            accum: optional_int(validator, "accum")?,
            ..self.validator_update(validator)?
        })
    }

    fn validator_info(&self, validator: &Value) -> Decoded<Validator> {
        Ok(Validator {
            address: Some(required_hex(validator, "address")?),
            pubkey: self.pubkey(required(validator, "pub_key")?)?,
            voting_power: required_int(validator, "voting_power")?,
            name: None,
            accum: None,
        })
    }

    fn consensus_params(&self, params: &Value) -> Decoded<ConsensusParams> {
        let block_size = first_present(params, &["block_size_params", "block_size"])?;
        let evidence = first_present(params, &["evidence_params", "evidence"])?;
        Ok(ConsensusParams {
            block_size: BlockSizeParams {
                max_bytes: required_int(block_size, "max_bytes")?,
                max_gas: required_int(block_size, "max_gas")?,
            },
            evidence: EvidenceParams {
                max_age: required_int(evidence, "max_age")?,
            },
        })
    }

    fn pubkey(&self, key: &Value) -> Decoded<PublicKey> {
        let kind = required_str(key, "type")?;
        if !self.dialect.pubkey_types.contains(&kind) {
            return Err(DecodeError::UnknownPubkeyType(kind.to_owned()));
        }
        Ok(PublicKey {
            algorithm: Algorithm::Ed25519,
            data: required_base64(key, "value")?,
        })
    }
}

// ==============================================================================
// Dialect-Independent Helpers
// ==============================================================================

fn decode_tag(tag: &Value) -> Decoded<Tag> {
    Ok(Tag {
        key: required_base64(tag, "key")?,
        value: required_base64(tag, "value")?,
    })
}

/// Signatures arrive either as a bare base64 string or wrapped in an
/// amino `{type, value}` object.
fn decode_signature(signature: &Value) -> Decoded<VoteSignature> {
    let bytes = match signature {
        Value::String(_) => parse_base64(signature, "signature")?,
        Value::Object(_) => required_base64(signature, "value")?,
        other => {
            return Err(DecodeError::invalid(
                "signature",
                format!("expected string or object, got {other}"),
            ))
        }
    };
    Ok(VoteSignature {
        algorithm: Algorithm::Ed25519,
        signature: bytes,
    })
}

/// `node_info.other` is either a list of `key=value` strings or an object.
fn decode_node_other(other: &Value) -> Decoded<BTreeMap<String, String>> {
    match other {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| {
                let entry = entry
                    .as_str()
                    .ok_or_else(|| DecodeError::invalid("other", "expected string entries"))?;
                let (key, value) = entry.split_once('=').ok_or_else(|| {
                    DecodeError::invalid("other", format!("`{entry}` is not key=value"))
                })?;
                Ok((key.to_owned(), value.to_owned()))
            })
            .collect(),
        Value::Object(entries) => Ok(entries
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()),
        other => Err(DecodeError::invalid(
            "other",
            format!("expected array or object, got {other}"),
        )),
    }
}

fn first_present<'a>(obj: &'a Value, fields: &[&str]) -> Decoded<&'a Value> {
    fields
        .iter()
        .find_map(|field| get(obj, field))
        .ok_or_else(|| DecodeError::MissingField(fields.join(" | ")))
}
