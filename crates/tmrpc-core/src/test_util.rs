//! Shared test fixtures for `tmrpc-core` unit tests.
//!
//! Builders return the `result` member of node responses exactly as the
//! node puts them on the wire, so decoder and client tests share a single
//! source of truth for dummy data.

use serde_json::{json, Value};

use crate::rpc::{parse_event, JsonRpcEvent};

pub const PUBKEY_B64: &str = "BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc=";
pub const SIGNATURE_B64: &str =
    "CQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQ==";
pub const HASH_HEX: &str = "0A0B0C0D0E0F101112131415161718191A1B1C1D";
/// `hello=world`
pub const TX_B64: &str = "aGVsbG89d29ybGQ=";

// ==============================================================================
// Building Blocks
// ==============================================================================

pub fn block_id() -> Value {
    json!({"hash": HASH_HEX, "parts": {"total": "1", "hash": HASH_HEX}})
}

pub fn header(height: u64) -> Value {
    json!({
        "chain_id": "test-chain",
        "height": height.to_string(),
        "time": "2018-11-13T14:51:43.165423645Z",
        "num_txs": "1",
        "total_txs": "9",
        "last_block_id": block_id(),
        "last_commit_hash": HASH_HEX,
        "data_hash": HASH_HEX,
        "validators_hash": HASH_HEX,
        "consensus_hash": HASH_HEX,
        "app_hash": "",
        "last_results_hash": "",
        "evidence_hash": ""
    })
}

pub fn vote(height: u64) -> Value {
    json!({
        "type": 2,
        "validator_address": HASH_HEX,
        "validator_index": "0",
        "height": height.to_string(),
        "round": "0",
        "timestamp": "2018-11-13T14:51:42.000000001Z",
        "block_id": block_id(),
        "signature": SIGNATURE_B64
    })
}

pub fn block(height: u64) -> Value {
    json!({
        "header": header(height),
        "data": {"txs": [TX_B64]},
        "evidence": {"evidence": null},
        "last_commit": {"block_id": block_id(), "precommits": [vote(height - 1), null]}
    })
}

pub fn pubkey(kind: &str) -> Value {
    json!({"type": kind, "value": PUBKEY_B64})
}

// ==============================================================================
// Endpoint Results
// ==============================================================================

pub fn status_v0_20() -> Value {
    json!({
        "node_info": {
            "id": "a1b2c3d4e5f60718293a4b5c6d7e8f9001122334",
            "listen_addr": "10.0.0.2:46656",
            "network": "test-chain",
            "version": "0.20.0",
            "channels": "4020212223303800",
            "moniker": "node0",
            "other": ["amino_version=0.9.9", "tx_index=on", "rpc_addr=tcp://0.0.0.0:46657"]
        },
        "sync_info": {
            "latest_block_hash": HASH_HEX,
            "latest_app_hash": "",
            "latest_block_height": 1234,
            "latest_block_time": "2018-06-01T10:00:00.5Z",
            "syncing": true
        },
        "validator_info": {
            "address": HASH_HEX,
            "pub_key": pubkey("AC26791624DE60"),
            "voting_power": "10"
        }
    })
}

pub fn status_v0_25() -> Value {
    json!({
        "node_info": {
            "id": "a1b2c3d4e5f60718293a4b5c6d7e8f9001122334",
            "listen_addr": "tcp://0.0.0.0:26656",
            "network": "test-chain",
            "version": "0.25.0",
            "channels": "4020212223303800",
            "moniker": "node0",
            "other": {"tx_index": "on", "rpc_address": "tcp://0.0.0.0:26657"}
        },
        "sync_info": {
            "latest_block_hash": HASH_HEX,
            "latest_app_hash": "",
            "latest_block_height": "27",
            "latest_block_time": "2018-11-13T14:51:43.165423645Z",
            "catching_up": false
        },
        "validator_info": {
            "address": HASH_HEX,
            "pub_key": pubkey("tendermint/PubKeyEd25519"),
            "voting_power": "10"
        }
    })
}

/// A v0.25 status reporting an arbitrary node version.
pub fn status_with_version(version: &str) -> Value {
    let mut status = status_v0_25();
    status["node_info"]["version"] = Value::String(version.to_owned());
    status
}

pub fn block_result() -> Value {
    json!({
        "block_meta": {"block_id": block_id(), "header": header(27)},
        "block": block(27)
    })
}

pub fn broadcast_tx_commit_result() -> Value {
    json!({
        "check_tx": {"log": "", "gasWanted": "1"},
        "deliver_tx": {
            "data": "b2s=",
            "log": "",
            "tags": [{"key": "YXBwLmtleQ==", "value": "aGVsbG8="}]
        },
        "hash": "3D011E09502A84552A0F8AE112D024CC2C115597",
        "height": "27"
    })
}

pub fn broadcast_tx_sync_result(code: u32) -> Value {
    json!({
        "code": code,
        "data": "",
        "log": "",
        "hash": "3D011E09502A84552A0F8AE112D024CC2C115597"
    })
}

pub fn tx_result(height: u64, index: u32) -> Value {
    json!({
        "hash": "3D011E09502A84552A0F8AE112D024CC2C115597",
        "height": height.to_string(),
        "index": index,
        "tx_result": {"log": "", "tags": [{"key": "YXBwLmtleQ==", "value": "aGVsbG8="}]},
        "tx": TX_B64
    })
}

pub fn tx_result_with_flat_proof() -> Value {
    let mut tx = tx_result(27, 1);
    tx["proof"] = json!({
        "Index": 1,
        "Total": 4,
        "RootHash": HASH_HEX,
        "Data": TX_B64,
        "Proof": {"aunts": ["bGVhZg==", "bGVhZg=="]}
    });
    tx
}

pub fn tx_result_with_nested_proof() -> Value {
    let mut tx = tx_result(27, 0);
    tx["proof"] = json!({
        "RootHash": HASH_HEX,
        "Data": TX_B64,
        "Proof": {"total": "1", "index": "0", "leaf_hash": "bGVhZg==", "aunts": null}
    });
    tx
}

pub fn tx_search_result(total_count: u64, heights: &[u64]) -> Value {
    let txs: Vec<Value> = heights.iter().map(|h| tx_result(*h, 0)).collect();
    json!({"txs": txs, "total_count": total_count.to_string()})
}

pub fn genesis_result() -> Value {
    json!({
        "genesis": {
            "genesis_time": "2018-11-13T14:40:00.000Z",
            "chain_id": "test-chain",
            "consensus_params": {
                "block_size_params": {"max_bytes": "22020096", "max_gas": "-1"},
                "evidence_params": {"max_age": "100000"}
            },
            "validators": [{
                "pub_key": pubkey("tendermint/PubKeyEd25519"),
                "power": "10",
                "name": "node0"
            }],
            "app_hash": "",
            "app_state": {"accounts": []}
        }
    })
}

pub fn validators_result() -> Value {
    json!({
        "block_height": "27",
        "validators": [{
            "address": HASH_HEX,
            "pub_key": pubkey("tendermint/PubKeyEd25519"),
            "voting_power": "10",
            "accum": "-20"
        }]
    })
}

// ==============================================================================
// Events
// ==============================================================================

pub fn header_event_result(height: u64) -> Value {
    json!({
        "query": "tm.event='NewBlockHeader'",
        "data": {"type": "tendermint/event/NewBlockHeader", "value": {"header": header(height)}}
    })
}

pub fn header_event(height: u64) -> JsonRpcEvent {
    parse_event(header_event_result(height)).expect("valid event fixture")
}

pub fn tx_event_result(tx: &[u8], height: u64) -> Value {
    use base64::Engine;
    let tx = base64::engine::general_purpose::STANDARD.encode(tx);
    json!({
        "query": "tm.event='Tx'",
        "data": {
            "type": "tendermint/event/Tx",
            "value": {"TxResult": {"height": height.to_string(), "index": 0, "tx": tx, "result": {}}}
        }
    })
}

pub fn tx_event(tx: &[u8], height: u64) -> JsonRpcEvent {
    parse_event(tx_event_result(tx, height)).expect("valid event fixture")
}
