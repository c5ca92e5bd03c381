//! Shared test helpers for `bitcoind-client` unit tests.
//!
//! Canned daemon replies (genesis block header, balance, transaction lookup
//! error) as raw JSON bodies and as decoded responses, so tests across
//! modules share one source of fixture data.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::response::Response;

pub const GENESIS_HASH: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";

// ==============================================================================
// Reply Bodies
// ==============================================================================

/// `getblockheader` result for the genesis block, plus a nested `test1`
/// tree for wildcard queries.
pub fn block_header_result() -> Value {
    json!({
        "hash": GENESIS_HASH,
        "confirmations": 449162,
        "height": null,
        "version": 1,
        "versionHex": "00000001",
        "merkleroot": "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b",
        "time": 1231006505,
        "mediantime": 1231006505,
        "nonce": 2083236893,
        "bits": "1d00ffff",
        "difficulty": 1,
        "chainwork": "0000000000000000000000000000000000000000000000000000000100010001",
        "nextblockhash": "00000000839a8e6886ab5951d76f411475428afc90947ee320161bbf18eb6048",
        "tx": [
            "bedb088c480e5f7424a958350f2389c839d17e27dae13643632159b9e7c05482",
            "59b36164c777b34aee28ef623ec34700371d33ff011244d8ee22d02b0547c13b",
            "ead6116a07f2a6911ac93eb0ae00ce05d49c7bb288f2fb9c338819e85414cf2c",
            null
        ],
        "test1": {
            "test2": {"test4": {"amount": 3}},
            "test3": {"test5": {"amount": 4}}
        }
    })
}

pub fn block_header_body() -> Value {
    json!({"result": block_header_result(), "error": null, "id": 0})
}

pub fn balance_body() -> Value {
    json!({"result": 0.1, "error": null, "id": 0})
}

pub fn raw_transaction_error_body() -> Value {
    json!({
        "result": null,
        "error": {"code": -5, "message": "No information available about transaction"},
        "id": 0
    })
}

// ==============================================================================
// Decoded Responses
// ==============================================================================

pub fn block_header_response() -> Response {
    Response::from_container(block_header_body())
}

pub fn raw_transaction_error() -> Response {
    Response::from_container(raw_transaction_error_body())
}

// ==============================================================================
// Files
// ==============================================================================

/// A fresh path in the system temp dir. Nothing is created.
pub fn temp_path(tag: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time must be after unix epoch")
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("bitcoind-client-{tag}-{unique}-{seq}"))
}
