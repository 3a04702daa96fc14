// ABOUTME: Ordered chain of named extractors for wallet-dependent JSON shapes
// ABOUTME: Used for transaction hashes in receipts and sender addresses in bridge payloads

use crate::abi;
use serde_json::Value;

/// One named extraction strategy
#[derive(Clone, Copy)]
pub struct Extractor {
    pub name: &'static str,
    extract: fn(&Value) -> Option<String>,
}

impl Extractor {
    pub const fn new(name: &'static str, extract: fn(&Value) -> Option<String>) -> Self {
        Self { name, extract }
    }

    pub fn apply(&self, value: &Value) -> Option<String> {
        (self.extract)(value)
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor").field("name", &self.name).finish()
    }
}

/// A successful extraction and the strategy that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub extractor: &'static str,
    pub value: String,
}

/// Extractors tried in order; the first `Some` wins.
#[derive(Debug, Clone)]
pub struct ExtractorChain {
    extractors: Vec<Extractor>,
}

impl ExtractorChain {
    pub fn new(extractors: Vec<Extractor>) -> Self {
        Self { extractors }
    }

    pub fn extract(&self, value: &Value) -> Option<Extracted> {
        self.extractors.iter().find_map(|e| {
            e.apply(value).map(|v| Extracted {
                extractor: e.name,
                value: v,
            })
        })
    }

    /// Transaction hash from a transaction-reference payload
    pub fn transaction_hash() -> Self {
        Self::new(vec![
            Extractor::new("reference", |v| tx_hash_at(v, &["reference"])),
            Extractor::new("transactionHash", |v| tx_hash_at(v, &["transactionHash"])),
            Extractor::new("receipt.transactionHash", |v| {
                tx_hash_at(v, &["receipt", "transactionHash"])
            }),
            Extractor::new("hash", |v| tx_hash_at(v, &["hash"])),
            Extractor::new("txHash", |v| tx_hash_at(v, &["txHash"])),
            Extractor::new("bare string", |v| v.as_str().and_then(as_tx_hash)),
        ])
    }

    /// Sender's Ethereum address from an inbound message envelope
    pub fn sender_address() -> Self {
        Self::new(vec![
            Extractor::new("senderAddress", |v| address_at(v, &["senderAddress"])),
            Extractor::new("sender.address", |v| address_at(v, &["sender", "address"])),
            Extractor::new("accountIdentifiers", ethereum_account_identifier),
        ])
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

fn as_tx_hash(candidate: &str) -> Option<String> {
    let hex = candidate.strip_prefix("0x")?;
    if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(candidate.to_lowercase())
    } else {
        None
    }
}

fn tx_hash_at(value: &Value, path: &[&str]) -> Option<String> {
    lookup(value, path)?.as_str().and_then(as_tx_hash)
}

fn address_at(value: &Value, path: &[&str]) -> Option<String> {
    let candidate = lookup(value, path)?.as_str()?;
    abi::is_address(candidate).then(|| candidate.to_lowercase())
}

fn ethereum_account_identifier(value: &Value) -> Option<String> {
    value
        .get("accountIdentifiers")?
        .as_array()?
        .iter()
        .filter(|id| {
            id.get("identifierKind")
                .and_then(|k| k.as_str())
                .map(|k| k.eq_ignore_ascii_case("ethereum"))
                .unwrap_or(false)
        })
        .find_map(|id| address_at(id, &["identifier"]))
}
