// ABOUTME: Minimal Solidity ABI encoding/decoding and ENS namehash over Keccak-256
// ABOUTME: Covers the static/dynamic types the event contracts use (address, bytes32, string, bool, uint)

use anyhow::{bail, Context, Result};
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// 4-byte function selector for a canonical signature like `"register()"`
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// ENS namehash (EIP-137). Labels are lowercased; no further normalization.
pub fn namehash(name: &str) -> [u8; 32] {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = keccak256(label.to_lowercase().as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&node);
        buf[32..].copy_from_slice(&label_hash);
        node = keccak256(&buf);
    }
    node
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed).with_context(|| format!("Invalid hex data: {}", value))
}

/// True for `0x` followed by exactly 40 hex digits (any case)
pub fn is_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .map(|h| h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

pub fn parse_address(value: &str) -> Result<[u8; 20]> {
    if !is_address(value) {
        bail!("Invalid address: {}", value);
    }
    let bytes = from_hex(value)?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Input argument for an encoded call
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Address([u8; 20]),
    FixedBytes32([u8; 32]),
    String(String),
}

fn word_from_usize(value: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

/// Encode `selector ++ abi.encode(args...)`
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut head = Vec::with_capacity(args.len() * WORD);
    let mut tail = Vec::new();
    let head_len = args.len() * WORD;

    for arg in args {
        match arg {
            Token::Address(addr) => {
                let mut word = [0u8; WORD];
                word[12..].copy_from_slice(addr);
                head.extend_from_slice(&word);
            }
            Token::FixedBytes32(bytes) => head.extend_from_slice(bytes),
            Token::String(value) => {
                head.extend_from_slice(&word_from_usize(head_len + tail.len()));
                let bytes = value.as_bytes();
                tail.extend_from_slice(&word_from_usize(bytes.len()));
                tail.extend_from_slice(bytes);
                let pad = (WORD - bytes.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(pad));
            }
        }
    }

    let mut out = selector(signature).to_vec();
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(WORD)
        .with_context(|| format!("ABI offset {} overflows", offset))?;
    data.get(offset..end).with_context(|| {
        format!(
            "ABI data too short: need word at {}, have {} bytes",
            offset,
            data.len()
        )
    })
}

fn usize_at(data: &[u8], offset: usize) -> Result<usize> {
    let word = word_at(data, offset)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        bail!("ABI offset or length out of range at {}", offset);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(buf))
        .with_context(|| format!("ABI offset or length out of range at {}", offset))
}

fn address_from_word(word: &[u8]) -> String {
    to_hex(&word[12..WORD])
}

/// Decode a single `address` return value, lowercased
pub fn decode_address(data: &[u8]) -> Result<String> {
    Ok(address_from_word(word_at(data, 0)?))
}

/// Decode a single `bool` return value
pub fn decode_bool(data: &[u8]) -> Result<bool> {
    let word = word_at(data, 0)?;
    Ok(word.iter().any(|b| *b != 0))
}

/// Decode a single `uint256` return value, saturating at `u64::MAX`
pub fn decode_uint(data: &[u8]) -> Result<u64> {
    let word = word_at(data, 0)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Ok(u64::MAX);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(buf))
}

/// Decode a single dynamic `string` return value
pub fn decode_string(data: &[u8]) -> Result<String> {
    let offset = usize_at(data, 0)?;
    let len = usize_at(data, offset)?;
    let start = offset
        .checked_add(WORD)
        .context("ABI string offset overflows")?;
    let end = start
        .checked_add(len)
        .context("ABI string length overflows")?;
    let bytes = data
        .get(start..end)
        .context("ABI string runs past end of data")?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Decode a single dynamic `address[]` return value, lowercased
pub fn decode_address_array(data: &[u8]) -> Result<Vec<String>> {
    let offset = usize_at(data, 0)?;
    let len = usize_at(data, offset)?;
    (0..len)
        .map(|i| {
            let at = WORD
                .checked_mul(i + 1)
                .and_then(|rel| rel.checked_add(offset))
                .context("ABI array element offset overflows")?;
            word_at(data, at).map(address_from_word)
        })
        .collect()
}
