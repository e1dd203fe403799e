//! Minimal contract ABI codec for the certificate registry.
//!
//! Only the four parameter kinds the registry uses are supported: `address`,
//! `uint256` (bounded to `u64`), `bool` and `string`. Values are laid out with
//! the standard head/tail scheme: static values inline in 32-byte head words,
//! dynamic values as an offset in the head pointing to `len ‖ padded bytes`.

use sp_crypto_hashing::keccak_256;
use thiserror::Error;

use crate::address::Address;
use crate::errors::CertifierError;

const WORD: usize = 32;

/// Selector of the standard `Error(string)` revert payload.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u64),
    Bool(bool),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint,
    Bool,
    String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("return data truncated at byte {0}")]
    Truncated(usize),
    #[error("integer does not fit in 64 bits")]
    Overflow,
    #[error("non-canonical {0} word")]
    NonCanonical(&'static str),
    #[error("string payload is not UTF-8")]
    InvalidUtf8,
}

impl From<AbiError> for CertifierError {
    fn from(e: AbiError) -> Self {
        CertifierError::LedgerUnavailable(format!("malformed ledger response: {e}"))
    }
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak_256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Full 32-byte topic hash for an event signature.
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak_256(signature.as_bytes())
}

pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode(args));
    out
}

pub fn encode(args: &[Token]) -> Vec<u8> {
    let mut head = Vec::with_capacity(args.len() * WORD);
    let mut tail = Vec::new();
    let head_len = args.len() * WORD;

    for arg in args {
        match arg {
            Token::Address(a) => {
                let mut word = [0u8; WORD];
                word[12..].copy_from_slice(a.as_bytes());
                head.extend_from_slice(&word);
            }
            Token::Uint(n) => head.extend_from_slice(&uint_word(*n)),
            Token::Bool(b) => head.extend_from_slice(&uint_word(u64::from(*b))),
            Token::String(s) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
                tail.extend_from_slice(&uint_word(s.len() as u64));
                tail.extend_from_slice(s.as_bytes());
                let pad = (WORD - s.len() % WORD) % WORD;
                tail.resize(tail.len() + pad, 0);
            }
        }
    }

    head.extend(tail);
    head
}

pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    types
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let word = word_at(data, i * WORD)?;
            match kind {
                ParamType::Address => {
                    if word[..12].iter().any(|b| *b != 0) {
                        return Err(AbiError::NonCanonical("address"));
                    }
                    let mut bytes = [0u8; 20];
                    bytes.copy_from_slice(&word[12..]);
                    Ok(Token::Address(Address::from_bytes(bytes)))
                }
                ParamType::Uint => Ok(Token::Uint(word_to_u64(word)?)),
                ParamType::Bool => match word_to_u64(word) {
                    Ok(0) => Ok(Token::Bool(false)),
                    Ok(1) => Ok(Token::Bool(true)),
                    _ => Err(AbiError::NonCanonical("bool")),
                },
                ParamType::String => {
                    let offset = to_usize(word_to_u64(word)?)?;
                    decode_string_at(data, offset).map(Token::String)
                }
            }
        })
        .collect()
}

/// Extract the message of an `Error(string)` revert payload, if that is what
/// `data` holds.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    match decode(&[ParamType::String], body).ok()?.pop()? {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}

/// Decode a `0x`-prefixed hex payload as returned by JSON-RPC.
pub fn from_hex(raw: &str) -> Result<Vec<u8>, CertifierError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits)
        .map_err(|e| CertifierError::LedgerUnavailable(format!("invalid hex payload: {e}")))
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_string_at(data: &[u8], offset: usize) -> Result<String, AbiError> {
    let len = to_usize(word_to_u64(word_at(data, offset)?)?)?;
    let start = offset + WORD;
    let end = start.checked_add(len).ok_or(AbiError::Overflow)?;
    let bytes = data.get(start..end).ok_or(AbiError::Truncated(end))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::Overflow)?;
    data.get(offset..end).ok_or(AbiError::Truncated(end))
}

fn word_to_u64(word: &[u8]) -> Result<u64, AbiError> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(buf))
}

fn to_usize(n: u64) -> Result<usize, AbiError> {
    usize::try_from(n).map_err(|_| AbiError::Overflow)
}

fn uint_word(n: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&n.to_be_bytes());
    word
}
