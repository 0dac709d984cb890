//! Decoder for the CBOR metadata trailer the Solidity compiler appends
//! to deployed bytecode.
//!
//! The final two bytes of the bytecode hold the big-endian length of the
//! CBOR payload sitting right before them; everything before the payload
//! is the actual runtime code. Decoding failures are never fatal: the
//! bytecode is kept intact and the metadata record stays empty.

use minicbor::{data::Type, Decoder};
use std::collections::BTreeMap;

/// A deployed bytecode split into its runtime code and metadata trailer.
///
/// `code` + `trailer` always reassemble the original hex string, so the
/// original view is retained alongside the stripped one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BytecodeMetadata {
    /// Runtime code with the trailer removed (hex, no `0x`).
    pub code: String,
    /// CBOR payload plus the two length bytes (hex), empty when absent.
    pub trailer: String,
    /// Decoded metadata entries, keys normalized to lowercase.
    pub values: BTreeMap<String, String>,
}

impl BytecodeMetadata {
    pub fn is_empty(&self) -> bool {
        self.trailer.is_empty()
    }
}

/// Splits a deployed bytecode into runtime code and decoded trailer.
/// Accepts an optional `0x` prefix, which is not reflected in the output.
pub fn decode(bytecode: &str) -> BytecodeMetadata {
    let hex_str = bytecode.strip_prefix("0x").unwrap_or(bytecode);
    let whole = BytecodeMetadata {
        code: hex_str.to_string(),
        ..Default::default()
    };

    let Ok(bytes) = hex::decode(hex_str) else {
        return whole;
    };
    if bytes.len() < 2 {
        return whole;
    }

    let length = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]) as usize;
    // A length running past the start of the bytecode means there is no
    // trailer, not a malformed one.
    if length + 2 > bytes.len() {
        return whole;
    }

    let payload_start = bytes.len() - 2 - length;
    let payload = &bytes[payload_start..bytes.len() - 2];
    let Some(values) = decode_cbor_map(payload) else {
        return whole;
    };

    BytecodeMetadata {
        code: hex::encode(&bytes[..payload_start]),
        trailer: hex::encode(&bytes[payload_start..]),
        values,
    }
}

/// Returns the bytecode with a recognized metadata trailer removed, or
/// the input unchanged when no trailer decodes. A `0x` prefix survives.
pub fn strip(bytecode: &str) -> String {
    let decoded = decode(bytecode);
    if decoded.is_empty() {
        return bytecode.to_string();
    }
    if bytecode.starts_with("0x") {
        format!("0x{}", decoded.code)
    } else {
        decoded.code
    }
}

fn decode_cbor_map(payload: &[u8]) -> Option<BTreeMap<String, String>> {
    let mut decoder = Decoder::new(payload);
    let entries = decoder.map().ok()??;

    let mut values = BTreeMap::new();
    for _ in 0..entries {
        if decoder.datatype().ok()? != Type::String {
            return None;
        }
        let key = decoder.str().ok()?.to_lowercase();
        let rendered = match decoder.datatype().ok()? {
            Type::Bytes => render_bytes(&key, decoder.bytes().ok()?),
            Type::Bool => decoder.bool().ok()?.to_string(),
            Type::String => decoder.str().ok()?.to_string(),
            Type::U8 | Type::U16 | Type::U32 | Type::U64 => decoder.u64().ok()?.to_string(),
            _ => {
                decoder.skip().ok()?;
                String::new()
            }
        };
        values.insert(key, rendered);
    }
    Some(values)
}

fn render_bytes(key: &str, bytes: &[u8]) -> String {
    match key {
        "ipfs" => bs58::encode(bytes).into_string(),
        "solc" => {
            if bytes.len() == 3 {
                format!("{}.{}.{}", bytes[0], bytes[1], bytes[2])
            } else {
                "unknown".to_string()
            }
        }
        _ => hex::encode(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // solc 0.8.14, ipfs bytecode hash
    const IPFS_TRAILER: &str = "a26469706673582212202e82fb6222f966f0e56dc49cd1fb8a6b5eac9bdf74f62b8a5e9d8812901095d664736f6c634300080e0033";
    // pre-0.5.9 swarm hash
    const SWARM_TRAILER: &str = "a165627a7a7230582062ac15c74e3af0aec92b47f64d9c8909939b731732d5ee4163c6ed3af70806550029";
    const RUNTIME: &str = "6080604052600080fdfe";

    #[test]
    fn decodes_ipfs_and_solc_keys() {
        let decoded = decode(&format!("{RUNTIME}{IPFS_TRAILER}"));
        assert_eq!(decoded.code, RUNTIME);
        assert_eq!(decoded.trailer, IPFS_TRAILER);
        assert_eq!(decoded.values.get("solc").unwrap(), "0.8.14");
        let ipfs = decoded.values.get("ipfs").unwrap();
        assert!(ipfs.starts_with("Qm"), "expected base58 ipfs hash, got {ipfs}");
    }

    #[test]
    fn decodes_legacy_swarm_hash() {
        let decoded = decode(&format!("{RUNTIME}{SWARM_TRAILER}"));
        assert_eq!(
            decoded.values.get("bzzr0").unwrap(),
            "62ac15c74e3af0aec92b47f64d9c8909939b731732d5ee4163c6ed3af7080655"
        );
    }

    #[test]
    fn reassembles_original_bytecode() {
        let original = format!("{RUNTIME}{IPFS_TRAILER}");
        let decoded = decode(&original);
        assert_eq!(format!("{}{}", decoded.code, decoded.trailer), original);
    }

    #[test]
    fn oversized_length_means_no_metadata() {
        let decoded = decode("600a0fff");
        assert!(decoded.is_empty());
        assert_eq!(decoded.code, "600a0fff");
    }

    #[test]
    fn garbage_payload_is_kept_intact() {
        // Length points at bytes that are not a CBOR map.
        let decoded = decode("60806040520002");
        assert!(decoded.is_empty());
        assert_eq!(decoded.code, "60806040520002");
    }

    #[test]
    fn empty_and_prefixed_inputs() {
        assert!(decode("").is_empty());
        let stripped = strip(&format!("0x{RUNTIME}{IPFS_TRAILER}"));
        assert_eq!(stripped, format!("0x{RUNTIME}"));
        assert_eq!(strip("600a"), "600a");
    }
}
