use sha3::{Digest, Keccak256};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&Keccak256::digest(data));
    output
}

/// 4-byte function selector for a canonical signature, lowercase hex.
pub fn selector(signature: &str) -> String {
    hex::encode(&keccak256(signature.as_bytes())[..4])
}
