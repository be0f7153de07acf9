use sha2::{Digest, Sha256};

/// SHA256 hash of the given data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hex-encoded SHA256 checksum, used to verify stored backup payloads
pub fn checksum_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
