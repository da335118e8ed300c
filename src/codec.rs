//! Base64 <-> raw byte conversion for captured slice payloads
//!
//! Platform storage hands captured slices back as base64 text; the wire
//! protocol carries raw bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CodecError;

/// Decode a padded (`=` / `==`) standard base64 string into raw bytes
pub fn decode(encoded: &str) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(encoded.trim())?)
}

/// Encode raw bytes as standard padded base64
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
