use crate::error::{BridgeResult, KeychainError};

/// `FourCharCode` from exactly four bytes, first byte most significant
pub fn four_char_code(bytes: &[u8]) -> BridgeResult<u32> {
    let bytes: [u8; 4] = bytes
        .try_into()
        .map_err(|_| KeychainError::illegal_argument("Array must contain 4 bytes"))?;
    Ok(u32::from_be_bytes(bytes))
}
