// src/zkp/circuit_inputs/sha_padding.rs
//! SHA-1/SHA-2 message padding into a fixed number of blocks.
//!
//! Circuits hash variable-length data inside a fixed-size buffer, so the
//! message is padded as the hash function would pad it and then filled with
//! zero blocks up to the circuit's capacity.

use crate::error::{PassportError, Result};
use crate::utils::crypto::HashAlgorithm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedMessage {
    /// `max_blocks * block_size` bytes.
    pub bytes: Vec<u8>,
    /// Blocks actually covered by the padded message.
    pub blocks: usize,
}

/// Pads `message` for `hash` into exactly `max_blocks` blocks.
///
/// # Errors
/// `MalformedDocument` naming `field` when the padded message needs more
/// than `max_blocks` blocks.
pub fn sha_pad(
    field: &str,
    message: &[u8],
    hash: HashAlgorithm,
    max_blocks: usize,
) -> Result<PaddedMessage> {
    let block = hash.block_size();
    let length_field = hash.length_field_size();

    let mut bytes = message.to_vec();
    bytes.push(0x80);
    while bytes.len() % block != block - length_field {
        bytes.push(0);
    }
    let bit_len = (message.len() as u128) * 8;
    let encoded = bit_len.to_be_bytes();
    bytes.extend_from_slice(&encoded[encoded.len() - length_field..]);

    let blocks = bytes.len() / block;
    if blocks > max_blocks {
        return Err(PassportError::document(
            field,
            message.len(),
            format!(
                "{} bytes need {} {} blocks, circuit holds {}",
                message.len(),
                blocks,
                hash.label(),
                max_blocks
            ),
        ));
    }
    bytes.resize(max_blocks * block, 0);
    Ok(PaddedMessage { bytes, blocks })
}
