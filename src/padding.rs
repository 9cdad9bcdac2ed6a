//! Plaintext padding for outgoing envelopes. Protocol version 3 pads every
//! payload to a multiple of 160 bytes behind a 0x80 terminator so ciphertext
//! length leaks as little as possible about message length.

use thiserror::Error;

const PAD_BLOCK_SIZE: usize = 160;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PadError {
    #[error("unknown protocol version {0}")]
    UnknownVersion(u32),

    #[error("padding terminator position {position} exceeds block length {length}")]
    PositionOutOfRange { position: usize, length: usize },
}

/// Pads `contents` for the given protocol version. Version 2 payloads go out
/// unpadded; versions below 2 are not sendable.
pub fn pad_message(version: u32, contents: &[u8]) -> Result<Vec<u8>, PadError> {
    if version < 2 {
        return Err(PadError::UnknownVersion(version));
    }
    if version == 2 {
        return Ok(contents.to_vec());
    }

    let message_length = contents.len();
    let length_with_terminator = message_length + 1;
    let mut part_count = length_with_terminator / PAD_BLOCK_SIZE;
    if length_with_terminator % PAD_BLOCK_SIZE != 0 {
        part_count += 1;
    }

    let mut buffer = vec![0u8; part_count * PAD_BLOCK_SIZE];
    buffer[..message_length].copy_from_slice(contents);
    pad_block(&mut buffer, message_length)?;
    Ok(buffer)
}

fn pad_block(block: &mut [u8], position: usize) -> Result<(), PadError> {
    if position >= block.len() {
        return Err(PadError::PositionOutOfRange {
            position,
            length: block.len(),
        });
    }
    block[position] = 0x80;
    for byte in &mut block[position + 1..] {
        *byte = 0;
    }
    Ok(())
}
