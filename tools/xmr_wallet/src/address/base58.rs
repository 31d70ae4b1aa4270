//! Monero's block base58.
//!
//! Input is split into 8-byte blocks, each encoded independently as a
//! fixed-width group of base58 digits (11 for a full block) and left-padded
//! with '1'. A trailing partial block uses the width from `ENCODED_BLOCK_SIZES`.

use crate::types::AddressError;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const FULL_BLOCK_LEN: usize = 8;
const FULL_ENCODED_BLOCK_LEN: usize = 11;
/// Encoded width indexed by raw block length.
const ENCODED_BLOCK_SIZES: [usize; FULL_BLOCK_LEN + 1] = [0, 2, 3, 5, 6, 7, 9, 10, 11];

pub fn encode(data: &[u8]) -> String {
    let mut out = Vec::with_capacity(data.len() / FULL_BLOCK_LEN * FULL_ENCODED_BLOCK_LEN + 11);
    for block in data.chunks(FULL_BLOCK_LEN) {
        encode_block(block, &mut out);
    }
    // every byte pushed comes from ALPHABET
    out.into_iter().map(char::from).collect()
}

pub fn decode(encoded: &str) -> Result<Vec<u8>, AddressError> {
    let raw = encoded.as_bytes();
    let mut out = Vec::with_capacity(raw.len() / FULL_ENCODED_BLOCK_LEN * FULL_BLOCK_LEN + 8);
    for chunk in raw.chunks(FULL_ENCODED_BLOCK_LEN) {
        decode_block(chunk, &mut out)?;
    }
    Ok(out)
}

fn encode_block(block: &[u8], out: &mut Vec<u8>) {
    let width = ENCODED_BLOCK_SIZES[block.len()];
    let mut num = block
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
    let start = out.len();
    out.resize(start + width, ALPHABET[0]);
    for slot in out[start..].iter_mut().rev() {
        *slot = ALPHABET[(num % 58) as usize];
        num /= 58;
    }
}

fn decode_block(chunk: &[u8], out: &mut Vec<u8>) -> Result<(), AddressError> {
    let size = ENCODED_BLOCK_SIZES
        .iter()
        .position(|width| *width == chunk.len())
        .filter(|size| *size > 0)
        .ok_or(AddressError::Encoding)?;

    let mut num: u128 = 0;
    for symbol in chunk {
        let digit = ALPHABET
            .iter()
            .position(|candidate| candidate == symbol)
            .ok_or(AddressError::Encoding)?;
        num = num * 58 + digit as u128;
    }
    if num >> (8 * size) != 0 {
        return Err(AddressError::Encoding);
    }

    let bytes = num.to_be_bytes();
    out.extend_from_slice(&bytes[bytes.len() - size..]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_block_pads_with_ones() {
        assert_eq!(encode(&[0u8; 8]), "11111111111");
        assert_eq!(decode("11111111111").unwrap(), vec![0u8; 8]);
    }

    #[test]
    fn partial_block_widths() {
        assert_eq!(encode(&[0u8; 5]).len(), 7);
        assert_eq!(encode(&[0xffu8; 69]).len(), 95);
    }

    #[test]
    fn rejects_overflowing_block() {
        // 58^11 - 1 does not fit in 8 bytes.
        assert_eq!(decode("zzzzzzzzzzz"), Err(AddressError::Encoding));
    }

    #[test]
    fn rejects_characters_outside_alphabet() {
        assert_eq!(decode("0OIl0OIl0OI"), Err(AddressError::Encoding));
    }
}
