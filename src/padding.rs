use block_padding::{Pkcs7, RawPadding};

use crate::config::BLOCK_SIZE;

/// Pads the final chunk of a stream up to the next block boundary.
///
/// Every pad byte holds the number of pad bytes added. A chunk that is
/// already block-aligned (including an empty one) gains a full block.
pub fn pad_final(chunk: &mut Vec<u8>) {
    let aligned = chunk.len() - chunk.len() % BLOCK_SIZE;

    let mut tail = [0u8; BLOCK_SIZE];
    let remainder = chunk.len() - aligned;
    tail[..remainder].copy_from_slice(&chunk[aligned..]);
    Pkcs7::raw_pad(&mut tail, remainder);

    chunk.truncate(aligned);
    chunk.extend_from_slice(&tail);
}

/// Length of `len` plaintext bytes once padded.
#[inline]
pub fn padded_len(len: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    (len / block + 1) * block
}
