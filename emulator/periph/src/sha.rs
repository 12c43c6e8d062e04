// Licensed under the Apache-2.0 license

//! SHA-2 family with exposed midstate, plus HMAC, for the emulated
//! engine. Tokens carry the running digest between chunks, so the model
//! works on raw compression-function state (via `sha2::compress256` /
//! `compress512`) rather than the one-shot digest API.

use sha2::digest::generic_array::{typenum::U128, typenum::U64, GenericArray};
use sha2::{compress256, compress512};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShaVariant {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

const IV224: [u32; 8] = [
    0xc1059ed8, 0x367cd507, 0x3070dd17, 0xf70e5939, 0xffc00b31, 0x68581511, 0x64f98fa7, 0xbefa4fa4,
];
const IV256: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];
const IV384: [u64; 8] = [
    0xcbbb9d5dc1059ed8, 0x629a292a367cd507, 0x9159015a3070dd17, 0x152fecd8f70e5939,
    0x67332667ffc00b31, 0x8eb44a8768581511, 0xdb0c2e0d64f98fa7, 0x47b48aaebefa4fa4,
];
const IV512: [u64; 8] = [
    0x6a09e667f3bcc908, 0xbb67ae8584caa73b, 0x3c6ef372fe94f82b, 0xa54ff53a5f1d36f1,
    0x510e527fade682d1, 0x9b05688c2b3e6c1f, 0x1f83d9abfb41bd6b, 0x5be0cd19137e2179,
];

impl ShaVariant {
    /// Map the token hash-algorithm code; SHA-1 (code 1) is not modeled.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(ShaVariant::Sha224),
            3 => Some(ShaVariant::Sha256),
            4 => Some(ShaVariant::Sha384),
            5 => Some(ShaVariant::Sha512),
            _ => None,
        }
    }

    pub fn block_len(self) -> usize {
        match self {
            ShaVariant::Sha224 | ShaVariant::Sha256 => 64,
            ShaVariant::Sha384 | ShaVariant::Sha512 => 128,
        }
    }

    /// Size of the midstate exchanged in tokens (the full H vector).
    pub fn state_len(self) -> usize {
        match self {
            ShaVariant::Sha224 | ShaVariant::Sha256 => 32,
            ShaVariant::Sha384 | ShaVariant::Sha512 => 64,
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            ShaVariant::Sha224 => 28,
            ShaVariant::Sha256 => 32,
            ShaVariant::Sha384 => 48,
            ShaVariant::Sha512 => 64,
        }
    }

    pub fn initial_state(self) -> Vec<u8> {
        match self {
            ShaVariant::Sha224 => words32_to_bytes(&IV224),
            ShaVariant::Sha256 => words32_to_bytes(&IV256),
            ShaVariant::Sha384 => words64_to_bytes(&IV384),
            ShaVariant::Sha512 => words64_to_bytes(&IV512),
        }
    }
}

fn words32_to_bytes(words: &[u32; 8]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn words64_to_bytes(words: &[u64; 8]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Fold whole blocks into the midstate. `data` must be block-aligned.
pub(crate) fn compress(variant: ShaVariant, state: &mut [u8], data: &[u8]) {
    assert_eq!(data.len() % variant.block_len(), 0);
    match variant {
        ShaVariant::Sha224 | ShaVariant::Sha256 => {
            let mut h = [0u32; 8];
            for (w, chunk) in h.iter_mut().zip(state.chunks(4)) {
                *w = u32::from_be_bytes(chunk.try_into().unwrap());
            }
            let blocks: Vec<GenericArray<u8, U64>> = data
                .chunks(64)
                .map(GenericArray::clone_from_slice)
                .collect();
            compress256(&mut h, &blocks);
            state.copy_from_slice(&words32_to_bytes(&h));
        }
        ShaVariant::Sha384 | ShaVariant::Sha512 => {
            let mut h = [0u64; 8];
            for (w, chunk) in h.iter_mut().zip(state.chunks(8)) {
                *w = u64::from_be_bytes(chunk.try_into().unwrap());
            }
            let blocks: Vec<GenericArray<u8, U128>> = data
                .chunks(128)
                .map(GenericArray::clone_from_slice)
                .collect();
            compress512(&mut h, &blocks);
            state.copy_from_slice(&words64_to_bytes(&h));
        }
    }
}

/// Merkle-Damgård finalization: fold the unaligned tail, the 0x80 marker,
/// and the bit length of the whole message (`total_len` bytes) into the
/// midstate, then truncate to the digest size.
pub(crate) fn finalize(
    variant: ShaVariant,
    state: &mut [u8],
    tail: &[u8],
    total_len: u64,
) -> Vec<u8> {
    let block = variant.block_len();
    let full = tail.len() / block * block;
    compress(variant, state, &tail[..full]);
    let rem = &tail[full..];

    let len_field = if block == 64 { 8 } else { 16 };
    let mut pad = Vec::with_capacity(2 * block);
    pad.extend_from_slice(rem);
    pad.push(0x80);
    while (pad.len() + len_field) % block != 0 {
        pad.push(0);
    }
    let bits = (total_len as u128) * 8;
    if len_field == 16 {
        pad.extend_from_slice(&bits.to_be_bytes());
    } else {
        pad.extend_from_slice(&(bits as u64).to_be_bytes());
    }
    compress(variant, state, &pad);
    state[..variant.digest_len()].to_vec()
}

/// HMAC initial midstate: the inner hash primed with the ipad block.
pub(crate) fn hmac_inner_init(variant: ShaVariant, key: &[u8]) -> Vec<u8> {
    let mut state = variant.initial_state();
    compress(variant, &mut state, &xor_block(variant, key, 0x36));
    state
}

/// Complete an HMAC whose inner hash has consumed `total_len` message
/// bytes plus the ipad block already folded into `state`.
pub(crate) fn hmac_finalize(
    variant: ShaVariant,
    state: &mut [u8],
    tail: &[u8],
    total_len: u64,
    key: &[u8],
) -> Vec<u8> {
    let block = variant.block_len() as u64;
    let inner = finalize(variant, state, tail, total_len + block);
    let mut outer = variant.initial_state();
    compress(variant, &mut outer, &xor_block(variant, key, 0x5c));
    finalize(variant, &mut outer, &inner, block + inner.len() as u64)
}

fn xor_block(variant: ShaVariant, key: &[u8], pad: u8) -> Vec<u8> {
    let mut block = vec![pad; variant.block_len()];
    for (b, k) in block.iter_mut().zip(key) {
        *b ^= k;
    }
    block
}
