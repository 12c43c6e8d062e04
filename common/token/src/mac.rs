// Licensed under the Apache-2.0 license

//! MAC (MAC opcode) token layout.
//!
//! Same continuation flags as the hash token. The key length lives in bits
//! 16..24 of word 6 and the key bytes start at word 28; word 5 rounds the
//! input length up to a whole number of words. Bits 8/9 of word 6 select
//! asset-resident key or MAC state instead of inline copies.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::hash::{NOT_DEFAULT_INIT, NOT_FINAL};
use crate::opcode::{word0, OPCODE_MAC};
use crate::{CommandToken, ResultToken};

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MacAlgorithm {
    HmacSha1 = 1,
    HmacSha224 = 2,
    HmacSha256 = 3,
    HmacSha384 = 4,
    HmacSha512 = 5,
}

/// Build a MAC token over `data_len` bytes at `src`.
pub fn command(
    t: &mut CommandToken,
    algorithm: MacAlgorithm,
    init_with_default: bool,
    finalize: bool,
    src: u64,
    data_len: u32,
) {
    t.words[0] = word0(OPCODE_MAC, 0);
    t.words[2] = data_len;
    t.words[3] = src as u32;
    t.words[4] = (src >> 32) as u32;
    t.words[5] = (data_len + 3) & !3;
    t.words[6] = (u8::from(algorithm) & 0xF) as u32;
    if !init_with_default {
        t.words[6] |= NOT_DEFAULT_INIT;
    }
    if !finalize {
        t.words[6] |= NOT_FINAL;
    }
}

/// Total message length (finalize only), words 24/25.
pub fn set_total_length(t: &mut CommandToken, total_len: u64) {
    t.words[24] = total_len as u32;
    t.words[25] = (total_len >> 32) as u32;
}

/// Inline key: length into word 6 bits 16..24, bytes from word 28.
pub fn copy_key(t: &mut CommandToken, key: &[u8]) {
    t.words[6] |= ((key.len() as u32) & 0xFF) << 16;
    t.write_byte_array(28, key);
}

/// Key held in an asset instead of inline (word 6 bit 8, asset id word 28).
pub fn set_asset_key(t: &mut CommandToken, asset_id: u32) {
    t.words[6] |= 1 << 8;
    t.words[28] = asset_id;
}

/// Intermediate MAC state held in an asset (word 6 bit 9, asset id word 8).
pub fn set_asset_state(t: &mut CommandToken, asset_id: u32) {
    t.words[6] |= 1 << 9;
    t.words[8] = asset_id;
}

/// Intermediate MAC state, copied inline at word 8.
pub fn copy_state(t: &mut CommandToken, state: &[u8]) {
    t.write_byte_array(8, state);
}

/// MAC state returned by the engine at word 2.
pub fn read_state(r: &ResultToken, state: &mut [u8]) {
    r.read_byte_array(2, state);
}
