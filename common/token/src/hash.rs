// Licensed under the Apache-2.0 license

//! Hash (HASH opcode) token layout.
//!
//! Word 6 carries the algorithm code plus the continuation flags: bit 4 set
//! means "do not start from the default initial digest" and bit 5 set means
//! "this is not the final block". The running digest travels at word 8 and,
//! when finalizing, the 64-bit total message length at words 24/25.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::opcode::{word0, OPCODE_HASH};
use crate::{CommandToken, ResultToken};

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum HashAlgorithm {
    Sha1 = 1,
    Sha224 = 2,
    Sha256 = 3,
    Sha384 = 4,
    Sha512 = 5,
}

impl HashAlgorithm {
    /// Size of the digest state carried in the token. SHA-224 and SHA-384
    /// are truncations; the engine exchanges the full midstate.
    pub const fn state_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha224 | HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 | HashAlgorithm::Sha512 => 64,
        }
    }

    /// Caller-visible digest size.
    pub const fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Input block size, which is also the chunk alignment requirement.
    pub const fn block_len(self) -> usize {
        match self {
            HashAlgorithm::Sha384 | HashAlgorithm::Sha512 => 128,
            _ => 64,
        }
    }
}

pub(crate) const NOT_DEFAULT_INIT: u32 = 1 << 4;
pub(crate) const NOT_FINAL: u32 = 1 << 5;

/// Build a HASH token over `data_len` bytes at `src`.
pub fn command(
    t: &mut CommandToken,
    algorithm: HashAlgorithm,
    init_with_default: bool,
    finalize: bool,
    src: u64,
    data_len: u32,
) {
    t.words[0] = word0(OPCODE_HASH, 0);
    t.words[2] = data_len;
    t.words[3] = src as u32;
    t.words[4] = (src >> 32) as u32;
    t.words[5] = data_len;
    t.words[6] = (u8::from(algorithm) & 0xF) as u32;
    if !init_with_default {
        t.words[6] |= NOT_DEFAULT_INIT;
    }
    if !finalize {
        t.words[6] |= NOT_FINAL;
    }
}

/// Intermediate digest state, copied at word 8 for continued hashes.
pub fn copy_digest(t: &mut CommandToken, state: &[u8]) {
    t.write_byte_array(8, state);
}

/// Total message length (finalize only), words 24/25.
pub fn set_total_length(t: &mut CommandToken, total_len: u64) {
    t.words[24] = total_len as u32;
    t.words[25] = (total_len >> 32) as u32;
}

/// Digest state returned by the engine at word 2.
pub fn read_digest(r: &ResultToken, state: &mut [u8]) {
    r.read_byte_array(2, state);
}
