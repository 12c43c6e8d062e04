// Licensed under the Apache-2.0 license

//! Public-key token layouts.
//!
//! The PK unit is claimed with a NUMSETN command sized to the modulus,
//! operands are loaded by index with NUMLOAD, the exponentiation runs as a
//! MODEXPE/MODEXPD operation, and releasing is a NUMSETN claim of size
//! zero. An asset-based variant (`asset_command`) exists for firmware-held
//! keys.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::opcode::{word0, OPCODE_PUBLIC_KEY, SUBCODE_PK_NOASSETS, SUBCODE_PK_WITHASSETS};
use crate::CommandToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PkOperation {
    NumLoad = 0x01,
    NumSetN = 0x03,
    ModExpE = 0x04,
    ModExpD = 0x05,
    ModExpCrt = 0x06,
    EcMontMul = 0x0A,
    EccMul = 0x0B,
    EccAdd = 0x0C,
    DsaSign = 0x0D,
    DsaVerify = 0x0E,
    EcdsaSign = 0x0F,
    EcdsaVerify = 0x10,
}

/// Claim the PK unit for operands of `nwords` 32-bit words (0 to release).
pub fn claim(t: &mut CommandToken, nwords: u8, mwords: u8, mmask: u8) {
    t.words[0] = word0(OPCODE_PUBLIC_KEY, SUBCODE_PK_NOASSETS);
    t.words[2] = u8::from(PkOperation::NumSetN) as u32
        | ((mmask as u32) << 8)
        | ((nwords as u32) << 16)
        | ((mwords as u32) << 24);
}

/// Load one operand into PK memory slot `index`.
pub fn num_load(t: &mut CommandToken, index: u8, src: u64, len: u32) {
    t.words[0] = word0(OPCODE_PUBLIC_KEY, SUBCODE_PK_NOASSETS);
    t.words[2] = u8::from(PkOperation::NumLoad) as u32 | (((index as u32) & 0xF) << 24);
    t.words[5] = len & 0xFFF;
    t.words[6] = src as u32;
    t.words[7] = (src >> 32) as u32;
}

/// Run a PK operation over loaded operands.
///
/// `public_exponent` is only meaningful for MODEXPE; MODEXPD takes its
/// exponent from a previously loaded slot and passes zero here.
pub fn operation(
    t: &mut CommandToken,
    op: PkOperation,
    public_exponent: u32,
    src: u64,
    src_len: u32,
    dst: u64,
    dst_len: u32,
) {
    t.words[0] = word0(OPCODE_PUBLIC_KEY, SUBCODE_PK_NOASSETS);
    t.words[2] = (u8::from(op) & 0x1F) as u32;
    t.words[3] = public_exponent;
    t.words[5] = ((dst_len & 0xFFF) << 16) | (src_len & 0xFFF);
    t.words[6] = src as u32;
    t.words[7] = (src >> 32) as u32;
    t.words[8] = dst as u32;
    t.words[9] = (dst >> 32) as u32;
}

/// Append a 64-bit additional-length operand to an asset-based PK
/// command. Word 3's low byte tracks the running size of the extra
/// operand area starting at word 12.
pub fn asset_set_additional_length(t: &mut CommandToken, add_length: u64) {
    let offset = ((t.words[3] & 0xFF) + 3) & !3;
    t.words[3] &= !0xFF;
    t.words[3] |= offset + 8;
    t.words[12 + (offset / 4) as usize] = add_length as u32;
    t.words[13 + (offset / 4) as usize] = (add_length >> 32) as u32;
}

/// PK operation against asset-held keys (WITHASSETS subcode).
#[allow(clippy::too_many_arguments)]
pub fn asset_command(
    t: &mut CommandToken,
    command: u8,
    nwords: u8,
    mwords: u8,
    other_len: u8,
    key_asset_id: u32,
    param_asset_id: u32,
    io_asset_id: u32,
    src: u64,
    src_len: u16,
    dst: u64,
    dst_len: u16,
) {
    t.words[0] = word0(OPCODE_PUBLIC_KEY, SUBCODE_PK_WITHASSETS);
    t.words[2] = command as u32 | ((nwords as u32) << 16) | ((mwords as u32) << 24);
    t.words[3] = (other_len as u32) << 8;
    t.words[4] = key_asset_id;
    t.words[5] = param_asset_id;
    t.words[6] = io_asset_id;
    t.words[7] = (((dst_len as u32) & 0xFFF) << 16) | ((src_len as u32) & 0xFFF);
    t.words[8] = src as u32;
    t.words[9] = (src >> 32) as u32;
    t.words[10] = dst as u32;
    t.words[11] = (dst >> 32) as u32;
}
